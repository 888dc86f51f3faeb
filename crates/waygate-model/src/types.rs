// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// A single polymorphic content block, as stored in transcripts and sent
/// over the wire to the backend.
///
/// The `type` discriminator is part of both the wire and storage format, so
/// this enum must stay a closed, tagged variant set rather than grow ad hoc
/// subclasses.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn tool_use(id: impl Into<String>, name: impl Into<String>, input: serde_json::Value) -> Self {
        Self::ToolUse { id: id.into(), name: name.into(), input }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult { tool_use_id: tool_use_id.into(), content: content.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// The content of a message: either a plain string, or an ordered list of
/// content blocks (text / tool_use / tool_result mixed together).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::Blocks(blocks) if blocks.len() == 1 => blocks[0].as_text(),
            _ => None,
        }
    }

    pub fn blocks(&self) -> Vec<ContentBlock> {
        match self {
            Self::Text(t) => vec![ContentBlock::text(t.clone())],
            Self::Blocks(b) => b.clone(),
        }
    }
}

/// A single message in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant_blocks(blocks: Vec<ContentBlock>) -> Self {
        Self { role: Role::Assistant, content: MessageContent::Blocks(blocks) }
    }

    /// A user message carrying only `tool_result` blocks, one per outstanding
    /// `tool_use` id from the preceding assistant turn.
    pub fn user_tool_results(results: Vec<ContentBlock>) -> Self {
        Self { role: Role::User, content: MessageContent::Blocks(results) }
    }

    pub fn as_text(&self) -> Option<&str> {
        self.content.as_text()
    }
}

/// A tool schema advertised to the backend for this turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: serde_json::Value,
}

/// Request sent to the backend client for one turn.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
    pub max_tokens: u32,
    pub temperature: f32,
}

/// Why the backend stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Ordinary end of turn; `content` is the final answer.
    Stop,
    /// The model wants to invoke one or more tools.
    ToolCalls,
    /// Any other provider-reported reason (length, content filter, …),
    /// treated the same as `Stop` by the agent loop: the turn ends.
    Other(String),
}

/// Response returned by a single backend call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
}

impl CompletionResponse {
    /// Every `tool_use` block in this response, in order.
    pub fn tool_uses(&self) -> Vec<&ContentBlock> {
        self.content
            .iter()
            .filter(|b| matches!(b, ContentBlock::ToolUse { .. }))
            .collect()
    }

    /// Concatenation of every `text` block, for when the turn ended normally.
    pub fn final_text(&self) -> String {
        self.content
            .iter()
            .filter_map(|b| b.as_text())
            .collect::<Vec<_>>()
            .join("")
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_user_sets_role_and_text() {
        let m = Message::user("hello");
        assert_eq!(m.role, Role::User);
        assert_eq!(m.as_text(), Some("hello"));
    }

    #[test]
    fn message_assistant_sets_role_and_text() {
        let m = Message::assistant("reply");
        assert_eq!(m.role, Role::Assistant);
        assert_eq!(m.as_text(), Some("reply"));
    }

    #[test]
    fn message_assistant_blocks_as_text_none_when_mixed() {
        let m = Message::assistant_blocks(vec![
            ContentBlock::text("thinking out loud"),
            ContentBlock::tool_use("t1", "read_file", serde_json::json!({"file_path": "a.txt"})),
        ]);
        assert!(m.as_text().is_none());
    }

    #[test]
    fn message_user_tool_results_round_trip_blocks() {
        let m = Message::user_tool_results(vec![ContentBlock::tool_result("t1", "contents-of-a")]);
        assert_eq!(m.role, Role::User);
        match &m.content {
            MessageContent::Blocks(b) => {
                assert_eq!(b.len(), 1);
                assert_eq!(b[0], ContentBlock::tool_result("t1", "contents-of-a"));
            }
            _ => panic!("expected Blocks"),
        }
    }

    #[test]
    fn content_block_serialises_with_type_tag() {
        let b = ContentBlock::text("hi");
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn content_block_tool_use_serialises_with_type_tag() {
        let b = ContentBlock::tool_use("t1", "read_file", serde_json::json!({"file_path": "a.txt"}));
        let json = serde_json::to_value(&b).unwrap();
        assert_eq!(json["type"], "tool_use");
        assert_eq!(json["id"], "t1");
        assert_eq!(json["name"], "read_file");
    }

    #[test]
    fn content_block_tool_result_round_trips() {
        let b = ContentBlock::tool_result("t1", "contents-of-a");
        let json = serde_json::to_string(&b).unwrap();
        let back: ContentBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, b);
    }

    #[test]
    fn completion_response_final_text_joins_text_blocks() {
        let r = CompletionResponse {
            content: vec![ContentBlock::text("here "), ContentBlock::text("is a")],
            stop_reason: StopReason::Stop,
        };
        assert_eq!(r.final_text(), "here is a");
    }

    #[test]
    fn completion_response_tool_uses_filters_non_tool_blocks() {
        let r = CompletionResponse {
            content: vec![
                ContentBlock::text("let me check"),
                ContentBlock::tool_use("t1", "read_file", serde_json::json!({})),
            ],
            stop_reason: StopReason::ToolCalls,
        };
        assert_eq!(r.tool_uses().len(), 1);
    }

    #[test]
    fn message_serialises_and_deserialises() {
        let original = Message::user("test payload");
        let json = serde_json::to_string(&original).unwrap();
        let decoded: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.role, Role::User);
        assert_eq!(decoded.as_text(), Some("test payload"));
    }

    #[test]
    fn tool_schema_serialises_correctly() {
        let ts = ToolSchema {
            name: "my_tool".into(),
            description: "desc".into(),
            parameters: serde_json::json!({ "type": "object" }),
        };
        let json = serde_json::to_string(&ts).unwrap();
        assert!(json.contains("my_tool"));
        assert!(json.contains("desc"));
    }
}
