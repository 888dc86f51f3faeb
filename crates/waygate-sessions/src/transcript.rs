// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tagged line in a session's append-only transcript file. The `type`
/// discriminator is part of both the storage format and the wire format
/// shared with [`waygate_model`] content blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEntry {
    /// First line of every transcript; never replayed into history.
    Session {
        id: String,
        key: String,
        created: DateTime<Utc>,
        #[serde(default = "Utc::now")]
        ts: DateTime<Utc>,
    },
    /// A user turn. `content` is either a plain string, or (for a turn that
    /// is really carrying tool results) an array of `tool_result` blocks.
    User {
        content: Value,
        ts: DateTime<Utc>,
    },
    /// An assistant text entry — the final answer of a turn, or a stray text
    /// block emitted alongside tool calls in the same response.
    Assistant {
        content: String,
        ts: DateTime<Utc>,
    },
    /// One outstanding tool invocation requested by the assistant.
    ToolUse {
        name: String,
        tool_use_id: String,
        input: Value,
        ts: DateTime<Utc>,
    },
    /// The result of executing one `tool_use`, recorded the moment it runs.
    ToolResult {
        tool_use_id: String,
        output: String,
        ts: DateTime<Utc>,
    },
}

impl TranscriptEntry {
    pub fn session_header(id: impl Into<String>, key: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self::Session { id: id.into(), key: key.into(), created, ts: created }
    }

    pub fn user_text(content: impl Into<String>) -> Self {
        Self::User { content: Value::String(content.into()), ts: Utc::now() }
    }

    pub fn user_tool_results(results: Value) -> Self {
        Self::User { content: results, ts: Utc::now() }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::Assistant { content: content.into(), ts: Utc::now() }
    }

    pub fn tool_use(name: impl Into<String>, tool_use_id: impl Into<String>, input: Value) -> Self {
        Self::ToolUse { name: name.into(), tool_use_id: tool_use_id.into(), input, ts: Utc::now() }
    }

    pub fn tool_result(tool_use_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::ToolResult { tool_use_id: tool_use_id.into(), output: output.into(), ts: Utc::now() }
    }
}

/// Cached, rebuildable metadata for one session. Held in `.sessions/sessions.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionMetadata {
    pub session_id: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: u64,
    pub transcript_file: String,
}

/// Replace `:` with `_` so the key is safe to embed in a filename.
pub fn sanitize_key(key: &str) -> String {
    key.replace(':', "_")
}

pub fn transcript_filename(key: &str, session_id: &str) -> String {
    format!("{}_{}.jsonl", sanitize_key(key), session_id)
}
