// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{CompletionRequest, CompletionResponse, ContentBlock, MessageContent, Role, StopReason};

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("backend request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("backend returned {status}: {body}")]
    Status { status: reqwest::StatusCode, body: String },
    #[error("backend response had no choices")]
    NoChoices,
    #[error("backend returned a malformed tool call: {0}")]
    MalformedToolCall(String),
}

/// A chat-completion backend. There is exactly one concrete implementation
/// ([`OpenAiCompatBackend`]); the trait exists so the agent loop can be
/// driven against a test double without a network round trip.
#[async_trait]
pub trait BackendClient: Send + Sync {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError>;
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint, called
/// non-streaming (`stream: false`) since the agent loop consumes a turn's
/// result all at once rather than token-by-token.
pub struct OpenAiCompatBackend {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: String, api_key: Option<String>, model: String) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self { http, base_url, api_key, model })
    }
}

#[async_trait]
impl BackendClient for OpenAiCompatBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
        let wire = build_wire_request(&self.model, &request);
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut req = self.http.post(&url).json(&wire);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(BackendError::Status { status, body });
        }

        let parsed: WireResponse = resp.json().await?;
        parse_wire_response(parsed)
    }
}

// ─── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunctionCall,
}

#[derive(Debug, Serialize)]
struct WireFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction,
}

#[derive(Debug, Serialize)]
struct WireToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

/// Translate the internal message model onto the wire: string content passes
/// through as-is; a content-block list becomes (a) one assistant message
/// carrying a `tool_calls[]` array, and (b) one `role: tool` message per
/// tool_result, each keyed by `tool_call_id`.
fn build_wire_request(model: &str, request: &CompletionRequest) -> WireRequest {
    let mut messages = Vec::new();

    if let Some(system) = &request.system {
        messages.push(WireMessage {
            role: "system",
            content: Some(system.clone()),
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for msg in &request.messages {
        match (msg.role, &msg.content) {
            (Role::User, MessageContent::Text(text)) => {
                messages.push(WireMessage {
                    role: "user",
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            (Role::Assistant, MessageContent::Text(text)) => {
                messages.push(WireMessage {
                    role: "assistant",
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            (Role::User, MessageContent::Blocks(blocks)) => {
                // A user turn with block content carries only tool_result
                // blocks (§4.5): one `tool` message per result.
                for block in blocks {
                    if let ContentBlock::ToolResult { tool_use_id, content } = block {
                        messages.push(WireMessage {
                            role: "tool",
                            content: Some(content.clone()),
                            tool_calls: None,
                            tool_call_id: Some(tool_use_id.clone()),
                        });
                    }
                }
            }
            (Role::Assistant, MessageContent::Blocks(blocks)) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(WireToolCall {
                                id: id.clone(),
                                kind: "function",
                                function: WireFunctionCall {
                                    name: name.clone(),
                                    arguments: input.to_string(),
                                },
                            });
                        }
                        ContentBlock::ToolResult { .. } => {}
                    }
                }
                messages.push(WireMessage {
                    role: "assistant",
                    content: if text.is_empty() { None } else { Some(text) },
                    tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                    tool_call_id: None,
                });
            }
        }
    }

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|t| WireTool {
                    kind: "function",
                    function: WireToolFunction {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    },
                })
                .collect(),
        )
    };
    let tool_choice = tools.as_ref().map(|_| "auto");

    WireRequest {
        model: model.to_string(),
        messages,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        stream: false,
        tools,
        tool_choice,
    }
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponseMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireResponseToolCall>,
}

#[derive(Debug, Deserialize)]
struct WireResponseToolCall {
    id: String,
    function: WireResponseFunctionCall,
}

#[derive(Debug, Deserialize)]
struct WireResponseFunctionCall {
    name: String,
    arguments: String,
}

fn parse_wire_response(resp: WireResponse) -> Result<CompletionResponse, BackendError> {
    let choice = resp.choices.into_iter().next().ok_or(BackendError::NoChoices)?;

    let mut content = Vec::new();
    if let Some(text) = choice.message.content {
        if !text.is_empty() {
            content.push(ContentBlock::text(text));
        }
    }
    for call in choice.message.tool_calls {
        let input: serde_json::Value = serde_json::from_str(&call.function.arguments)
            .map_err(|e| BackendError::MalformedToolCall(e.to_string()))?;
        content.push(ContentBlock::tool_use(call.id, call.function.name, input));
    }

    let has_tool_calls = content.iter().any(|b| matches!(b, ContentBlock::ToolUse { .. }));
    let stop_reason = match choice.finish_reason.as_deref() {
        Some("tool_calls") => StopReason::ToolCalls,
        Some("stop") => StopReason::Stop,
        Some(other) if has_tool_calls => StopReason::Other(other.to_string()),
        Some(other) => StopReason::Other(other.to_string()),
        None if has_tool_calls => StopReason::ToolCalls,
        None => StopReason::Stop,
    };

    Ok(CompletionResponse { content, stop_reason })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
