// SPDX-License-Identifier: Apache-2.0
//! The bounded tool-call fixed-point loop: `run(user_text, session_key, soul)
//! -> final_text`.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use waygate_model::{
    BackendClient, BackendError, CompletionRequest, ContentBlock, Message, StopReason,
    ToolSchema as ModelToolSchema,
};
use waygate_sessions::SessionStore;
use waygate_tools::{ToolCall, ToolRegistry};

use crate::soul::{system_prompt, Soul};

#[derive(Debug, Error)]
pub enum AgentLoopError {
    #[error("session error: {0}")]
    Session(#[from] waygate_sessions::SessionError),
    #[error("memory error: {0}")]
    Memory(#[from] waygate_memory::MemoryError),
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("turn exceeded {0} tool-call iterations")]
    IterationLimitExceeded(u32),
}

/// Drives one session's conversation against a chat-completion backend,
/// executing tool calls through the registry until the backend stops asking
/// for more. One in-flight turn per session key at a time (§5).
pub struct AgentLoop {
    sessions: Arc<SessionStore>,
    memory: Arc<waygate_memory::MemoryStore>,
    tools: Arc<ToolRegistry>,
    backend: Arc<dyn BackendClient>,
    max_tool_iterations: u32,
    max_tokens: u32,
    temperature: f32,
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AgentLoop {
    pub fn new(
        sessions: Arc<SessionStore>,
        memory: Arc<waygate_memory::MemoryStore>,
        tools: Arc<ToolRegistry>,
        backend: Arc<dyn BackendClient>,
        max_tool_iterations: u32,
        max_tokens: u32,
        temperature: f32,
    ) -> Self {
        Self {
            sessions,
            memory,
            tools,
            backend,
            max_tool_iterations,
            max_tokens,
            temperature,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn session_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        locks.entry(key.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    pub async fn run(&self, user_text: &str, session_key: &str, soul: &Soul) -> Result<String, AgentLoopError> {
        let lock = self.session_lock(session_key).await;
        let _guard = lock.lock().await;

        let (_, history) = self.sessions.load(session_key).await?;

        let memories = self.memory.retrieve(user_text, 3).await;
        let augmented = augment_with_memories(user_text, &memories);

        let mut working_history = history;
        working_history.push(Message::user(augmented.clone()));

        let system = system_prompt(soul);
        let tool_schemas: Vec<ModelToolSchema> = self
            .tools
            .schemas()
            .into_iter()
            .map(|s| ModelToolSchema { name: s.name, description: s.description, parameters: s.parameters })
            .collect();

        // Tracks whether the turn's one `user` transcript entry has been
        // written yet. It must land before any `tool_use`/`tool_result`
        // entries a tool-using turn records, so it is flushed lazily, on
        // first need, rather than batched with the rest of the turn at the
        // end (see `finish_turn`).
        let mut user_entry_written = false;

        for _ in 0..self.max_tool_iterations {
            let request = CompletionRequest {
                system: Some(system.clone()),
                messages: working_history.clone(),
                tools: tool_schemas.clone(),
                max_tokens: self.max_tokens,
                temperature: self.temperature,
            };
            let response = self.backend.complete(request).await?;

            if response.stop_reason == StopReason::ToolCalls && !response.tool_uses().is_empty() {
                working_history.push(Message::assistant_blocks(response.content.clone()));

                if !user_entry_written {
                    self.sessions.append_user(session_key, &augmented).await?;
                    user_entry_written = true;
                }

                let mut results = Vec::new();
                for block in response.tool_uses() {
                    let ContentBlock::ToolUse { id, name, input } = block else {
                        continue;
                    };
                    self.sessions.append_tool_use(session_key, id, name, input).await?;
                    let call = ToolCall { id: id.clone(), name: name.clone(), args: input.clone() };
                    let output = self.tools.execute(&call).await;
                    self.sessions.save_tool_result(session_key, &output.call_id, &output.content).await?;
                    results.push(ContentBlock::tool_result(output.call_id.clone(), output.content.clone()));
                }
                working_history.push(Message::user_tool_results(results));
                continue;
            }

            let final_text = response.final_text();
            self.memory
                .add(&format!("User: {user_text}\nAssistant: {final_text}"), session_key, Vec::new(), Some(0.5))
                .await?;
            if !user_entry_written {
                self.sessions.append_user(session_key, &augmented).await?;
            }
            self.sessions.finish_turn(session_key, &final_text).await?;
            return Ok(final_text);
        }

        Err(AgentLoopError::IterationLimitExceeded(self.max_tool_iterations))
    }
}

fn augment_with_memories(user_text: &str, memories: &[waygate_memory::Memory]) -> String {
    if memories.is_empty() {
        return user_text.to_string();
    }
    let mut out = user_text.to_string();
    out.push_str("\n\nRelevant memories:\n");
    for m in memories {
        out.push_str("- ");
        out.push_str(&m.content);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::tempdir;
    use waygate_model::CompletionResponse;
    use waygate_tools::{Tool, ToolOutput};

    struct ScriptedBackend {
        responses: Mutex<Vec<CompletionResponse>>,
    }

    #[async_trait]
    impl BackendClient for ScriptedBackend {
        async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
            let mut responses = self.responses.lock().await;
            Ok(responses.remove(0))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    fn build_loop(dir: &std::path::Path, responses: Vec<CompletionResponse>, max_iterations: u32) -> AgentLoop {
        let sessions = Arc::new(SessionStore::open(dir).unwrap());
        let memory = Arc::new(waygate_memory::MemoryStore::open(dir).unwrap());
        let mut registry = ToolRegistry::new(30, 50_000);
        registry.register(EchoTool);
        let backend: Arc<dyn BackendClient> = Arc::new(ScriptedBackend { responses: Mutex::new(responses) });
        AgentLoop::new(sessions, memory, Arc::new(registry), backend, max_iterations, 4096, 0.2)
    }

    #[tokio::test]
    async fn pure_chat_turn_returns_final_text_and_persists() {
        let dir = tempdir().unwrap();
        let soul = Soul::default_for("main");
        let agent_loop = build_loop(
            dir.path(),
            vec![CompletionResponse { content: vec![ContentBlock::text("hi there")], stop_reason: StopReason::Stop }],
            32,
        );

        let reply = agent_loop.run("hello", "main:cli:user", &soul).await.unwrap();
        assert_eq!(reply, "hi there");

        let (meta, history) = SessionStore::open(dir.path()).unwrap().load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 1);
        assert_eq!(history.len(), 2);
    }

    #[tokio::test]
    async fn tool_call_then_final_answer_executes_and_records_result() {
        let dir = tempdir().unwrap();
        let soul = Soul::default_for("main");
        let agent_loop = build_loop(
            dir.path(),
            vec![
                CompletionResponse {
                    content: vec![ContentBlock::tool_use("t1", "echo", json!({"x": 1}))],
                    stop_reason: StopReason::ToolCalls,
                },
                CompletionResponse {
                    content: vec![ContentBlock::text("done")],
                    stop_reason: StopReason::Stop,
                },
            ],
            32,
        );

        let reply = agent_loop.run("run echo", "main:cli:user", &soul).await.unwrap();
        assert_eq!(reply, "done");

        // S-B: the on-disk transcript (and its replay) must pair `tool_use`
        // with `tool_result` in order, with `user` ahead of both.
        let (meta, history) = SessionStore::open(dir.path()).unwrap().load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 1);
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].role, waygate_model::Role::User);
        assert_eq!(history[0].as_text(), Some("run echo"));
        assert_eq!(history[1].role, waygate_model::Role::Assistant);
        match &history[1].content {
            waygate_model::MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert!(matches!(&blocks[0], ContentBlock::ToolUse { id, name, .. } if id == "t1" && name == "echo"));
            }
            _ => panic!("expected the buffered tool_use to replay as an assistant block message"),
        }
        assert_eq!(history[2].role, waygate_model::Role::User);
        match &history[2].content {
            waygate_model::MessageContent::Blocks(blocks) => {
                assert_eq!(blocks.len(), 1);
                assert!(matches!(&blocks[0], ContentBlock::ToolResult { tool_use_id, .. } if tool_use_id == "t1"));
            }
            _ => panic!("expected a tool_result block message"),
        }
        assert_eq!(history[3].as_text(), Some("done"));
    }

    #[tokio::test]
    async fn exceeding_iteration_bound_is_a_fatal_error_with_no_persistence() {
        let dir = tempdir().unwrap();
        let soul = Soul::default_for("main");
        let looping_response = CompletionResponse {
            content: vec![ContentBlock::tool_use("t1", "echo", json!({}))],
            stop_reason: StopReason::ToolCalls,
        };
        let agent_loop = build_loop(dir.path(), vec![looping_response.clone(), looping_response.clone()], 2);

        let err = agent_loop.run("loop forever", "main:cli:user", &soul).await;
        assert!(matches!(err, Err(AgentLoopError::IterationLimitExceeded(2))));

        let (meta, _) = SessionStore::open(dir.path()).unwrap().load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 0);
    }

    #[tokio::test]
    async fn backend_error_aborts_turn_without_persisting() {
        struct FailingBackend;
        #[async_trait]
        impl BackendClient for FailingBackend {
            async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, BackendError> {
                Err(BackendError::NoChoices)
            }
        }

        let dir = tempdir().unwrap();
        let soul = Soul::default_for("main");
        let sessions = Arc::new(SessionStore::open(dir.path()).unwrap());
        let memory = Arc::new(waygate_memory::MemoryStore::open(dir.path()).unwrap());
        let registry = ToolRegistry::new(30, 50_000);
        let agent_loop =
            AgentLoop::new(sessions, memory, Arc::new(registry), Arc::new(FailingBackend), 32, 4096, 0.2);

        let err = agent_loop.run("hello", "main:cli:user", &soul).await;
        assert!(matches!(err, Err(AgentLoopError::Backend(_))));

        let (meta, _) = SessionStore::open(dir.path()).unwrap().load("main:cli:user").await.unwrap();
        assert_eq!(meta.message_count, 0);
    }
}
