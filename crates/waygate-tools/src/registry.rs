// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema exposed to the backend for one turn.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Central registry holding every available tool, plus the timeout and
/// truncation policy applied uniformly across all of them.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    timeout_secs: u64,
    truncate_chars: usize,
}

impl ToolRegistry {
    pub fn new(timeout_secs: u64, truncate_chars: usize) -> Self {
        Self { tools: HashMap::new(), timeout_secs, truncate_chars }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    /// Execute a tool call under the registry's timeout and truncation
    /// policy. This never panics and never returns an `Err` to the caller —
    /// every failure mode is encoded as an `is_error` [`ToolOutput`].
    pub async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(tool) = self.tools.get(&call.name).cloned() else {
            return ToolOutput::err(&call.id, format!("Error: Unknown tool '{}'", call.name));
        };

        let call = call.clone();
        let name = call.name.clone();
        let id = call.id.clone();
        let timeout = Duration::from_secs(self.timeout_secs);

        let fut = AssertUnwindSafe(async move { tool.execute(&call).await }).catch_unwind();
        let output = match tokio::time::timeout(timeout, fut).await {
            Ok(Ok(output)) => output,
            Ok(Err(panic)) => {
                let message = panic_message(&panic);
                ToolOutput::err(&id, format!("Error: {name} failed: {message}"))
            }
            Err(_) => ToolOutput::err(&id, format!("Error: Command timed out after {}s", self.timeout_secs)),
        };

        self.truncate(output)
    }

    fn truncate(&self, mut output: ToolOutput) -> ToolOutput {
        let total = output.content.chars().count();
        if total > self.truncate_chars {
            let head: String = output.content.chars().take(self.truncate_chars).collect();
            output.content = format!("{head}... [truncated, {total} total chars]");
        }
        output
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
