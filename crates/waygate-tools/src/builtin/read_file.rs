// SPDX-License-Identifier: Apache-2.0
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::tool::{Tool, ToolCall, ToolOutput};

/// Default number of lines returned when the caller does not specify a limit.
const DEFAULT_LINE_LIMIT: usize = 200;

/// Resolve `requested` against `workspace_root` and reject anything that
/// would escape it: absolute paths, raw `..` components, and `..` introduced
/// by canonicalizing a symlink. Mirrors the longest-existing-ancestor walk
/// needed for paths that don't exist yet.
fn validate_path(workspace_root: &Path, requested: &str) -> Result<PathBuf, String> {
    let requested_path = Path::new(requested);
    if requested_path.is_absolute() {
        return Err(format!(
            "path-traversal refused: absolute paths are not allowed; use a path relative to the workspace root (got '{requested}')"
        ));
    }
    for component in requested_path.components() {
        if matches!(component, Component::ParentDir) {
            return Err(format!("path-traversal refused: path must not contain '..' components (got '{requested}')"));
        }
    }

    let canonical_root = workspace_root
        .canonicalize()
        .map_err(|e| format!("cannot resolve workspace root '{}': {e}", workspace_root.display()))?;
    let candidate = canonical_root.join(requested_path);

    let resolved = if candidate.exists() {
        candidate.canonicalize().map_err(|e| format!("cannot resolve path '{}': {e}", candidate.display()))?
    } else {
        let mut existing = candidate.as_path();
        let mut tail_parts: Vec<&std::ffi::OsStr> = Vec::new();
        loop {
            if existing.exists() {
                break;
            }
            match existing.parent() {
                Some(parent) => {
                    if let Some(file_name) = existing.file_name() {
                        tail_parts.push(file_name);
                    }
                    existing = parent;
                }
                None => break,
            }
        }
        let mut resolved =
            existing.canonicalize().map_err(|e| format!("cannot resolve ancestor of '{}': {e}", candidate.display()))?;
        for part in tail_parts.into_iter().rev() {
            resolved.push(part);
        }
        resolved
    };

    if !resolved.starts_with(&canonical_root) {
        return Err(format!(
            "path-traversal refused: '{requested}' resolves outside workspace root '{}'",
            canonical_root.display()
        ));
    }
    Ok(resolved)
}

/// Read-only filesystem tool: reads a UTF-8 text file, with optional
/// line-range pagination. Registry-level truncation handles the case where
/// the selected range is still too large. Every path is confined to
/// `workspace_root` (§7: path-traversal is refused, not executed).
pub struct ReadFileTool {
    pub workspace_root: PathBuf,
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a UTF-8 text file. Default: 200 lines starting at line 1.\n\
         Lines are formatted as L{n}:content (1-indexed). Use offset+limit to paginate."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Absolute or relative path to the file"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-indexed line number to start reading from (default 1)"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to return (default 200)"
                }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'path'");
        };
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path, offset, limit, "read_file tool");

        let resolved = match validate_path(&self.workspace_root, path) {
            Ok(p) => p,
            Err(e) => return ToolOutput::err(&call.id, e),
        };

        let bytes = match tokio::fs::read(&resolved).await {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let text = String::from_utf8_lossy(&bytes);
        let all_lines: Vec<&str> = text.lines().collect();
        let total = all_lines.len();
        let start = offset.saturating_sub(1);

        let selected: Vec<String> = all_lines
            .iter()
            .enumerate()
            .skip(start)
            .take(limit)
            .map(|(i, line)| format!("L{}:{}", i + 1, line))
            .collect();

        let last_shown = start + selected.len();
        let mut content = selected.join("\n");
        if last_shown < total {
            content.push_str(&format!(
                "\n...[{} more lines; use offset={} to continue]",
                total - last_shown,
                last_shown + 1
            ));
        }

        ToolOutput::ok(&call.id, content)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall { id: "r1".into(), name: "read_file".into(), args }
    }

    fn workspace_with(name: &str, content: &str) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(name), content).unwrap();
        dir
    }

    #[tokio::test]
    async fn reads_file_with_line_numbers() {
        let ws = workspace_with("a.txt", "alpha\nbeta\ngamma\n");
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "a.txt"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("L1:alpha"));
        assert!(out.content.contains("L2:beta"));
        assert!(out.content.contains("L3:gamma"));
    }

    #[tokio::test]
    async fn offset_and_limit_work() {
        let ws = workspace_with("a.txt", "line1\nline2\nline3\nline4\nline5\n");
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "a.txt", "offset": 2, "limit": 2}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("L2:line2"));
        assert!(out.content.contains("L3:line3"));
        assert!(!out.content.contains("L1:"));
        assert!(!out.content.contains("L4:"));
    }

    #[tokio::test]
    async fn missing_file_is_error() {
        let ws = TempDir::new().unwrap();
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "no_such_file.txt"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("read error"));
    }

    #[tokio::test]
    async fn missing_path_argument_is_error() {
        let ws = TempDir::new().unwrap();
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("missing required parameter 'path'"));
    }

    #[tokio::test]
    async fn pagination_notice_when_more_lines_exist() {
        let ws = workspace_with("a.txt", "a\nb\nc\nd\ne\n");
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "a.txt", "limit": 2}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("offset=3"), "{}", out.content);
    }

    #[tokio::test]
    async fn no_pagination_notice_when_all_lines_shown() {
        let ws = workspace_with("a.txt", "x\ny\n");
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "a.txt", "limit": 200}))).await;
        assert!(!out.is_error);
        assert!(!out.content.contains("offset="), "{}", out.content);
    }

    // ── Path-traversal refusal (§7) ─────────────────────────────────────────

    #[tokio::test]
    async fn absolute_path_is_refused() {
        let ws = TempDir::new().unwrap();
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "/etc/passwd"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("path-traversal refused"), "{}", out.content);
    }

    #[tokio::test]
    async fn dot_dot_traversal_outside_workspace_is_refused() {
        let ws = workspace_with("a.txt", "secret\n");
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "../a.txt"}))).await;
        assert!(out.is_error);
        assert!(out.content.contains("path-traversal refused"), "{}", out.content);
    }

    #[tokio::test]
    async fn relative_path_within_subdirectory_is_allowed() {
        let ws = TempDir::new().unwrap();
        std::fs::create_dir(ws.path().join("sub")).unwrap();
        std::fs::write(ws.path().join("sub/b.txt"), "nested\n").unwrap();
        let tool = ReadFileTool { workspace_root: ws.path().to_path_buf() };
        let out = tool.execute(&call(json!({"path": "sub/b.txt"}))).await;
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("L1:nested"));
    }
}
