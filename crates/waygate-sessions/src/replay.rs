// SPDX-License-Identifier: Apache-2.0
use tracing::warn;
use waygate_model::{ContentBlock, Message};

use crate::transcript::TranscriptEntry;

/// Reconstruct conversation history from a transcript's lines, in order.
///
/// Maintains a pending `tool_use` buffer: any non-`tool_use` entry flushes it
/// first as a single assistant message carrying the accumulated blocks, then
/// is processed itself. This mirrors the source's entry-by-entry scan rather
/// than grouping tool calls by API response — if a model response emits a
/// text block followed by a tool_use block, replay produces two assistant
/// messages where one was originally intended. That quirk is preserved, not
/// fixed (see the open question on flush ordering).
pub fn replay_transcript(lines: &[String], session_key: &str) -> Vec<Message> {
    let mut history = Vec::new();
    let mut pending: Vec<ContentBlock> = Vec::new();

    let flush = |pending: &mut Vec<ContentBlock>, history: &mut Vec<Message>| {
        if !pending.is_empty() {
            history.push(Message::assistant_blocks(std::mem::take(pending)));
        }
    };

    for (lineno, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let entry: TranscriptEntry = match serde_json::from_str(line) {
            Ok(e) => e,
            Err(err) => {
                warn!(session_key, line = lineno + 1, %err, "skipping unparseable transcript line");
                continue;
            }
        };

        match entry {
            TranscriptEntry::Session { .. } => {}
            TranscriptEntry::ToolUse { name, tool_use_id, input, .. } => {
                pending.push(ContentBlock::tool_use(tool_use_id, name, input));
            }
            TranscriptEntry::User { content, .. } => {
                flush(&mut pending, &mut history);
                if let Some(text) = content.as_str() {
                    history.push(Message::user(text));
                } else if let Some(arr) = content.as_array() {
                    let blocks: Vec<ContentBlock> = arr
                        .iter()
                        .filter_map(|v| serde_json::from_value::<ContentBlock>(v.clone()).ok())
                        .collect();
                    history.push(Message::user_tool_results(blocks));
                } else {
                    warn!(session_key, line = lineno + 1, "skipping user entry with unrecognised content shape");
                }
            }
            TranscriptEntry::Assistant { content, .. } => {
                flush(&mut pending, &mut history);
                history.push(Message::assistant(content));
            }
            TranscriptEntry::ToolResult { tool_use_id, output, .. } => {
                flush(&mut pending, &mut history);
                history.push(Message::user_tool_results(vec![ContentBlock::tool_result(tool_use_id, output)]));
            }
        }
    }

    flush(&mut pending, &mut history);
    history
}
