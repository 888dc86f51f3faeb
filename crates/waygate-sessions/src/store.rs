// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::warn;
use waygate_model::{ContentBlock, Message};

use crate::replay::replay_transcript;
use crate::transcript::{transcript_filename, SessionMetadata, TranscriptEntry};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session '{0}' not found")]
    NotFound(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Owns `.sessions/sessions.json` (the rebuildable index cache) and
/// `.sessions/transcripts/*.jsonl` (the append-only transcripts that are the
/// actual source of truth). All mutation goes through the in-process mutex
/// below, which is the store's single-writer region (§5).
pub struct SessionStore {
    transcripts_dir: PathBuf,
    index_path: PathBuf,
    index: Mutex<HashMap<String, SessionMetadata>>,
}

impl SessionStore {
    /// Open (creating if necessary) the session store rooted at
    /// `workspace_dir/.sessions`. If the index is missing or corrupt, it is
    /// rebuilt from the transcripts already on disk.
    pub fn open(workspace_dir: &Path) -> Result<Self, SessionError> {
        let sessions_dir = workspace_dir.join(".sessions");
        let transcripts_dir = sessions_dir.join("transcripts");
        std::fs::create_dir_all(&transcripts_dir)?;
        let index_path = sessions_dir.join("sessions.json");

        let index = match std::fs::read_to_string(&index_path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(map) => map,
                Err(err) => {
                    warn!(%err, "sessions.json corrupt, rebuilding from transcripts");
                    rebuild_index_from_disk(&transcripts_dir)?
                }
            },
            Err(_) => rebuild_index_from_disk(&transcripts_dir)?,
        };

        let store = Self { transcripts_dir, index_path, index: Mutex::new(index) };
        Ok(store)
    }

    fn transcript_path(&self, meta: &SessionMetadata) -> PathBuf {
        self.transcripts_dir.join(&meta.transcript_file)
    }

    fn persist_index(&self, index: &HashMap<String, SessionMetadata>) -> Result<(), SessionError> {
        let text = serde_json::to_string_pretty(index)?;
        let tmp = self.index_path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.index_path)?;
        Ok(())
    }

    pub async fn exists(&self, key: &str) -> bool {
        self.index.lock().await.contains_key(key)
    }

    /// Create a session for `key` if it does not already exist. Idempotent:
    /// returns the existing metadata unchanged when one is already present.
    pub async fn create(&self, key: &str) -> Result<SessionMetadata, SessionError> {
        let mut index = self.index.lock().await;
        if let Some(existing) = index.get(key) {
            return Ok(existing.clone());
        }

        let session_id = new_session_id();
        let now = Utc::now();
        let transcript_file = transcript_filename(key, &session_id);
        let meta = SessionMetadata {
            session_id: session_id.clone(),
            key: key.to_string(),
            created_at: now,
            updated_at: now,
            message_count: 0,
            transcript_file,
        };

        let path = self.transcripts_dir.join(&meta.transcript_file);
        let header = TranscriptEntry::session_header(&session_id, key, now);
        std::fs::write(&path, format!("{}\n", serde_json::to_string(&header)?))?;

        index.insert(key.to_string(), meta.clone());
        self.persist_index(&index)?;
        Ok(meta)
    }

    /// Load a session's metadata and its replayed conversation history,
    /// creating the session on first reference if it does not yet exist.
    pub async fn load(&self, key: &str) -> Result<(SessionMetadata, Vec<Message>), SessionError> {
        let meta = self.create(key).await?;
        let path = self.transcript_path(&meta);
        let lines = read_lines(&path)?;
        let history = replay_transcript(&lines, key);
        Ok((meta, history))
    }

    /// Append one completed turn: the original user text, then one entry
    /// per assistant content block (`assistant` for text, `tool_use` for a
    /// tool call). Updates the index's `updated_at`/`message_count` and
    /// rewrites it atomically.
    pub async fn save_turn(
        &self,
        key: &str,
        user_text: &str,
        assistant_blocks: &[ContentBlock],
    ) -> Result<(), SessionError> {
        let mut index = self.index.lock().await;
        let meta = index.get(key).cloned().ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        let path = self.transcripts_dir.join(&meta.transcript_file);

        let mut lines = String::new();
        lines.push_str(&serde_json::to_string(&TranscriptEntry::user_text(user_text))?);
        lines.push('\n');
        for block in assistant_blocks {
            let entry = match block {
                ContentBlock::Text { text } => TranscriptEntry::assistant_text(text),
                ContentBlock::ToolUse { id, name, input } => {
                    TranscriptEntry::tool_use(name, id, input.clone())
                }
                ContentBlock::ToolResult { tool_use_id, content } => {
                    TranscriptEntry::tool_result(tool_use_id, content)
                }
            };
            lines.push_str(&serde_json::to_string(&entry)?);
            lines.push('\n');
        }
        append_to(&path, &lines)?;

        let updated = index
            .get_mut(key)
            .ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        updated.updated_at = Utc::now();
        updated.message_count += 1;
        self.persist_index(&index)?;
        Ok(())
    }

    /// Record one tool result the moment it is produced, independent of the
    /// enclosing turn's `save_turn` call.
    pub async fn save_tool_result(
        &self,
        key: &str,
        tool_use_id: &str,
        output: &str,
    ) -> Result<(), SessionError> {
        let index = self.index.lock().await;
        let meta = index.get(key).cloned().ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        drop(index);
        let path = self.transcripts_dir.join(&meta.transcript_file);
        let entry = TranscriptEntry::tool_result(tool_use_id, output);
        append_to(&path, &format!("{}\n", serde_json::to_string(&entry)?))?;
        Ok(())
    }

    /// Append just the turn's leading `user` entry, with no index
    /// bookkeeping. Used by the agent loop to get the `user` entry onto
    /// disk ahead of any `tool_use`/`tool_result` entries a tool-using turn
    /// is about to record, so replay sees `user` before `tool_use` rather
    /// than after. `finish_turn` performs the matching `message_count`
    /// increment once the turn actually completes.
    pub async fn append_user(&self, key: &str, user_text: &str) -> Result<(), SessionError> {
        let index = self.index.lock().await;
        let meta = index.get(key).cloned().ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        drop(index);
        let path = self.transcripts_dir.join(&meta.transcript_file);
        let entry = TranscriptEntry::user_text(user_text);
        append_to(&path, &format!("{}\n", serde_json::to_string(&entry)?))?;
        Ok(())
    }

    /// Append one `tool_use` entry the moment the agent loop decides to
    /// call that tool — before the `tool_result` `save_tool_result` will
    /// record once the call completes, so the two land in the right order.
    pub async fn append_tool_use(
        &self,
        key: &str,
        tool_use_id: &str,
        name: &str,
        input: &serde_json::Value,
    ) -> Result<(), SessionError> {
        let index = self.index.lock().await;
        let meta = index.get(key).cloned().ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        drop(index);
        let path = self.transcripts_dir.join(&meta.transcript_file);
        let entry = TranscriptEntry::tool_use(name, tool_use_id, input.clone());
        append_to(&path, &format!("{}\n", serde_json::to_string(&entry)?))?;
        Ok(())
    }

    /// Append the turn's final `assistant` text entry and commit the turn:
    /// bumps `updated_at` and increments `message_count` once (the turn's
    /// single `user` entry was already written by `append_user`).
    pub async fn finish_turn(&self, key: &str, final_text: &str) -> Result<(), SessionError> {
        let mut index = self.index.lock().await;
        let meta = index.get(key).cloned().ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        let path = self.transcripts_dir.join(&meta.transcript_file);
        let entry = TranscriptEntry::assistant_text(final_text);
        append_to(&path, &format!("{}\n", serde_json::to_string(&entry)?))?;

        let updated = index.get_mut(key).ok_or_else(|| SessionError::NotFound(key.to_string()))?;
        updated.updated_at = Utc::now();
        updated.message_count += 1;
        self.persist_index(&index)?;
        Ok(())
    }

    pub async fn list(&self) -> Vec<SessionMetadata> {
        let mut all: Vec<SessionMetadata> = self.index.lock().await.values().cloned().collect();
        all.sort_by(|a, b| a.key.cmp(&b.key));
        all
    }

    /// Delete a session: removes its transcript file and index entry.
    pub async fn delete(&self, key: &str) -> Result<(), SessionError> {
        let mut index = self.index.lock().await;
        if let Some(meta) = index.remove(key) {
            let path = self.transcripts_dir.join(&meta.transcript_file);
            let _ = std::fs::remove_file(path);
            self.persist_index(&index)?;
        }
        Ok(())
    }

    /// Explicit maintenance operation: rescan every transcript on disk and
    /// rewrite the index from scratch, recovering `session_id`, `created_at`
    /// and `message_count` for each.
    pub async fn rebuild_index(&self) -> Result<(), SessionError> {
        let rebuilt = rebuild_index_from_disk(&self.transcripts_dir)?;
        let mut index = self.index.lock().await;
        *index = rebuilt;
        self.persist_index(&index)?;
        Ok(())
    }
}

fn new_session_id() -> String {
    let mut rng = rand::thread_rng();
    let bits: u64 = rng.gen::<u64>() & 0xFFFF_FFFF_FFFF;
    format!("{bits:012x}")
}

fn read_lines(path: &Path) -> Result<Vec<String>, SessionError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)?;
    Ok(text.lines().map(str::to_string).collect())
}

fn append_to(path: &Path, text: &str) -> Result<(), SessionError> {
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(text.as_bytes())?;
    Ok(())
}

fn rebuild_index_from_disk(transcripts_dir: &Path) -> Result<HashMap<String, SessionMetadata>, SessionError> {
    let mut index = HashMap::new();
    let Ok(entries) = std::fs::read_dir(transcripts_dir) else {
        return Ok(index);
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(&path) else { continue };
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else { continue };

        let mut header: Option<(String, String, chrono::DateTime<Utc>)> = None;
        let mut message_count = 0u64;
        let mut last_ts = None;

        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let Ok(parsed) = serde_json::from_str::<TranscriptEntry>(line) else { continue };
            match parsed {
                TranscriptEntry::Session { id, key, created, .. } => {
                    header = Some((id, key, created));
                    last_ts = Some(created);
                }
                TranscriptEntry::User { ts, .. } => {
                    message_count += 1;
                    last_ts = Some(ts);
                }
                TranscriptEntry::Assistant { ts, .. }
                | TranscriptEntry::ToolUse { ts, .. }
                | TranscriptEntry::ToolResult { ts, .. } => {
                    last_ts = Some(ts);
                }
            }
        }

        let Some((session_id, key, created_at)) = header else {
            warn!(file = filename, "skipping transcript with no session header during rebuild");
            continue;
        };

        index.insert(
            key.clone(),
            SessionMetadata {
                session_id,
                key,
                created_at,
                updated_at: last_ts.unwrap_or(created_at),
                message_count,
                transcript_file: filename.to_string(),
            },
        );
    }

    Ok(index)
}
