// SPDX-License-Identifier: Apache-2.0
use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::channel::Channel;
use crate::inbound::InboundMessage;

#[derive(Debug, Error)]
pub enum FileChannelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The one concrete channel this crate ships: `.channels/file_inbox.txt` /
/// `file_outbox.txt`. Inbox lines are `<sender>\t<text>`; `receive` pops the
/// next unconsumed line, tracked by a small persisted cursor so a restart
/// does not redeliver. Outbox lines are `<recipient>\t<thread_id or ->\t<chunk>`.
pub struct FileChannel {
    id: String,
    max_text_length: usize,
    inbox_path: PathBuf,
    outbox_path: PathBuf,
    cursor_path: PathBuf,
    cursor: Mutex<usize>,
}

impl FileChannel {
    pub fn open(workspace_dir: &Path, id: &str, max_text_length: usize) -> Result<Self, FileChannelError> {
        let dir = workspace_dir.join(".channels");
        std::fs::create_dir_all(&dir)?;
        let inbox_path = dir.join("file_inbox.txt");
        let outbox_path = dir.join("file_outbox.txt");
        let cursor_path = dir.join("file_inbox.cursor");

        if !inbox_path.exists() {
            std::fs::write(&inbox_path, "")?;
        }
        if !outbox_path.exists() {
            std::fs::write(&outbox_path, "")?;
        }
        let cursor = std::fs::read_to_string(&cursor_path)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0);

        Ok(Self {
            id: id.to_string(),
            max_text_length,
            inbox_path,
            outbox_path,
            cursor_path,
            cursor: Mutex::new(cursor),
        })
    }

    fn persist_cursor(&self, value: usize) -> Result<(), FileChannelError> {
        let tmp = self.cursor_path.with_extension("cursor.tmp");
        std::fs::write(&tmp, value.to_string())?;
        std::fs::rename(&tmp, &self.cursor_path)?;
        Ok(())
    }
}

#[async_trait]
impl Channel for FileChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn max_text_length(&self) -> usize {
        self.max_text_length
    }

    async fn receive(&self) -> anyhow::Result<Option<InboundMessage>> {
        let text = std::fs::read_to_string(&self.inbox_path)?;
        let lines: Vec<&str> = text.lines().collect();

        let mut cursor = self.cursor.lock().await;
        if *cursor >= lines.len() {
            return Ok(None);
        }
        let line = lines[*cursor];
        *cursor += 1;
        self.persist_cursor(*cursor)?;

        let (sender, body) = match line.split_once('\t') {
            Some((sender, body)) => (sender, body),
            None => ("unknown", line),
        };
        debug!(channel = %self.id, sender, "file channel received message");
        Ok(Some(InboundMessage::new(&self.id, sender, body)))
    }

    async fn send(&self, recipient: &str, text: &str, thread_id: Option<&str>) -> anyhow::Result<()> {
        let thread = thread_id.unwrap_or("-");
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.outbox_path)?;
        for chunk in self.chunk(text) {
            writeln!(file, "{recipient}\t{thread}\t{chunk}")?;
        }
        debug!(channel = %self.id, recipient, ts = %Utc::now(), "file channel sent message");
        Ok(())
    }
}
