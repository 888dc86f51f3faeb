// SPDX-License-Identifier: Apache-2.0
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::record::Memory;
use crate::retrieval::{score, tokenize};

const CAPACITY: usize = 1000;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Owns `.memory/memories.jsonl`: an append-only log on disk paired with an
/// in-memory mirror capped at `CAPACITY` entries (oldest evicted first). The
/// log itself is never compacted; only the mirror enforces the cap, so a
/// reload keeps just the most recent `CAPACITY` lines.
pub struct MemoryStore {
    path: PathBuf,
    records: Mutex<VecDeque<Memory>>,
}

impl MemoryStore {
    pub fn open(workspace_dir: &Path) -> Result<Self, MemoryError> {
        let dir = workspace_dir.join(".memory");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("memories.jsonl");

        let mut records = VecDeque::new();
        if let Ok(text) = std::fs::read_to_string(&path) {
            for line in text.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<Memory>(line) {
                    Ok(memory) => {
                        records.push_back(memory);
                        if records.len() > CAPACITY {
                            records.pop_front();
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "skipping corrupt memory record");
                    }
                }
            }
        }

        Ok(Self { path, records: Mutex::new(records) })
    }

    /// Append a memory, evicting the oldest mirror entry if capacity is
    /// exceeded. The on-disk log is always appended to, never truncated.
    pub async fn add(
        &self,
        content: &str,
        session_key: &str,
        tags: Vec<String>,
        importance: Option<f64>,
    ) -> Result<Memory, MemoryError> {
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            content: content.to_string(),
            session_key: session_key.to_string(),
            created_at: Utc::now(),
            tags,
            importance,
        };

        let line = serde_json::to_string(&memory)?;
        let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;

        let mut records = self.records.lock().await;
        records.push_back(memory.clone());
        if records.len() > CAPACITY {
            records.pop_front();
        }
        Ok(memory)
    }

    pub async fn count(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Top-`top_k` memories by keyword score against `query`, positive
    /// scores only, highest first (ties keep insertion order).
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Vec<Memory> {
        let tokens = tokenize(query);
        if tokens.is_empty() {
            return Vec::new();
        }
        let query_lower = query.to_lowercase();
        let records = self.records.lock().await;

        let mut scored: Vec<(f64, Memory)> = records
            .iter()
            .map(|m| (score(&tokens, &query_lower, m), m.clone()))
            .filter(|(s, _)| *s > 0.0)
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.into_iter().take(top_k).map(|(_, m)| m).collect()
    }

    pub async fn list(&self) -> Vec<Memory> {
        self.records.lock().await.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_then_retrieve_finds_substring_match() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        store.add("User prefers the color blue", "k", vec![], Some(0.5)).await.unwrap();
        let hits = store.retrieve("what color do they like", 3).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "User prefers the color blue");
    }

    #[tokio::test]
    async fn retrieve_excludes_non_positive_scores() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        store.add("completely unrelated content", "k", vec![], None).await.unwrap();
        let hits = store.retrieve("something else entirely", 3).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn retrieve_respects_top_k() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        for i in 0..5 {
            store.add(&format!("likes apples variant {i}"), "k", vec![], None).await.unwrap();
        }
        let hits = store.retrieve("apples", 3).await;
        assert_eq!(hits.len(), 3);
    }

    #[tokio::test]
    async fn capacity_1000_evicts_oldest_fifo() {
        let dir = tempdir().unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        for i in 0..1001 {
            store.add(&format!("memory number {i}"), "k", vec![], None).await.unwrap();
        }
        assert_eq!(store.count().await, 1000);
        let all = store.list().await;
        assert!(!all.iter().any(|m| m.content == "memory number 0"));
        assert!(all.iter().any(|m| m.content == "memory number 1000"));
    }

    #[tokio::test]
    async fn reopen_reloads_mirror_from_disk() {
        let dir = tempdir().unwrap();
        {
            let store = MemoryStore::open(dir.path()).unwrap();
            store.add("a durable memory", "k", vec![], None).await.unwrap();
        }
        let store = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn corrupt_line_is_skipped_on_load() {
        let dir = tempdir().unwrap();
        let mem_dir = dir.path().join(".memory");
        std::fs::create_dir_all(&mem_dir).unwrap();
        std::fs::write(mem_dir.join("memories.jsonl"), "not json\n").unwrap();
        let store = MemoryStore::open(dir.path()).unwrap();
        assert_eq!(store.count().await, 0);
    }
}
