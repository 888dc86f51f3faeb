// SPDX-License-Identifier: Apache-2.0
use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::backoff::backoff_for_attempt;
use crate::status::DeliveryStatus;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("delivery message '{0}' not found")]
    NotFound(String),
    #[error("delivery message '{0}' is not in DeadLetter status")]
    NotDeadLetter(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryMessage {
    pub id: String,
    pub channel: String,
    pub recipient: String,
    pub content: String,
    pub thread_id: Option<String>,
    pub session_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub status: DeliveryStatus,
    pub attempt_count: u32,
    pub max_attempts: u32,
    pub last_error: Option<String>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub priority: i64,
}

#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    pub thread_id: Option<String>,
    pub session_key: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub priority: Option<i64>,
    pub max_attempts: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dead_letter: u64,
    pub total: u64,
}

fn to_rfc3339(dt: Option<DateTime<Utc>>) -> Option<String> {
    dt.map(|d| d.to_rfc3339())
}

fn parse_ts(s: Option<String>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(&s).ok()).map(|d| d.with_timezone(&Utc))
}

fn row_to_message(row: &Row) -> rusqlite::Result<DeliveryMessage> {
    Ok(DeliveryMessage {
        id: row.get("id")?,
        channel: row.get("channel")?,
        recipient: row.get("recipient")?,
        content: row.get("content")?,
        thread_id: row.get("thread_id")?,
        session_key: row.get("session_key")?,
        created_at: parse_ts(row.get("created_at")?).unwrap_or_else(Utc::now),
        scheduled_at: parse_ts(row.get("scheduled_at")?),
        delivered_at: parse_ts(row.get("delivered_at")?),
        status: DeliveryStatus::from_i64(row.get("status")?),
        attempt_count: row.get::<_, i64>("attempt_count")? as u32,
        max_attempts: row.get::<_, i64>("max_attempts")? as u32,
        last_error: row.get("last_error")?,
        next_attempt_at: parse_ts(row.get("next_attempt_at")?),
        priority: row.get("priority")?,
    })
}

/// Owns `.queue/delivery.db`: the `messages` relational table with secondary
/// indexes on `status` and `next_attempt_at`, serialized behind a single
/// in-process mutex (the queue's single-writer region, §5).
pub struct DeliveryQueue {
    conn: Mutex<Connection>,
    default_max_attempts: u32,
}

impl DeliveryQueue {
    pub fn open(workspace_dir: &Path, default_max_attempts: u32) -> Result<Self, QueueError> {
        let dir = workspace_dir.join(".queue");
        std::fs::create_dir_all(&dir)?;
        let conn = Connection::open(dir.join("delivery.db"))?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS messages (
                id              TEXT PRIMARY KEY,
                channel         TEXT NOT NULL,
                recipient       TEXT NOT NULL,
                content         TEXT NOT NULL,
                thread_id       TEXT,
                session_key     TEXT,
                created_at      TEXT NOT NULL,
                scheduled_at    TEXT,
                delivered_at    TEXT,
                status          INTEGER NOT NULL,
                attempt_count   INTEGER NOT NULL DEFAULT 0,
                max_attempts    INTEGER NOT NULL,
                last_error      TEXT,
                next_attempt_at TEXT,
                priority        INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX IF NOT EXISTS idx_messages_status ON messages(status);
            CREATE INDEX IF NOT EXISTS idx_messages_next_attempt_at ON messages(next_attempt_at);",
        )?;
        Ok(Self { conn: Mutex::new(conn), default_max_attempts })
    }

    pub async fn enqueue(
        &self,
        channel: &str,
        recipient: &str,
        content: &str,
        opts: EnqueueOptions,
    ) -> Result<String, QueueError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO messages
                (id, channel, recipient, content, thread_id, session_key, created_at,
                 scheduled_at, delivered_at, status, attempt_count, max_attempts,
                 last_error, next_attempt_at, priority)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, 0, ?10, NULL, ?11, ?12)",
            params![
                id,
                channel,
                recipient,
                content,
                opts.thread_id,
                opts.session_key,
                Utc::now().to_rfc3339(),
                to_rfc3339(opts.scheduled_at),
                DeliveryStatus::Pending.as_i64(),
                None::<String>,
                opts.max_attempts.unwrap_or(self.default_max_attempts) as i64,
                opts.priority.unwrap_or(0),
            ],
        )?;
        Ok(id)
    }

    /// The ready predicate: `status ∈ {Pending, Failed}`, attempts remaining,
    /// and both `scheduled_at`/`next_attempt_at` in the past (or unset).
    /// Selection order: `priority DESC, created_at ASC`.
    pub async fn get_pending(&self, limit: u32) -> Result<Vec<DeliveryMessage>, QueueError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM messages
             WHERE status IN (?1, ?2)
               AND attempt_count < max_attempts
               AND (scheduled_at IS NULL OR scheduled_at <= ?3)
               AND (next_attempt_at IS NULL OR next_attempt_at <= ?3)
             ORDER BY priority DESC, created_at ASC
             LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![
                DeliveryStatus::Pending.as_i64(),
                DeliveryStatus::Failed.as_i64(),
                now,
                limit as i64,
            ],
            row_to_message,
        )?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Atomically reserve a message: set status=Processing, increment
    /// `attempt_count`.
    pub async fn mark_processing(&self, id: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE messages SET status = ?1, attempt_count = attempt_count + 1 WHERE id = ?2",
            params![DeliveryStatus::Processing.as_i64(), id],
        )?;
        if changed == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    pub async fn mark_delivered(&self, id: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE messages SET status = ?1, delivered_at = ?2 WHERE id = ?3",
            params![DeliveryStatus::Delivered.as_i64(), Utc::now().to_rfc3339(), id],
        )?;
        if changed == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// `attempt_count` was already incremented by `mark_processing`; once it
    /// reaches `max_attempts` the message moves to `DeadLetter` with no
    /// further `next_attempt_at`, otherwise to `Failed` with back-off applied.
    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().await;
        let (attempt_count, max_attempts): (i64, i64) = conn
            .query_row(
                "SELECT attempt_count, max_attempts FROM messages WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if attempt_count >= max_attempts {
            conn.execute(
                "UPDATE messages
                 SET status = ?1, last_error = ?2, next_attempt_at = NULL
                 WHERE id = ?3",
                params![DeliveryStatus::DeadLetter.as_i64(), error, id],
            )?;
        } else {
            let next_attempt_at = Utc::now() + backoff_for_attempt(attempt_count as u32);
            conn.execute(
                "UPDATE messages
                 SET status = ?1, last_error = ?2, next_attempt_at = ?3
                 WHERE id = ?4",
                params![
                    DeliveryStatus::Failed.as_i64(),
                    error,
                    next_attempt_at.to_rfc3339(),
                    id
                ],
            )?;
        }
        Ok(())
    }

    pub async fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let conn = self.conn.lock().await;
        let mut stats = QueueStats::default();
        let mut stmt = conn.prepare("SELECT status, COUNT(*) FROM messages GROUP BY status")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (status, count) = row?;
            let count = count as u64;
            match DeliveryStatus::from_i64(status) {
                DeliveryStatus::Pending => stats.pending = count,
                DeliveryStatus::Processing => stats.processing = count,
                DeliveryStatus::Delivered => stats.delivered = count,
                DeliveryStatus::Failed => stats.failed = count,
                DeliveryStatus::DeadLetter => stats.dead_letter = count,
            }
            stats.total += count;
        }
        Ok(stats)
    }

    pub async fn get_dead_letters(&self, limit: u32) -> Result<Vec<DeliveryMessage>, QueueError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(
            "SELECT * FROM messages WHERE status = ?1 ORDER BY created_at ASC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![DeliveryStatus::DeadLetter.as_i64(), limit as i64], row_to_message)?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// The only allowed reverse transition: resets `attempt_count` to 0,
    /// clears `last_error`/`next_attempt_at`, and sets status back to Pending.
    pub async fn retry_dead_letter(&self, id: &str) -> Result<(), QueueError> {
        let conn = self.conn.lock().await;
        let status: i64 = conn
            .query_row("SELECT status FROM messages WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if DeliveryStatus::from_i64(status) != DeliveryStatus::DeadLetter {
            return Err(QueueError::NotDeadLetter(id.to_string()));
        }
        conn.execute(
            "UPDATE messages
             SET status = ?1, attempt_count = 0, last_error = NULL, next_attempt_at = NULL
             WHERE id = ?2",
            params![DeliveryStatus::Pending.as_i64(), id],
        )?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<DeliveryMessage, QueueError> {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT * FROM messages WHERE id = ?1", params![id], row_to_message)
            .optional()?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn queue(dir: &tempfile::TempDir) -> DeliveryQueue {
        DeliveryQueue::open(dir.path(), 5).unwrap()
    }

    #[tokio::test]
    async fn enqueue_then_get_pending_returns_it() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let id = q.enqueue("file", "u", "hello", EnqueueOptions::default()).await.unwrap();
        let pending = q.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].status, DeliveryStatus::Pending);
    }

    #[tokio::test]
    async fn scheduled_future_message_not_pending_yet() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let future = Utc::now() + chrono::Duration::seconds(60);
        q.enqueue("file", "u", "hi", EnqueueOptions { scheduled_at: Some(future), ..Default::default() })
            .await
            .unwrap();
        assert!(q.get_pending(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn reserve_success_path_reaches_delivered() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let id = q.enqueue("file", "u", "hi", EnqueueOptions::default()).await.unwrap();
        q.mark_processing(&id).await.unwrap();
        let msg = q.get(&id).await.unwrap();
        assert_eq!(msg.status, DeliveryStatus::Processing);
        assert_eq!(msg.attempt_count, 1);
        q.mark_delivered(&id).await.unwrap();
        let msg = q.get(&id).await.unwrap();
        assert_eq!(msg.status, DeliveryStatus::Delivered);
        assert!(msg.delivered_at.is_some());
    }

    #[tokio::test]
    async fn s_c_dead_letter_and_retry_scenario() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let id = q.enqueue("file", "u", "x", EnqueueOptions::default()).await.unwrap();

        for _ in 0..5 {
            q.mark_processing(&id).await.unwrap();
            q.mark_failed(&id, "boom").await.unwrap();
        }

        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.dead_letter, 1);

        let dead = q.get_dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("boom"));

        q.retry_dead_letter(&id).await.unwrap();
        let msg = q.get(&id).await.unwrap();
        assert_eq!(msg.status, DeliveryStatus::Pending);
        assert_eq!(msg.attempt_count, 0);
        assert!(msg.last_error.is_none());

        q.mark_processing(&id).await.unwrap();
        q.mark_delivered(&id).await.unwrap();
        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dead_letter, 0);
    }

    #[tokio::test]
    async fn backoff_next_attempt_at_uses_schedule() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let id = q.enqueue("file", "u", "x", EnqueueOptions::default()).await.unwrap();
        q.mark_processing(&id).await.unwrap();
        let before = Utc::now();
        q.mark_failed(&id, "boom").await.unwrap();
        let msg = q.get(&id).await.unwrap();
        let delta = msg.next_attempt_at.unwrap() - before;
        assert!(delta.num_seconds() >= 1 && delta.num_seconds() <= 2);
    }

    #[tokio::test]
    async fn retry_dead_letter_rejects_non_dead_letter_message() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let id = q.enqueue("file", "u", "x", EnqueueOptions::default()).await.unwrap();
        assert!(q.retry_dead_letter(&id).await.is_err());
    }

    #[tokio::test]
    async fn get_stats_counts_total() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        q.enqueue("file", "a", "x", EnqueueOptions::default()).await.unwrap();
        q.enqueue("file", "b", "y", EnqueueOptions::default()).await.unwrap();
        let stats = q.get_stats().await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.pending, 2);
    }

    #[tokio::test]
    async fn get_pending_orders_by_priority_desc_then_created_at_asc() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        let low = q
            .enqueue("file", "a", "low", EnqueueOptions { priority: Some(1), ..Default::default() })
            .await
            .unwrap();
        let high = q
            .enqueue("file", "a", "high", EnqueueOptions { priority: Some(9), ..Default::default() })
            .await
            .unwrap();
        let pending = q.get_pending(10).await.unwrap();
        assert_eq!(pending[0].id, high);
        assert_eq!(pending[1].id, low);
    }

    #[tokio::test]
    async fn default_limit_respected() {
        let dir = tempdir().unwrap();
        let q = queue(&dir);
        for i in 0..15 {
            q.enqueue("file", "a", &format!("m{i}"), EnqueueOptions::default()).await.unwrap();
        }
        let pending = q.get_pending(10).await.unwrap();
        assert_eq!(pending.len(), 10);
    }
}
