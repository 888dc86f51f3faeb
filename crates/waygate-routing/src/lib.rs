// SPDX-License-Identifier: Apache-2.0
//! The routing table: persistent `(channel, peer) -> agent` bindings with
//! priority and wildcard resolution.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// A single `(channel, peer) -> agent` routing rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Binding {
    pub id: String,
    pub agent_id: String,
    pub channel: String,
    pub peer: String,
    /// Smaller wins.
    pub priority: i64,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
}

/// Wildcard peer value matching any peer on a channel.
pub const WILDCARD_PEER: &str = "*";

/// The result of resolving a `(channel, peer)` pair to an agent.
#[derive(Debug, Clone)]
pub struct ResolvedRoute {
    pub agent_id: String,
    pub session_key: String,
    pub binding: Option<Binding>,
}

/// Owns `.routing/bindings.json`: the full set of bindings, rewritten after
/// every mutation.
pub struct Router {
    path: PathBuf,
    default_agent_id: String,
    bindings: Mutex<Vec<Binding>>,
}

impl Router {
    pub fn open(workspace_dir: &Path, default_agent_id: impl Into<String>) -> Result<Self, RoutingError> {
        let dir = workspace_dir.join(".routing");
        std::fs::create_dir_all(&dir)?;
        let path = dir.join("bindings.json");
        let bindings = match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        Ok(Self { path, default_agent_id: default_agent_id.into(), bindings: Mutex::new(bindings) })
    }

    fn persist(&self, bindings: &[Binding]) -> Result<(), RoutingError> {
        let text = serde_json::to_string_pretty(bindings)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Create a binding, or update the priority of an existing identical
    /// `(agent_id, channel, peer)` binding in place rather than duplicating it.
    pub async fn create_binding(
        &self,
        agent_id: impl Into<String>,
        channel: impl Into<String>,
        peer: impl Into<String>,
        priority: i64,
    ) -> Result<Binding, RoutingError> {
        let agent_id = agent_id.into();
        let channel = channel.into();
        let peer = peer.into();

        let mut bindings = self.bindings.lock().await;
        if let Some(existing) = bindings
            .iter_mut()
            .find(|b| b.agent_id == agent_id && b.channel == channel && b.peer == peer)
        {
            existing.priority = priority;
            let updated = existing.clone();
            self.persist(&bindings)?;
            return Ok(updated);
        }

        let binding = Binding {
            id: Uuid::new_v4().to_string(),
            agent_id,
            channel,
            peer,
            priority,
            enabled: true,
            created_at: Utc::now(),
        };
        bindings.push(binding.clone());
        self.persist(&bindings)?;
        Ok(binding)
    }

    pub async fn remove_binding(&self, id: &str) -> Result<bool, RoutingError> {
        let mut bindings = self.bindings.lock().await;
        let before = bindings.len();
        bindings.retain(|b| b.id != id);
        let removed = bindings.len() != before;
        if removed {
            self.persist(&bindings)?;
        }
        Ok(removed)
    }

    pub async fn set_enabled(&self, id: &str, enabled: bool) -> Result<bool, RoutingError> {
        let mut bindings = self.bindings.lock().await;
        let Some(binding) = bindings.iter_mut().find(|b| b.id == id) else {
            return Ok(false);
        };
        binding.enabled = enabled;
        self.persist(&bindings)?;
        Ok(true)
    }

    pub async fn list(&self) -> Vec<Binding> {
        self.bindings.lock().await.clone()
    }

    pub async fn list_for_agent(&self, agent_id: &str) -> Vec<Binding> {
        self.bindings
            .lock()
            .await
            .iter()
            .filter(|b| b.agent_id == agent_id)
            .cloned()
            .collect()
    }

    /// Three-phase resolution: exact match, then wildcard peer, then the
    /// configured default agent. Within a phase, the lowest-priority enabled
    /// binding wins; ties break by insertion order (first registered wins).
    pub async fn resolve(&self, channel: &str, peer: &str) -> ResolvedRoute {
        let bindings = self.bindings.lock().await;

        let best = |candidates: Vec<&Binding>| -> Option<Binding> {
            candidates
                .into_iter()
                .enumerate()
                .min_by_key(|(idx, b)| (b.priority, *idx))
                .map(|(_, b)| b.clone())
        };

        let exact = best(
            bindings
                .iter()
                .filter(|b| b.enabled && b.channel == channel && b.peer == peer)
                .collect(),
        );
        let resolved = exact.or_else(|| {
            best(bindings
                .iter()
                .filter(|b| b.enabled && b.channel == channel && b.peer == WILDCARD_PEER)
                .collect())
        });

        let agent_id = resolved
            .as_ref()
            .map(|b| b.agent_id.clone())
            .unwrap_or_else(|| self.default_agent_id.clone());

        ResolvedRoute {
            session_key: format!("{agent_id}:{channel}:{peer}"),
            agent_id,
            binding: resolved,
        }
    }
}
