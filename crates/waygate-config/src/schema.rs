// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Per-agent overrides, keyed by agent id.
    #[serde(default)]
    pub agents: HashMap<String, AgentOverride>,
    /// Root directory for every on-disk store (`.sessions/`, `.routing/`, …).
    #[serde(default = "default_workspace_dir")]
    pub workspace_dir: PathBuf,
}

fn default_workspace_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("workspace")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            agent: AgentConfig::default(),
            tools: ToolsConfig::default(),
            routing: RoutingConfig::default(),
            scheduler: SchedulerConfig::default(),
            queue: QueueConfig::default(),
            channels: ChannelsConfig::default(),
            agents: HashMap::new(),
            workspace_dir: default_workspace_dir(),
        }
    }
}

/// Per-agent overrides: which soul file to load, whether to use a different
/// model than the top-level default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentOverride {
    pub soul_path: Option<String>,
    pub model: Option<String>,
}

fn default_model_name() -> String {
    "deepseek-chat".into()
}
fn default_model_base_url() -> String {
    "https://api.deepseek.com/v1".into()
}
fn default_model_max_tokens() -> u32 {
    4096
}
fn default_model_temperature() -> f32 {
    0.2
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier forwarded to the backend API.
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Explicit API key; prefer the WAYGATE_API_KEY environment variable in
    /// practice so secrets never land in a committed config file.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Base URL of the OpenAI-compatible chat-completions endpoint.
    #[serde(default = "default_model_base_url")]
    pub base_url: String,
    /// Maximum tokens to request in a single completion.
    #[serde(default = "default_model_max_tokens")]
    pub max_tokens: u32,
    /// Sampling temperature.
    #[serde(default = "default_model_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            name: default_model_name(),
            api_key: None,
            base_url: default_model_base_url(),
            max_tokens: default_model_max_tokens(),
            temperature: default_model_temperature(),
        }
    }
}

fn default_max_tool_iterations() -> u32 {
    32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard bound on tool-call fixed-point iterations per turn.
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    /// Agent id used when routing resolves to no configured binding.
    #[serde(default = "default_agent_id")]
    pub default_agent_id: String,
}

fn default_agent_id() -> String {
    "main".into()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            default_agent_id: default_agent_id(),
        }
    }
}

fn default_tool_timeout_secs() -> u64 {
    30
}
fn default_tool_truncate_chars() -> usize {
    50_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Per-call timeout applied to every tool invocation.
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
    /// Character cap applied to a tool's result before it enters history.
    #[serde(default = "default_tool_truncate_chars")]
    pub truncate_chars: usize,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_tool_timeout_secs(),
            truncate_chars: default_tool_truncate_chars(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_agent_id")]
    pub default_agent_id: String,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_agent_id: default_agent_id(),
        }
    }
}

fn default_scheduler_tick_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// How often the scheduler loop wakes up to check for due jobs.
    #[serde(default = "default_scheduler_tick_secs")]
    pub tick_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_scheduler_tick_secs(),
        }
    }
}

fn default_queue_poll_secs() -> u64 {
    1
}
fn default_queue_error_sleep_secs() -> u64 {
    5
}
fn default_max_attempts() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// How often the delivery worker polls for pending messages.
    #[serde(default = "default_queue_poll_secs")]
    pub poll_secs: u64,
    /// How long the worker sleeps after a poll error before trying again.
    #[serde(default = "default_queue_error_sleep_secs")]
    pub error_sleep_secs: u64,
    /// Default retry budget for newly enqueued messages.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            poll_secs: default_queue_poll_secs(),
            error_sleep_secs: default_queue_error_sleep_secs(),
            default_max_attempts: default_max_attempts(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub file: FileChannelConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChannelConfig {
    pub inbox_file: Option<String>,
    pub outbox_file: Option<String>,
}

impl Default for FileChannelConfig {
    fn default() -> Self {
        Self {
            inbox_file: None,
            outbox_file: None,
        }
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
