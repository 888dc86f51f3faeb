// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "waygate", about = "Agent gateway: routes messages to agents, runs the tool loop, delivers replies")]
pub struct Cli {
    /// Path to an explicit config file, merged on top of every discovered layer.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Defaults to info.
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the gateway: the agent loop, the HTTP dispatch surface, the
    /// scheduler tick loop, and the delivery worker, all concurrently.
    Serve,

    /// Print the fully merged configuration and exit.
    ShowConfig,

    /// Inspect and manage conversation sessions.
    #[command(subcommand)]
    Sessions(SessionsCommands),

    /// Inspect and manage routing bindings.
    #[command(subcommand)]
    Bindings(BindingsCommands),

    /// Inspect and manage scheduled jobs.
    #[command(subcommand)]
    Jobs(JobsCommands),

    /// Inspect and manage the delivery queue.
    #[command(subcommand)]
    Queue(QueueCommands),

    /// Inspect and edit agent souls (personas).
    #[command(subcommand)]
    Souls(SoulsCommands),
}

#[derive(Subcommand, Debug)]
pub enum SessionsCommands {
    /// List every known session.
    List,
    /// Show one session's replayed history.
    Show { key: String },
    /// Delete a session's transcript and index entry.
    Delete { key: String },
}

#[derive(Subcommand, Debug)]
pub enum BindingsCommands {
    /// List bindings, optionally filtered to one agent.
    List {
        #[arg(long)]
        agent: Option<String>,
    },
    /// Create (or re-prioritize) a `(channel, peer) -> agent` binding.
    Add {
        agent: String,
        channel: String,
        peer: String,
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// Remove a binding by id.
    Remove { id: String },
}

#[derive(Subcommand, Debug)]
pub enum JobsCommands {
    /// List every scheduled job, with its last result if any.
    List,
    /// Schedule a one-shot job at an RFC-3339 timestamp.
    At { agent: String, name: String, prompt: String, at: String },
    /// Schedule a recurring job at a fixed interval (e.g. `5m`, `1h`).
    Every {
        agent: String,
        name: String,
        prompt: String,
        interval: String,
        #[arg(long)]
        max_runs: Option<u64>,
    },
    /// Schedule a recurring job on a 5-field cron expression.
    Cron {
        agent: String,
        name: String,
        prompt: String,
        cron: String,
        #[arg(long)]
        max_runs: Option<u64>,
    },
    /// Delete a job by id.
    Delete { id: String },
    /// Enable or disable a job without deleting it.
    Toggle { id: String, enabled: bool },
}

#[derive(Subcommand, Debug)]
pub enum QueueCommands {
    /// Print delivery counts per status.
    Stats,
    /// Enqueue an outbound message for delivery.
    Enqueue { channel: String, recipient: String, content: String },
    /// List messages currently parked in the dead-letter tier.
    DeadLetters {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Move a dead-lettered message back to Pending with a fresh attempt budget.
    Retry { id: String },
}

#[derive(Subcommand, Debug)]
pub enum SoulsCommands {
    /// Print an agent's soul (creating the default one in memory if it has none on disk).
    Show { agent_id: String },
}
