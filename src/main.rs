// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{BindingsCommands, Cli, Commands, JobsCommands, QueueCommands, SessionsCommands, SoulsCommands};
use waygate_channels::{Channel, FileChannel};
use waygate_core::{AgentLoop, SoulStore};
use waygate_gateway::{build_router, register_methods, GatewayState};
use waygate_memory::MemoryStore;
use waygate_queue::{DeliveryQueue, EnqueueOptions};
use waygate_routing::Router;
use waygate_scheduler::{JobResult, Scheduler};
use waygate_sessions::SessionStore;
use waygate_tools::{ReadFileTool, ShellTool, ToolRegistry};

const HTTP_ADDR: &str = "127.0.0.1:8791";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = waygate_config::load(cli.config.as_deref())?;

    match &cli.command {
        Some(Commands::ShowConfig) => {
            println!("{}", serde_yaml::to_string(&config)?);
            return Ok(());
        }
        Some(Commands::Sessions(cmd)) => return run_sessions_command(&config, cmd).await,
        Some(Commands::Bindings(cmd)) => return run_bindings_command(&config, cmd).await,
        Some(Commands::Jobs(cmd)) => return run_jobs_command(&config, cmd).await,
        Some(Commands::Queue(cmd)) => return run_queue_command(&config, cmd).await,
        Some(Commands::Souls(cmd)) => return run_souls_command(&config, cmd).await,
        Some(Commands::Serve) | None => {}
    }

    serve(config).await
}

fn init_logging(verbosity: u8) {
    let default = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry().with(fmt::layer()).with(filter).try_init();
}

struct Stores {
    sessions: Arc<SessionStore>,
    router: Arc<Router>,
    scheduler: Arc<Scheduler>,
    queue: Arc<DeliveryQueue>,
    memory: Arc<MemoryStore>,
    souls: Arc<SoulStore>,
}

fn open_stores(config: &waygate_config::Config) -> anyhow::Result<Stores> {
    std::fs::create_dir_all(&config.workspace_dir)
        .with_context(|| format!("creating workspace dir {}", config.workspace_dir.display()))?;
    Ok(Stores {
        sessions: Arc::new(SessionStore::open(&config.workspace_dir)?),
        router: Arc::new(Router::open(&config.workspace_dir, config.routing.default_agent_id.as_str())?),
        scheduler: Arc::new(Scheduler::open(&config.workspace_dir)?),
        queue: Arc::new(DeliveryQueue::open(&config.workspace_dir, config.queue.default_max_attempts)?),
        memory: Arc::new(MemoryStore::open(&config.workspace_dir)?),
        souls: Arc::new(SoulStore::open(&config.workspace_dir)?),
    })
}

fn build_agent_loop(config: &waygate_config::Config, stores: &Stores) -> anyhow::Result<Arc<AgentLoop>> {
    let backend: Arc<dyn waygate_model::BackendClient> = Arc::from(waygate_model::from_config(&config.model)?);
    let mut registry = ToolRegistry::new(config.tools.timeout_secs, config.tools.truncate_chars);
    registry.register(ReadFileTool { workspace_root: config.workspace_dir.clone() });
    registry.register(ShellTool::default());

    Ok(Arc::new(AgentLoop::new(
        stores.sessions.clone(),
        stores.memory.clone(),
        Arc::new(registry),
        backend,
        config.agent.max_tool_iterations,
        config.model.max_tokens,
        config.model.temperature,
    )))
}

/// Run the gateway: the HTTP dispatch surface, the scheduler tick loop, the
/// delivery worker, and an interactive stdin front-end, all concurrently.
/// A single Ctrl-C propagates to every loop.
async fn serve(config: waygate_config::Config) -> anyhow::Result<()> {
    let config = Arc::new(config);
    let stores = open_stores(&config)?;
    let agent_loop = build_agent_loop(&config, &stores)?;

    let file_channel: Arc<dyn Channel> =
        Arc::new(FileChannel::open(&config.workspace_dir, "file", 4000).context("opening file channel")?);
    let mut channels: HashMap<String, Arc<dyn Channel>> = HashMap::new();
    channels.insert(file_channel.id().to_string(), file_channel.clone());

    let gateway_state = GatewayState {
        agent_loop: agent_loop.clone(),
        sessions: stores.sessions.clone(),
        router: stores.router.clone(),
        scheduler: stores.scheduler.clone(),
        queue: stores.queue.clone(),
        memory: stores.memory.clone(),
        souls: stores.souls.clone(),
        channels: Arc::new(channels),
    };

    let mut dispatcher = waygate_gateway::Dispatcher::new();
    register_methods(&mut dispatcher, gateway_state);
    let http_app = build_router(dispatcher);

    let listener = tokio::net::TcpListener::bind(HTTP_ADDR).await.with_context(|| format!("binding {HTTP_ADDR}"))?;
    tracing::info!(addr = HTTP_ADDR, "gateway HTTP surface listening");

    let shutdown = Arc::new(tokio::sync::Notify::new());

    let http_task = {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, http_app)
                .with_graceful_shutdown(async move { shutdown.notified().await })
                .await
        })
    };

    let scheduler_task = {
        let shutdown = shutdown.clone();
        let scheduler = stores.scheduler.clone();
        let agent_loop = agent_loop.clone();
        let souls = stores.souls.clone();
        let tick_secs = config.scheduler.tick_secs;
        tokio::spawn(async move { scheduler_loop(scheduler, agent_loop, souls, tick_secs, shutdown).await })
    };

    let queue_task = {
        let shutdown = shutdown.clone();
        let queue = stores.queue.clone();
        let channels = vec![file_channel.clone()];
        let poll_secs = config.queue.poll_secs;
        let error_sleep_secs = config.queue.error_sleep_secs;
        tokio::spawn(async move { delivery_loop(queue, channels, poll_secs, error_sleep_secs, shutdown).await })
    };

    let stdin_task = {
        let shutdown = shutdown.clone();
        let agent_loop = agent_loop.clone();
        let souls = stores.souls.clone();
        let default_agent_id = config.agent.default_agent_id.clone();
        tokio::task::spawn_blocking(move || stdin_loop(agent_loop, souls, default_agent_id, shutdown))
    };

    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    tracing::info!("shutdown requested");
    shutdown.notify_waiters();

    let _ = http_task.await;
    let _ = scheduler_task.await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), queue_task).await;
    let _ = stdin_task.await;
    Ok(())
}

async fn scheduler_loop(
    scheduler: Arc<Scheduler>,
    agent_loop: Arc<AgentLoop>,
    souls: Arc<SoulStore>,
    tick_secs: u64,
    shutdown: Arc<tokio::sync::Notify>,
) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(tick_secs));
    loop {
        tokio::select! {
            _ = shutdown.notified() => return,
            _ = interval.tick() => {}
        }

        let due = scheduler.get_due(chrono::Utc::now()).await;
        for job in due {
            let session_key = format!("{}:cron:{}", job.agent_id, job.id);
            let soul = match souls.get(&job.agent_id) {
                Ok(soul) => soul,
                Err(err) => {
                    tracing::warn!(job = %job.id, %err, "failed to load soul for scheduled job");
                    continue;
                }
            };
            let result = match agent_loop.run(&job.prompt, &session_key, &soul).await {
                Ok(text) => JobResult::Success { text },
                Err(err) => JobResult::Failure { error: err.to_string() },
            };
            if let Err(err) = scheduler.mark_executed(&job.id, result).await {
                tracing::warn!(job = %job.id, %err, "failed to record scheduled job outcome");
            }
        }
    }
}

async fn delivery_loop(
    queue: Arc<DeliveryQueue>,
    channels: Vec<Arc<dyn Channel>>,
    poll_secs: u64,
    error_sleep_secs: u64,
    shutdown: Arc<tokio::sync::Notify>,
) {
    let by_id: HashMap<&str, &Arc<dyn Channel>> = channels.iter().map(|c| (c.id(), c)).collect();
    loop {
        tokio::select! {
            _ = shutdown.notified() => return,
            _ = tokio::time::sleep(std::time::Duration::from_secs(poll_secs)) => {}
        }

        let pending = match queue.get_pending(10).await {
            Ok(pending) => pending,
            Err(err) => {
                tracing::warn!(%err, "delivery queue poll failed");
                tokio::time::sleep(std::time::Duration::from_secs(error_sleep_secs)).await;
                continue;
            }
        };

        for message in pending {
            if queue.mark_processing(&message.id).await.is_err() {
                continue;
            }
            let outcome = match by_id.get(message.channel.as_str()) {
                Some(channel) => channel.send(&message.recipient, &message.content, message.thread_id.as_deref()).await,
                None => Err(anyhow::anyhow!("no channel registered for '{}'", message.channel)),
            };
            match outcome {
                Ok(()) => {
                    if let Err(err) = queue.mark_delivered(&message.id).await {
                        tracing::warn!(message = %message.id, %err, "failed to mark message delivered");
                    }
                }
                Err(err) => {
                    if let Err(mark_err) = queue.mark_failed(&message.id, &err.to_string()).await {
                        tracing::warn!(message = %message.id, %mark_err, "failed to mark message failed");
                    }
                }
            }
        }
    }
}

/// A minimal line-oriented front-end: each line of stdin is one turn against
/// `default_agent_id`'s CLI session. Runs on a blocking thread since stdin
/// reads are synchronous; polls the shutdown flag between lines.
fn stdin_loop(agent_loop: Arc<AgentLoop>, souls: Arc<SoulStore>, default_agent_id: String, shutdown: Arc<tokio::sync::Notify>) {
    let handle = tokio::runtime::Handle::current();
    let stdin = io::stdin();
    let session_key = format!("{default_agent_id}:cli:operator");
    print!("> ");
    let _ = io::stdout().flush();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let line = line.trim();
        if line.is_empty() {
            print!("> ");
            let _ = io::stdout().flush();
            continue;
        }
        if line == "exit" || line == "quit" {
            shutdown.notify_waiters();
            return;
        }

        let soul = match souls.get(&default_agent_id) {
            Ok(soul) => soul,
            Err(err) => {
                eprintln!("soul store error: {err}");
                continue;
            }
        };
        match handle.block_on(agent_loop.run(line, &session_key, &soul)) {
            Ok(reply) => println!("{reply}"),
            Err(err) => eprintln!("error: {err}"),
        }
        print!("> ");
        let _ = io::stdout().flush();
    }
}

// ── Management subcommands ───────────────────────────────────────────────────

async fn run_sessions_command(config: &waygate_config::Config, cmd: &SessionsCommands) -> anyhow::Result<()> {
    let sessions = SessionStore::open(&config.workspace_dir)?;
    match cmd {
        SessionsCommands::List => {
            for meta in sessions.list().await {
                println!("{}\t{}\t{} messages", meta.key, meta.session_id, meta.message_count);
            }
        }
        SessionsCommands::Show { key } => {
            let (meta, history) = sessions.load(key).await?;
            println!("session {} ({} messages)", meta.session_id, meta.message_count);
            for message in history {
                println!("{:?}: {}", message.role, message.as_text().unwrap_or("<blocks>"));
            }
        }
        SessionsCommands::Delete { key } => {
            sessions.delete(key).await?;
            println!("deleted {key}");
        }
    }
    Ok(())
}

async fn run_bindings_command(config: &waygate_config::Config, cmd: &BindingsCommands) -> anyhow::Result<()> {
    let router = Router::open(&config.workspace_dir, config.routing.default_agent_id.as_str())?;
    match cmd {
        BindingsCommands::List { agent } => {
            let bindings = match agent {
                Some(agent_id) => router.list_for_agent(agent_id).await,
                None => router.list().await,
            };
            for binding in bindings {
                println!(
                    "{}\t{} -> {} (priority {}, enabled={})",
                    binding.id, binding.channel, binding.agent_id, binding.priority, binding.enabled
                );
            }
        }
        BindingsCommands::Add { agent, channel, peer, priority } => {
            let binding = router.create_binding(agent.as_str(), channel.as_str(), peer.as_str(), *priority).await?;
            println!("{}", binding.id);
        }
        BindingsCommands::Remove { id } => {
            let removed = router.remove_binding(id).await?;
            println!("{}", if removed { "removed" } else { "not found" });
        }
    }
    Ok(())
}

async fn run_jobs_command(config: &waygate_config::Config, cmd: &JobsCommands) -> anyhow::Result<()> {
    let scheduler = Scheduler::open(&config.workspace_dir)?;
    match cmd {
        JobsCommands::List => {
            for job in scheduler.get_all().await {
                println!("{}\t{}\t{:?}\tnext_run={:?}", job.id, job.name, job.kind, job.next_run);
            }
        }
        JobsCommands::At { agent, name, prompt, at } => {
            let at = chrono::DateTime::parse_from_rfc3339(at)
                .with_context(|| format!("parsing '{at}' as an RFC-3339 timestamp"))?
                .with_timezone(&chrono::Utc);
            let job = scheduler.create_at(agent, name, prompt, at).await?;
            println!("{}", job.id);
        }
        JobsCommands::Every { agent, name, prompt, interval, max_runs } => {
            let job = scheduler.create_every(agent, name, prompt, interval, *max_runs).await?;
            println!("{}", job.id);
        }
        JobsCommands::Cron { agent, name, prompt, cron, max_runs } => {
            let job = scheduler.create_cron(agent, name, prompt, cron, *max_runs).await?;
            println!("{}", job.id);
        }
        JobsCommands::Delete { id } => {
            let deleted = scheduler.delete(id).await?;
            println!("{}", if deleted { "deleted" } else { "not found" });
        }
        JobsCommands::Toggle { id, enabled } => {
            let updated = scheduler.set_enabled(id, *enabled).await?;
            println!("{}", if updated { "updated" } else { "not found" });
        }
    }
    Ok(())
}

async fn run_queue_command(config: &waygate_config::Config, cmd: &QueueCommands) -> anyhow::Result<()> {
    let queue = DeliveryQueue::open(&config.workspace_dir, config.queue.default_max_attempts)?;
    match cmd {
        QueueCommands::Stats => {
            let stats = queue.get_stats().await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        QueueCommands::Enqueue { channel, recipient, content } => {
            let id = queue.enqueue(channel, recipient, content, EnqueueOptions::default()).await?;
            println!("{id}");
        }
        QueueCommands::DeadLetters { limit } => {
            for message in queue.get_dead_letters(*limit).await? {
                println!("{}\t{}\t{:?}", message.id, message.recipient, message.last_error);
            }
        }
        QueueCommands::Retry { id } => {
            queue.retry_dead_letter(id).await?;
            println!("retried {id}");
        }
    }
    Ok(())
}

async fn run_souls_command(config: &waygate_config::Config, cmd: &SoulsCommands) -> anyhow::Result<()> {
    let souls = SoulStore::open(&config.workspace_dir)?;
    match cmd {
        SoulsCommands::Show { agent_id } => {
            let soul = souls.get(agent_id)?;
            println!("{}", soul.render());
        }
    }
    Ok(())
}
