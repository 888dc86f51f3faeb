// SPDX-License-Identifier: Apache-2.0
//! Wires the 19 named methods onto the gateway's subsystems. Each handler is
//! a thin adapter: deserialize params, call the one operation it fronts,
//! serialize the result.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use waygate_channels::Channel;
use waygate_core::{AgentLoop, Soul, SoulStore};
use waygate_memory::MemoryStore;
use waygate_queue::{DeliveryQueue, EnqueueOptions};
use waygate_routing::Router;
use waygate_scheduler::Scheduler;
use waygate_sessions::SessionStore;

use crate::dispatch::{DispatchError, Dispatcher};

/// Everything a method handler might need. Cheap to clone — every field is
/// an `Arc`.
#[derive(Clone)]
pub struct GatewayState {
    pub agent_loop: Arc<AgentLoop>,
    pub sessions: Arc<SessionStore>,
    pub router: Arc<Router>,
    pub scheduler: Arc<Scheduler>,
    pub queue: Arc<DeliveryQueue>,
    pub memory: Arc<MemoryStore>,
    pub souls: Arc<SoulStore>,
    pub channels: Arc<HashMap<String, Arc<dyn Channel>>>,
}

fn params<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, DispatchError> {
    serde_json::from_value(value).map_err(|err| DispatchError::InvalidParams(err.to_string()))
}

fn ok<T: Serialize>(value: T) -> Result<Value, DispatchError> {
    serde_json::to_value(value).map_err(|err| DispatchError::Internal(err.to_string()))
}

pub fn register_methods(dispatcher: &mut Dispatcher, state: GatewayState) {
    register_send_message(dispatcher, state.clone());
    register_queue_message(dispatcher, state.clone());
    register_queue_stats(dispatcher, state.clone());
    register_list_dead_letters(dispatcher, state.clone());
    register_retry_dead_letter(dispatcher, state.clone());
    register_schedule_at(dispatcher, state.clone());
    register_schedule_every(dispatcher, state.clone());
    register_schedule_cron(dispatcher, state.clone());
    register_list_jobs(dispatcher, state.clone());
    register_delete_job(dispatcher, state.clone());
    register_toggle_job(dispatcher, state.clone());
    register_create_binding(dispatcher, state.clone());
    register_list_bindings(dispatcher, state.clone());
    register_delete_binding(dispatcher, state.clone());
    register_list_sessions(dispatcher, state.clone());
    register_create_session(dispatcher, state.clone());
    register_get_history(dispatcher, state.clone());
    register_get_soul(dispatcher, state.clone());
    register_update_soul(dispatcher, state.clone());
    register_search_memories(dispatcher, state);
}

#[derive(Deserialize)]
struct SendMessageParams {
    channel: String,
    peer: String,
    text: String,
}

fn register_send_message(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("send_message", move |value| {
        let state = state.clone();
        async move {
            let p: SendMessageParams = params(value)?;
            let route = state.router.resolve(&p.channel, &p.peer).await;
            let soul = state
                .souls
                .get(&route.agent_id)
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            let reply = state
                .agent_loop
                .run(&p.text, &route.session_key, &soul)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;

            if let Some(channel) = state.channels.get(&p.channel) {
                channel
                    .send(&p.peer, &reply, None)
                    .await
                    .map_err(|err| DispatchError::Internal(err.to_string()))?;
            }

            ok(json!({
                "agent_id": route.agent_id,
                "session_key": route.session_key,
                "reply": reply,
            }))
        }
    });
}

#[derive(Deserialize)]
struct QueueMessageParams {
    channel: String,
    recipient: String,
    content: String,
    thread_id: Option<String>,
    session_key: Option<String>,
    scheduled_at: Option<DateTime<Utc>>,
    priority: Option<i64>,
    max_attempts: Option<u32>,
}

fn register_queue_message(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("queue_message", move |value| {
        let state = state.clone();
        async move {
            let p: QueueMessageParams = params(value)?;
            let id = state
                .queue
                .enqueue(
                    &p.channel,
                    &p.recipient,
                    &p.content,
                    EnqueueOptions {
                        thread_id: p.thread_id,
                        session_key: p.session_key,
                        scheduled_at: p.scheduled_at,
                        priority: p.priority,
                        max_attempts: p.max_attempts,
                    },
                )
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(json!({ "id": id }))
        }
    });
}

fn register_queue_stats(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("queue_stats", move |_value| {
        let state = state.clone();
        async move {
            let stats = state.queue.get_stats().await.map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(stats)
        }
    });
}

#[derive(Deserialize, Default)]
struct LimitParams {
    limit: Option<u32>,
}

fn register_list_dead_letters(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("list_dead_letters", move |value| {
        let state = state.clone();
        async move {
            let p: LimitParams = if value.is_null() { LimitParams::default() } else { params(value)? };
            let messages = state
                .queue
                .get_dead_letters(p.limit.unwrap_or(10))
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(messages)
        }
    });
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

fn register_retry_dead_letter(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("retry_dead_letter", move |value| {
        let state = state.clone();
        async move {
            let p: IdParams = params(value)?;
            state
                .queue
                .retry_dead_letter(&p.id)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(json!({ "id": p.id }))
        }
    });
}

#[derive(Deserialize)]
struct ScheduleAtParams {
    agent_id: String,
    name: String,
    prompt: String,
    at: DateTime<Utc>,
}

fn register_schedule_at(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("schedule_at", move |value| {
        let state = state.clone();
        async move {
            let p: ScheduleAtParams = params(value)?;
            let job = state
                .scheduler
                .create_at(&p.agent_id, &p.name, &p.prompt, p.at)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(job)
        }
    });
}

#[derive(Deserialize)]
struct ScheduleEveryParams {
    agent_id: String,
    name: String,
    prompt: String,
    interval: String,
    max_runs: Option<u64>,
}

fn register_schedule_every(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("schedule_every", move |value| {
        let state = state.clone();
        async move {
            let p: ScheduleEveryParams = params(value)?;
            let job = state
                .scheduler
                .create_every(&p.agent_id, &p.name, &p.prompt, &p.interval, p.max_runs)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(job)
        }
    });
}

#[derive(Deserialize)]
struct ScheduleCronParams {
    agent_id: String,
    name: String,
    prompt: String,
    cron: String,
    max_runs: Option<u64>,
}

fn register_schedule_cron(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("schedule_cron", move |value| {
        let state = state.clone();
        async move {
            let p: ScheduleCronParams = params(value)?;
            let job = state
                .scheduler
                .create_cron(&p.agent_id, &p.name, &p.prompt, &p.cron, p.max_runs)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(job)
        }
    });
}

fn register_list_jobs(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("list_jobs", move |_value| {
        let state = state.clone();
        async move { ok(state.scheduler.get_all().await) }
    });
}

fn register_delete_job(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("delete_job", move |value| {
        let state = state.clone();
        async move {
            let p: IdParams = params(value)?;
            let deleted = state.scheduler.delete(&p.id).await.map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(json!({ "deleted": deleted }))
        }
    });
}

#[derive(Deserialize)]
struct ToggleJobParams {
    id: String,
    enabled: bool,
}

fn register_toggle_job(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("toggle_job", move |value| {
        let state = state.clone();
        async move {
            let p: ToggleJobParams = params(value)?;
            let updated = state
                .scheduler
                .set_enabled(&p.id, p.enabled)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(json!({ "updated": updated }))
        }
    });
}

#[derive(Deserialize)]
struct CreateBindingParams {
    agent_id: String,
    channel: String,
    peer: String,
    priority: i64,
}

fn register_create_binding(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("create_binding", move |value| {
        let state = state.clone();
        async move {
            let p: CreateBindingParams = params(value)?;
            let binding = state
                .router
                .create_binding(p.agent_id, p.channel, p.peer, p.priority)
                .await
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(binding)
        }
    });
}

#[derive(Deserialize, Default)]
struct ListBindingsParams {
    agent_id: Option<String>,
}

fn register_list_bindings(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("list_bindings", move |value| {
        let state = state.clone();
        async move {
            let p: ListBindingsParams = if value.is_null() { ListBindingsParams::default() } else { params(value)? };
            let bindings = match p.agent_id {
                Some(agent_id) => state.router.list_for_agent(&agent_id).await,
                None => state.router.list().await,
            };
            ok(bindings)
        }
    });
}

fn register_delete_binding(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("delete_binding", move |value| {
        let state = state.clone();
        async move {
            let p: IdParams = params(value)?;
            let removed =
                state.router.remove_binding(&p.id).await.map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(json!({ "removed": removed }))
        }
    });
}

fn register_list_sessions(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("list_sessions", move |_value| {
        let state = state.clone();
        async move { ok(state.sessions.list().await) }
    });
}

#[derive(Deserialize)]
struct KeyParams {
    key: String,
}

fn register_create_session(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("create_session", move |value| {
        let state = state.clone();
        async move {
            let p: KeyParams = params(value)?;
            let meta = state.sessions.create(&p.key).await.map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(meta)
        }
    });
}

fn register_get_history(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("get_history", move |value| {
        let state = state.clone();
        async move {
            let p: KeyParams = params(value)?;
            let (meta, history) =
                state.sessions.load(&p.key).await.map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(json!({ "meta": meta, "history": history }))
        }
    });
}

#[derive(Deserialize)]
struct AgentIdParams {
    agent_id: String,
}

fn register_get_soul(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("get_soul", move |value| {
        let state = state.clone();
        async move {
            let p: AgentIdParams = params(value)?;
            let soul = state.souls.get(&p.agent_id).map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(soul)
        }
    });
}

#[derive(Deserialize)]
struct UpdateSoulParams {
    agent_id: String,
    soul: Soul,
}

fn register_update_soul(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("update_soul", move |value| {
        let state = state.clone();
        async move {
            let p: UpdateSoulParams = params(value)?;
            state
                .souls
                .update(&p.agent_id, &p.soul)
                .map_err(|err| DispatchError::Internal(err.to_string()))?;
            ok(p.soul)
        }
    });
}

#[derive(Deserialize)]
struct SearchMemoriesParams {
    query: String,
    top_k: Option<usize>,
}

fn register_search_memories(dispatcher: &mut Dispatcher, state: GatewayState) {
    dispatcher.register("search_memories", move |value| {
        let state = state.clone();
        async move {
            let p: SearchMemoriesParams = params(value)?;
            let hits = state.memory.retrieve(&p.query, p.top_k.unwrap_or(5)).await;
            ok(hits)
        }
    });
}
