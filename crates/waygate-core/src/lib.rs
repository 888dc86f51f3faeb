// SPDX-License-Identifier: Apache-2.0
//! The agent loop and the persona ("soul") it runs against.
mod agent;
mod soul;

pub use agent::{AgentLoop, AgentLoopError};
pub use soul::{system_prompt, Soul, SoulError, SoulStore};
