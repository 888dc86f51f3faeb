// SPDX-License-Identifier: Apache-2.0
//! The session store: append-only per-session transcripts plus a rebuildable
//! index, replayed into the in-memory conversation history the agent loop
//! and backend client operate on.

mod replay;
mod store;
mod transcript;

pub use replay::replay_transcript;
pub use store::{SessionError, SessionStore};
pub use transcript::{SessionMetadata, TranscriptEntry};
