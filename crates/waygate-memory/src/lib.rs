// SPDX-License-Identifier: Apache-2.0
//! Keyword-weighted memory store: an append-only per-line record log with
//! an in-memory mirror, bounded at a fixed capacity with FIFO eviction.
mod record;
mod retrieval;
mod store;

pub use record::Memory;
pub use store::{MemoryError, MemoryStore};
