// SPDX-License-Identifier: Apache-2.0
//! Channel contract (`Channel` trait) plus the one concrete transport this
//! crate ships: a file-backed inbox/outbox under `.channels/`.
mod channel;
mod chunk;
mod file;
mod inbound;

pub use channel::Channel;
pub use chunk::chunk_text;
pub use file::{FileChannel, FileChannelError};
pub use inbound::InboundMessage;
