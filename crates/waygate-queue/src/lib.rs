// SPDX-License-Identifier: Apache-2.0
//! The delivery queue: a persistent, at-least-once outbound queue with a
//! status FSM, exponential back-off, and a dead-letter tier.

mod backoff;
mod queue;
mod status;

pub use backoff::backoff_for_attempt;
pub use queue::{DeliveryMessage, DeliveryQueue, EnqueueOptions, QueueError, QueueStats};
pub use status::DeliveryStatus;
