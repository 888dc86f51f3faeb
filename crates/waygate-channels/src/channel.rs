// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use crate::chunk::chunk_text;
use crate::inbound::InboundMessage;

/// A named input/output transport. `receive` is non-blocking: it returns
/// `None` when nothing is pending rather than awaiting the next message.
#[async_trait]
pub trait Channel: Send + Sync {
    fn id(&self) -> &str;
    fn max_text_length(&self) -> usize;
    async fn receive(&self) -> anyhow::Result<Option<InboundMessage>>;
    async fn send(&self, recipient: &str, text: &str, thread_id: Option<&str>) -> anyhow::Result<()>;

    /// Default chunking: paragraph-greedy packing, hard-split fallback.
    /// Channels with transport-specific limits may override this.
    fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.max_text_length())
    }
}
