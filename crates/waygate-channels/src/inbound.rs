// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};

/// `{channel, sender, text, media_urls?, thread_id?, timestamp}`.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub channel: String,
    pub sender: String,
    pub text: String,
    pub media_urls: Vec<String>,
    pub thread_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(channel: &str, sender: &str, text: &str) -> Self {
        Self {
            channel: channel.to_string(),
            sender: sender.to_string(),
            text: text.to_string(),
            media_urls: Vec::new(),
            thread_id: None,
            timestamp: Utc::now(),
        }
    }
}
