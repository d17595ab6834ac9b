use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use crate::error::Result;

/// Opaque reference to a destination channel; 0 means "category disabled"
/// and is filtered before the sink is reached.
pub type ChannelId = u64;

pub type MessageId = u64;

/// Colors for rich messages, by content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorTag {
    /// Shared media (red).
    Media,
    /// Feed alerts (teal).
    #[allow(dead_code)]
    Alert,
}

impl ColorTag {
    pub fn rgb(&self) -> (u8, u8, u8) {
        match self {
            ColorTag::Media => (255, 0, 0),
            ColorTag::Alert => (49, 195, 162),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RichMessage {
    pub title: Option<String>,
    pub url: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
    pub image_url: Option<String>,
    /// (name, value, inline)
    pub fields: Vec<(String, String, bool)>,
    pub footer: Option<String>,
    pub color: ColorTag,
}

/// Boundary of the external chat-platform client. The core only ever calls
/// these two operations with already-formatted content.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send_plain(&self, channel: ChannelId, text: &str) -> Result<MessageId>;
    async fn send_rich(&self, channel: ChannelId, message: &RichMessage) -> Result<MessageId>;
}

/// Writes outbound messages to the log instead of a chat platform. Used for
/// local operation and dry runs.
#[derive(Default)]
pub struct StdoutSink {
    next_id: AtomicU64,
}

#[async_trait]
impl NotificationSink for StdoutSink {
    async fn send_plain(&self, channel: ChannelId, text: &str) -> Result<MessageId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(target: "relay_sink", channel, message_id = id, text = %text, "plain");
        Ok(id)
    }

    async fn send_rich(&self, channel: ChannelId, message: &RichMessage) -> Result<MessageId> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "relay_sink",
            channel,
            message_id = id,
            title = message.title.as_deref().unwrap_or(""),
            url = message.url.as_deref().unwrap_or(""),
            fields = message.fields.len(),
            "rich"
        );
        Ok(id)
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub enum SentMessage {
        Plain { channel: ChannelId, text: String },
        Rich { channel: ChannelId, message: RichMessage },
    }

    /// Records every send for assertions; optionally fails every call.
    #[derive(Default)]
    pub struct RecordingSink {
        pub sent: Mutex<Vec<SentMessage>>,
        pub fail: bool,
    }

    impl RecordingSink {
        pub fn failing() -> Self {
            RecordingSink {
                sent: Mutex::new(Vec::new()),
                fail: true,
            }
        }

        pub fn sent(&self) -> Vec<SentMessage> {
            self.sent.lock().unwrap().clone()
        }

        pub fn plain_texts(&self) -> Vec<String> {
            self.sent()
                .into_iter()
                .filter_map(|m| match m {
                    SentMessage::Plain { text, .. } => Some(text),
                    _ => None,
                })
                .collect()
        }
    }

    #[async_trait]
    impl NotificationSink for RecordingSink {
        async fn send_plain(&self, channel: ChannelId, text: &str) -> Result<MessageId> {
            if self.fail {
                return Err(crate::error::RelayError::sink("recording sink set to fail"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentMessage::Plain {
                channel,
                text: text.to_string(),
            });
            Ok(sent.len() as MessageId)
        }

        async fn send_rich(&self, channel: ChannelId, message: &RichMessage) -> Result<MessageId> {
            if self.fail {
                return Err(crate::error::RelayError::sink("recording sink set to fail"));
            }
            let mut sent = self.sent.lock().unwrap();
            sent.push(SentMessage::Rich {
                channel,
                message: message.clone(),
            });
            Ok(sent.len() as MessageId)
        }
    }
}
