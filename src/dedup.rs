use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::cache::ExpiringCache;
use crate::event::EventKind;

/// Gates pipeline entry on event identity. The key buckets by wall-clock
/// minute, so identical (kind, from, message) tuples within one minute
/// collapse to a single delivery. Deliberately a loose anti-spam signature,
/// not a content hash: two distinct same-text donations from one user inside
/// a minute also collapse.
#[derive(Clone)]
pub struct DeduplicationGuard {
    cache: ExpiringCache<()>,
    ttl: Duration,
}

impl DeduplicationGuard {
    pub fn new(cache: ExpiringCache<()>, ttl: Duration) -> Self {
        DeduplicationGuard { cache, ttl }
    }

    /// True when this is the first occurrence within the window and
    /// processing should proceed; false suppresses. Entries self-expire.
    pub fn should_process(&self, kind: EventKind, from_user: &str, message: &str) -> bool {
        let key = Self::signature(kind, from_user, message, Utc::now());
        self.cache.add(&key, (), Some(self.ttl))
    }

    fn signature(kind: EventKind, from_user: &str, message: &str, at: DateTime<Utc>) -> String {
        format!(
            "{}:{}:{}:{}",
            kind.as_str(),
            from_user.to_lowercase(),
            message.to_lowercase(),
            at.format("%Y%m%d%H%M")
        )
    }
}

/// Gates outbound sends on the exact rendered text. Independent of the
/// event-identity guard: socket retransmission is caught at pipeline entry,
/// cross-posting duplication at the formatting layer.
#[derive(Clone)]
pub struct OutboundGuard {
    cache: ExpiringCache<()>,
    ttl: Duration,
}

const OUTBOUND_PREFIX: &str = "sent";

impl OutboundGuard {
    pub fn new(cache: ExpiringCache<()>, ttl: Duration) -> Self {
        OutboundGuard { cache, ttl }
    }

    /// True when this exact text has not been sent within the window.
    /// Blank text never qualifies.
    pub fn first_send(&self, text: &str) -> bool {
        if text.trim().is_empty() {
            return false;
        }
        let key = format!("{}_{}", OUTBOUND_PREFIX, text.to_lowercase());
        self.cache.add(&key, (), Some(self.ttl))
    }

    pub fn first_send_parts(&self, from: &str, message: &str, amount: &str) -> bool {
        self.first_send(&format!("{}:{}:{}", from, message, amount))
    }

    pub fn first_send_keyed(&self, label: &str, from: &str, message: &str, amount: &str) -> bool {
        self.first_send(&format!("{}:{}:{}:{}", label, from, message, amount))
    }
}
