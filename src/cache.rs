use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

struct Entry<V> {
    value: V,
    /// Absolute expiration deadline; `None` never expires.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired_at(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// Key/value store with per-entry TTL or infinite lifetime.
///
/// Expired entries behave as absent on every access even before they are
/// physically purged; a periodic sweeper reclaims the memory. The store is a
/// cheap cloneable handle, safe for concurrent use from multiple tasks.
pub struct ExpiringCache<V> {
    inner: Arc<Mutex<HashMap<String, Entry<V>>>>,
}

impl<V> Clone for ExpiringCache<V> {
    fn clone(&self) -> Self {
        ExpiringCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V> Default for ExpiringCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ExpiringCache<V> {
    pub fn new() -> Self {
        ExpiringCache {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert a new entry. Returns false without touching the store if the
    /// key is already present and live; a caller that wants to overwrite
    /// must say so by calling [`set`](Self::set).
    pub fn add(&self, key: &str, value: V, ttl: Option<Duration>) -> bool {
        self.add_at(key, value, ttl, Instant::now())
    }

    /// Insert or replace an entry.
    #[allow(dead_code)]
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        self.set_at(key, value, ttl, Instant::now());
    }

    /// Administrative eviction; expiry handles everything else.
    #[allow(dead_code)]
    pub fn remove(&self, key: &str) -> bool {
        let removed = self.inner.lock().unwrap().remove(key).is_some();
        if removed {
            debug!(target: "relay_cache", key = %key, "removed");
        } else {
            debug!(target: "relay_cache", key = %key, "remove_missing");
        }
        removed
    }

    #[allow(dead_code)]
    pub fn contains(&self, key: &str) -> bool {
        self.contains_at(key, Instant::now())
    }

    /// All live keys, for diagnostics.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        let map = self.inner.lock().unwrap();
        map.iter()
            .filter(|(_, e)| !e.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        let now = Instant::now();
        let map = self.inner.lock().unwrap();
        map.values().filter(|e| !e.is_expired_at(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry whose deadline has passed. Returns the purge count.
    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Instant::now())
    }

    pub(crate) fn add_at(&self, key: &str, value: V, ttl: Option<Duration>, now: Instant) -> bool {
        let mut map = self.inner.lock().unwrap();
        match map.get(key) {
            Some(existing) if !existing.is_expired_at(now) => false,
            _ => {
                map.insert(
                    key.to_string(),
                    Entry {
                        value,
                        expires_at: ttl.map(|t| now + t),
                    },
                );
                debug!(target: "relay_cache", key = %key, ttl = ?ttl, "added");
                true
            }
        }
    }

    pub(crate) fn set_at(&self, key: &str, value: V, ttl: Option<Duration>, now: Instant) {
        self.inner.lock().unwrap().insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|t| now + t),
            },
        );
    }

    pub(crate) fn contains_at(&self, key: &str, now: Instant) -> bool {
        let map = self.inner.lock().unwrap();
        map.get(key).map(|e| !e.is_expired_at(now)).unwrap_or(false)
    }

    pub(crate) fn purge_expired_at(&self, now: Instant) -> usize {
        let mut map = self.inner.lock().unwrap();
        let before = map.len();
        map.retain(|_, e| !e.is_expired_at(now));
        before - map.len()
    }
}

impl<V: Clone> ExpiringCache<V> {
    #[allow(dead_code)]
    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    pub(crate) fn get_at(&self, key: &str, now: Instant) -> Option<V> {
        let map = self.inner.lock().unwrap();
        map.get(key)
            .filter(|e| !e.is_expired_at(now))
            .map(|e| e.value.clone())
    }
}

/// Periodically purge expired entries until shutdown is signalled.
pub fn spawn_sweeper<V: Send + 'static>(
    cache: ExpiringCache<V>,
    period: Duration,
    notify_shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = notify_shutdown.notified() => break,
                _ = tick.tick() => {
                    if cache.is_empty() {
                        continue;
                    }
                    let purged = cache.purge_expired();
                    if purged > 0 {
                        debug!(target: "relay_cache", purged, remaining = cache.len(), "sweep");
                    }
                }
            }
        }
    })
}
