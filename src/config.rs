use std::{env, time::Duration};

use crate::error::{RelayError, Result};

pub struct Config {
    /// Long-lived feed credential used to request short-lived session tokens.
    pub feed_token: String,
    pub auth_url: String,
    pub socket_url: String,
    pub feed_channel: String,

    // Notification thresholds; each is "equal to or greater than".
    pub large_donation: i64,
    pub large_bits: i64,
    pub large_sub_gift: i64,
    pub long_sub_months: i64,
    pub large_raid: i64,

    // Target channels per category; 0 disables that category.
    pub event_log_channel: u64,
    pub media_share_channel: u64,
    pub subs_donations_channel: u64,

    pub dedup_ttl: Duration,
    pub cache_sweep_interval: Duration,

    pub backoff_base: Duration,
    pub backoff_increment: Duration,
    pub min_reconnect_attempts: u32,
    pub connect_timeout_floor: Duration,
    pub read_timeout: Duration,
    pub heartbeat_interval: Option<Duration>,

    pub channel_capacity: usize,
    pub shutdown_grace: Duration,

    pub sink: String,
    pub webhook_routes: Vec<(u64, String)>,

    pub emote_file: Option<String>,
    pub placeholder_thumbnail_url: String,

    pub metrics_addr: String,
    pub stats_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let feed_token = env::var("RELAY_FEED_TOKEN")
            .map_err(|_| RelayError::config("RELAY_FEED_TOKEN is not set"))?;

        let auth_url = env::var("RELAY_AUTH_URL")
            .unwrap_or_else(|_| "https://streamlabs.com/api/v5/io/info".to_string());
        let socket_url = env::var("RELAY_SOCKET_URL")
            .unwrap_or_else(|_| "wss://aws-io.streamlabs.com".to_string());
        let feed_channel = env::var("RELAY_FEED_CHANNEL").unwrap_or_else(|_| "event".to_string());

        let backoff_base = env::var("BACKOFF_BASE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(5));

        let backoff_increment = env::var("BACKOFF_INCREMENT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(2));

        let min_reconnect_attempts = env::var("RECONNECT_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(4);

        let connect_timeout_floor = env::var("CONNECT_TIMEOUT_FLOOR_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or_else(|| Duration::from_millis(5000));

        let read_timeout = env::var("READ_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let heartbeat_interval = env::var("HEARTBEAT_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|secs| {
                if secs == 0 {
                    None
                } else {
                    Some(Duration::from_secs(secs))
                }
            })
            .unwrap_or_else(|| Some(Duration::from_secs(30)));

        let dedup_ttl = env::var("DEDUP_TTL_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|m| Duration::from_secs(m * 60))
            .unwrap_or_else(|| Duration::from_secs(5 * 60));

        let cache_sweep_interval = env::var("CACHE_SWEEP_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let channel_capacity = env::var("CHANNEL_CAP")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(1024);

        let shutdown_grace = env::var("SHUTDOWN_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(5));

        let metrics_addr =
            env::var("METRICS_ADDR").unwrap_or_else(|_| "127.0.0.1:9898".to_string());

        let stats_interval = env::var("STATS_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or_else(|| Duration::from_secs(60));

        let sink = env::var("SINK").unwrap_or_else(|_| "stdout".to_string());

        Ok(Config {
            feed_token,
            auth_url,
            socket_url,
            feed_channel,
            large_donation: parse_threshold("LARGE_DONATION", 20),
            large_bits: parse_threshold("LARGE_BITS", 2000),
            large_sub_gift: parse_threshold("LARGE_SUB_GIFT", 10),
            long_sub_months: parse_threshold("LONG_SUB_MONTHS", 12),
            large_raid: parse_threshold("LARGE_RAID", 40),
            event_log_channel: parse_channel("EVENT_LOG_CHANNEL"),
            media_share_channel: parse_channel("MEDIA_SHARE_CHANNEL"),
            subs_donations_channel: parse_channel("SUBS_DONATIONS_CHANNEL"),
            dedup_ttl,
            cache_sweep_interval,
            backoff_base,
            backoff_increment,
            min_reconnect_attempts,
            connect_timeout_floor,
            read_timeout,
            heartbeat_interval,
            channel_capacity,
            shutdown_grace,
            sink,
            webhook_routes: parse_routes(env::var("WEBHOOK_ROUTES").ok().as_deref()),
            emote_file: env::var("EMOTE_FILE").ok().filter(|s| !s.is_empty()),
            placeholder_thumbnail_url: env::var("PLACEHOLDER_THUMBNAIL_URL")
                .unwrap_or_else(|_| "https://i.ytimg.com/vi/default/hqdefault.jpg".to_string()),
            metrics_addr,
            stats_interval,
        })
    }
}

fn parse_threshold(var: &str, default: i64) -> i64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or(default)
}

fn parse_channel(var: &str) -> u64 {
    env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Parse `WEBHOOK_ROUTES` of the form `"<channel>=<url>,<channel>=<url>"`.
fn parse_routes(src: Option<&str>) -> Vec<(u64, String)> {
    let mut out = Vec::new();
    let Some(s) = src else { return out };
    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let mut kv = part.splitn(2, '=');
        let channel = kv.next().unwrap_or("").trim().parse::<u64>();
        let url = kv.next().unwrap_or("").trim();
        if let (Ok(channel), false) = (channel, url.is_empty()) {
            out.push((channel, url.to_string()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_parse_pairs_and_skip_garbage() {
        let routes = parse_routes(Some(
            "123=https://example.com/a, 456=https://example.com/b, nope, 789=",
        ));
        assert_eq!(
            routes,
            vec![
                (123, "https://example.com/a".to_string()),
                (456, "https://example.com/b".to_string()),
            ]
        );
    }

    #[test]
    fn routes_empty_when_unset() {
        assert!(parse_routes(None).is_empty());
    }
}
