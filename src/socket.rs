use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use reqwest::header::REFERER;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{RelayError, Result};
use crate::extract::find_by_key;
use crate::metrics::Metrics;

/// Session token and advisory connection parameters from the auth endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub token: String,
    pub connect_timeout: Duration,
    pub reconnect_attempts: u32,
}

/// Parse the auth endpoint's response: a relative `path` embedding the
/// session token as a query parameter, plus advisory `timeout` (ms) and
/// `reconnect_attempts`. The advertised timeout is clamped to the configured
/// floor; the attempt hint never lowers the configured minimum.
pub fn parse_token_response(
    body: &str,
    timeout_floor: Duration,
    min_attempts: u32,
) -> Result<TokenInfo> {
    let doc: Value = serde_json::from_str(body)?;

    let path = doc
        .get("path")
        .and_then(|v| v.as_str())
        .ok_or_else(|| RelayError::token("response has no path"))?;
    // The path is relative; resolve against a throwaway base to get at the
    // query string.
    let resolved = Url::parse("https://feed.invalid/")
        .expect("static base url")
        .join(path)
        .map_err(|e| RelayError::token(format!("bad path: {}", e)))?;
    let token = resolved
        .query_pairs()
        .find(|(k, _)| k == "token")
        .map(|(_, v)| v.into_owned())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RelayError::token("path carries no token parameter"))?;

    let advertised_ms = find_by_key::<i64>(&doc, "timeout").unwrap_or(0).max(0) as u64;
    let connect_timeout = Duration::from_millis(advertised_ms).max(timeout_floor);

    let hint = find_by_key::<i64>(&doc, "reconnect_attempts").unwrap_or(0).max(0) as u32;
    let reconnect_attempts = hint.max(min_attempts);

    Ok(TokenInfo {
        token,
        connect_timeout,
        reconnect_attempts,
    })
}

/// Linear backoff: base delay plus a fixed increment per prior failure.
/// Reset (delay_for(0)) after any successful connection.
pub struct BackoffPolicy {
    pub base: Duration,
    pub increment: Duration,
}

impl BackoffPolicy {
    pub fn delay_for(&self, prior_failures: u32) -> Duration {
        self.base + self.increment * prior_failures
    }
}

/// How an established session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Deliberate shutdown; no reconnection.
    Shutdown,
    /// The transport dropped; the reconnect loop takes over.
    RemoteClosed,
}

/// Terminal result of the connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Clean,
    /// Every reconnection attempt failed; the process must report a fatal
    /// condition to its caller.
    ReconnectExhausted,
}

/// One full session: token fetch, connect, subscribe, pump frames until the
/// transport closes. Abstracted so the reconnect loop is testable without a
/// live socket.
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn run(&self) -> Result<SessionOutcome>;

    /// Attempt ceiling advertised by the server during the last token fetch;
    /// 0 when none was seen yet.
    fn advertised_attempts(&self) -> u32;
}

/// Drive the transport until shutdown or exhaustion.
///
/// The first session is special: a connect failure before any session was
/// established surfaces as an error to the caller and does not enter the
/// reconnect loop. After a drop of an established session, up to
/// `max(min_attempts, server hint)` attempts are made with linearly growing
/// backoff; any success resets both the counter and the delay. Exactly one
/// reconnect loop runs at a time by construction: this function is the sole
/// owner of the transport and the attempt state.
pub async fn run_with_reconnect<T: FeedTransport>(
    transport: &T,
    policy: &BackoffPolicy,
    min_attempts: u32,
    notify_shutdown: &Notify,
) -> Result<RunOutcome> {
    match transport.run().await {
        Ok(SessionOutcome::Shutdown) => return Ok(RunOutcome::Clean),
        Ok(SessionOutcome::RemoteClosed) => {}
        Err(err) => return Err(err),
    }

    'session: loop {
        let attempts = min_attempts.max(transport.advertised_attempts()).max(1);
        for attempt in 1..=attempts {
            info!(attempt, attempts, "reconnecting");
            match transport.run().await {
                Ok(SessionOutcome::Shutdown) => return Ok(RunOutcome::Clean),
                // Success: delay and attempt counter start over on next drop.
                Ok(SessionOutcome::RemoteClosed) => continue 'session,
                Err(err) => {
                    warn!(attempt, error = %err, "reconnect attempt failed");
                    if attempt == attempts {
                        break;
                    }
                    let delay = policy.delay_for(attempt - 1);
                    if wait_or_shutdown(delay, notify_shutdown).await {
                        return Ok(RunOutcome::Clean);
                    }
                }
            }
        }
        error!(attempts, "all reconnection attempts failed");
        return Ok(RunOutcome::ReconnectExhausted);
    }
}

async fn wait_or_shutdown(duration: Duration, notify_shutdown: &Notify) -> bool {
    tokio::select! {
        _ = sleep(duration) => false,
        _ = notify_shutdown.notified() => true,
    }
}

#[derive(Serialize)]
struct SubscribeMessage<'a> {
    action: &'a str,
    channel: &'a str,
}

/// Live websocket transport: owns the persistent connection and hands every
/// raw text frame to the processing channel.
pub struct SocketFeed {
    auth_url: String,
    socket_url: String,
    credential: String,
    feed_channel: String,
    timeout_floor: Duration,
    min_attempts: u32,
    read_timeout: Duration,
    heartbeat_interval: Option<Duration>,
    bp_warn_interval: Duration,
    http: reqwest::Client,
    frames_tx: Sender<String>,
    closing: Arc<AtomicBool>,
    notify_shutdown: Arc<Notify>,
    metrics: Metrics,
    advertised: AtomicU32,
}

impl SocketFeed {
    pub fn new(
        cfg: &crate::config::Config,
        frames_tx: Sender<String>,
        closing: Arc<AtomicBool>,
        notify_shutdown: Arc<Notify>,
        metrics: Metrics,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| RelayError::token(format!("building http client: {}", e)))?;
        Ok(SocketFeed {
            auth_url: cfg.auth_url.clone(),
            socket_url: cfg.socket_url.clone(),
            credential: cfg.feed_token.clone(),
            feed_channel: cfg.feed_channel.clone(),
            timeout_floor: cfg.connect_timeout_floor,
            min_attempts: cfg.min_reconnect_attempts,
            read_timeout: cfg.read_timeout,
            heartbeat_interval: cfg.heartbeat_interval,
            bp_warn_interval: Duration::from_secs(5),
            http,
            frames_tx,
            closing,
            notify_shutdown,
            metrics,
            advertised: AtomicU32::new(0),
        })
    }

    async fn fetch_token(&self) -> Result<TokenInfo> {
        info!("fetching session token");
        let auth = Url::parse_with_params(&self.auth_url, &[("token", self.credential.as_str())])
            .map_err(|e| RelayError::token(format!("bad auth url: {}", e)))?;
        let referer = format!(
            "{}://{}",
            auth.scheme(),
            auth.host_str().unwrap_or_default()
        );

        let response = self
            .http
            .get(auth)
            .header(REFERER, referer)
            .send()
            .await
            .map_err(|e| RelayError::token(format!("request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RelayError::token(format!(
                "auth endpoint returned {}",
                status.as_u16()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| RelayError::token(format!("reading response: {}", e)))?;

        let info = parse_token_response(&body, self.timeout_floor, self.min_attempts)?;
        self.advertised
            .store(info.reconnect_attempts, Ordering::Relaxed);
        Ok(info)
    }
}

#[async_trait]
impl FeedTransport for SocketFeed {
    async fn run(&self) -> Result<SessionOutcome> {
        if self.closing.load(Ordering::Relaxed) {
            return Ok(SessionOutcome::Shutdown);
        }

        self.metrics.inc_reconnect();
        self.metrics.set_ready(false);
        let attempt_start = Instant::now();

        let token = match self.fetch_token().await {
            Ok(info) => info,
            Err(err) => {
                self.metrics.inc_error();
                self.metrics.inc_reconnect_failure();
                return Err(err);
            }
        };

        let ws_url = format!(
            "{}/?token={}",
            self.socket_url.trim_end_matches('/'),
            token.token
        );
        info!("connecting to feed socket");
        let socket = match timeout(token.connect_timeout, connect_async(&ws_url)).await {
            Ok(Ok((socket, response))) => {
                info!("connected with status: {}", response.status());
                socket
            }
            Ok(Err(err)) => {
                self.metrics.inc_error();
                self.metrics.inc_reconnect_failure();
                return Err(RelayError::connect(err.to_string()));
            }
            Err(_) => {
                self.metrics.inc_error();
                self.metrics.inc_reconnect_failure();
                return Err(RelayError::connect(format!(
                    "timed out after {:?}",
                    token.connect_timeout
                )));
            }
        };

        let (mut writer, mut reader) = socket.split();

        // Subscribe to the single logical channel the core consumes.
        let subscribe = SubscribeMessage {
            action: "subscribe",
            channel: &self.feed_channel,
        };
        let subscribe_json = serde_json::to_string(&subscribe)?;
        debug!("subscribe message: {}", &subscribe_json);
        if let Err(err) = writer.send(Message::Text(subscribe_json.into())).await {
            self.metrics.inc_error();
            self.metrics.inc_reconnect_failure();
            return Err(RelayError::connect(format!("subscribe failed: {}", err)));
        }

        self.metrics.inc_reconnect_success();
        self.metrics
            .observe_reconnect_success_secs(attempt_start.elapsed().as_secs_f64());
        self.metrics.set_ready(true);

        // Pump frames until the transport closes. The frame callback is this
        // loop itself; nothing is re-registered on reconnect.
        let heartbeat_enabled = self.heartbeat_interval.is_some();
        let mut hb = interval(self.heartbeat_interval.unwrap_or(Duration::from_secs(3600)));
        hb.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_rx: Option<Instant> = None;
        let mut last_warn = Instant::now() - self.bp_warn_interval;
        let mut dropped_since_warn: u64 = 0;

        let outcome = loop {
            tokio::select! {
                res = timeout(self.read_timeout, reader.next()) => {
                    match res {
                        Ok(Some(Ok(Message::Text(text)))) => {
                            self.metrics.inc_frame();
                            let now = Instant::now();
                            if let Some(prev) = last_rx {
                                self.metrics.observe_interarrival_secs(now.duration_since(prev).as_secs_f64());
                            }
                            last_rx = Some(now);
                            match self.frames_tx.try_send(text) {
                                Ok(()) => {}
                                Err(tokio::sync::mpsc::error::TrySendError::Full(_)) => {
                                    self.metrics.inc_drop();
                                    dropped_since_warn = dropped_since_warn.saturating_add(1);
                                    if last_warn.elapsed() >= self.bp_warn_interval {
                                        warn!(dropped = dropped_since_warn, "backpressure, frames dropped");
                                        dropped_since_warn = 0;
                                        last_warn = Instant::now();
                                    }
                                }
                                Err(tokio::sync::mpsc::error::TrySendError::Closed(_)) => {
                                    error!("frame processor gone; closing connection");
                                    self.metrics.inc_error();
                                    break SessionOutcome::Shutdown;
                                }
                            }
                        }
                        Ok(Some(Ok(_))) => {
                            // Pings, pongs and binary frames are not consumed.
                        }
                        Ok(Some(Err(err))) => {
                            warn!("error reading from socket: {}", err);
                            self.metrics.inc_error();
                            break SessionOutcome::RemoteClosed;
                        }
                        Ok(None) => {
                            info!("socket closed by server");
                            break SessionOutcome::RemoteClosed;
                        }
                        Err(_) => {
                            warn!("read timeout after {:?}; reconnecting", self.read_timeout);
                            self.metrics.inc_timeout();
                            break SessionOutcome::RemoteClosed;
                        }
                    }
                }
                _ = self.notify_shutdown.notified() => {
                    info!("socket received shutdown signal");
                    break SessionOutcome::Shutdown;
                }
                _ = hb.tick(), if heartbeat_enabled => {
                    if let Err(err) = writer.send(Message::Ping(Vec::new().into())).await {
                        warn!("heartbeat ping failed: {}", err);
                        self.metrics.inc_error();
                        break SessionOutcome::RemoteClosed;
                    }
                    self.metrics.inc_heartbeat();
                    debug!("sent heartbeat ping");
                }
            }
        };

        self.metrics.set_ready(false);
        if let Err(err) = writer.close().await {
            debug!("error closing socket writer: {}", err);
        }

        // A drop during deliberate teardown must not reconnect.
        if self.closing.load(Ordering::Relaxed) {
            return Ok(SessionOutcome::Shutdown);
        }
        Ok(outcome)
    }

    fn advertised_attempts(&self) -> u32 {
        self.advertised.load(Ordering::Relaxed)
    }
}
