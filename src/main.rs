// src/main.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc::{self, Receiver};
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use crate::cache::{spawn_sweeper, ExpiringCache};
use crate::config::Config;
use crate::content::ContentStore;
use crate::dedup::{DeduplicationGuard, OutboundGuard};
use crate::dispatch::EventDispatcher;
use crate::error::Result;
use crate::event::EventRecord;
use crate::metrics::{spawn_http_server, spawn_stats_logger, Metrics};
use crate::sink::{NotificationSink, StdoutSink};
use crate::sink_webhook::WebhookSink;
use crate::socket::{run_with_reconnect, BackoffPolicy, RunOutcome, SocketFeed};

mod cache;
mod config;
mod content;
mod dedup;
mod dispatch;
mod error;
mod event;
mod extract;
mod handlers;
mod metrics;
mod sink;
mod sink_webhook;
mod socket;
mod text;

/// Exit status when every reconnection attempt failed, distinct from
/// ordinary startup failures.
const EXIT_RECONNECT_EXHAUSTED: i32 = 3;

#[tokio::main]
async fn main() {
    // Initialize structured tracing (default info; override with RUST_LOG)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .json()
        .init();

    info!(target: "relay_config", app_version = env!("CARGO_PKG_VERSION"), "starting");

    match run().await {
        Ok(RunOutcome::Clean) => {
            info!("shut down gracefully");
        }
        Ok(RunOutcome::ReconnectExhausted) => {
            error!("all reconnection attempts failed; terminating");
            // Give the log writer a beat before the hard exit.
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::process::exit(EXIT_RECONNECT_EXHAUSTED);
        }
        Err(err) => {
            error!(error = %err, "startup failed");
            tokio::time::sleep(Duration::from_millis(200)).await;
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<RunOutcome> {
    let cfg = Config::from_env()?;

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    info!(target: "relay_config", host = %host, feed_channel = %cfg.feed_channel, sink = %cfg.sink, "configured");

    // Warm-load static content before anything touches the feed.
    let content = Arc::new(ContentStore::load(&cfg)?);

    let metrics = Metrics::new(
        cfg.socket_url.clone(),
        cfg.feed_channel.clone(),
        vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.0, 5.0],
    );

    // Shared shutdown notification plus the deliberate-close marker; the
    // marker is set before the transport closes so the close path does not
    // trigger reconnection.
    let notify_shutdown = Arc::new(Notify::new());
    let closing = Arc::new(AtomicBool::new(false));

    let _http_handle = spawn_http_server(
        metrics.clone(),
        cfg.metrics_addr.clone(),
        notify_shutdown.clone(),
    );
    let _stats_handle =
        spawn_stats_logger(metrics.clone(), notify_shutdown.clone(), cfg.stats_interval);

    // Two dedup layers with their own stores: event identity at pipeline
    // entry, rendered text in front of every send.
    let event_cache: ExpiringCache<()> = ExpiringCache::new();
    let outbound_cache: ExpiringCache<()> = ExpiringCache::new();
    let _event_sweeper = spawn_sweeper(
        event_cache.clone(),
        cfg.cache_sweep_interval,
        notify_shutdown.clone(),
    );
    let _outbound_sweeper = spawn_sweeper(
        outbound_cache.clone(),
        cfg.cache_sweep_interval,
        notify_shutdown.clone(),
    );
    let guard = DeduplicationGuard::new(event_cache.clone(), cfg.dedup_ttl);
    let outbound = OutboundGuard::new(outbound_cache.clone(), cfg.dedup_ttl);

    // Sink selection: stdout | webhook
    let sink: Arc<dyn NotificationSink> = match cfg.sink.to_ascii_lowercase().as_str() {
        "webhook" => Arc::new(WebhookSink::new(cfg.webhook_routes.clone())?),
        _ => Arc::new(StdoutSink::default()),
    };

    let cx = handlers::cx_from_config(&cfg, sink, outbound, metrics.clone());
    let dispatcher = handlers::build_dispatcher(cx);

    let pipeline = Arc::new(Pipeline {
        feed_channel: cfg.feed_channel.clone(),
        content,
        guard,
        dispatcher,
        metrics: metrics.clone(),
    });

    // Bounded channel between the socket reader and the frame processor
    // (applies backpressure).
    let (tx, rx) = mpsc::channel::<String>(cfg.channel_capacity);
    let processor_handle = spawn_frame_processor(
        rx,
        pipeline,
        notify_shutdown.clone(),
        cfg.shutdown_grace,
    );

    let shutdown_handle = handle_shutdown(closing.clone(), notify_shutdown.clone());

    let feed = SocketFeed::new(
        &cfg,
        tx.clone(),
        closing.clone(),
        notify_shutdown.clone(),
        metrics.clone(),
    )?;
    let policy = BackoffPolicy {
        base: cfg.backoff_base,
        increment: cfg.backoff_increment,
    };

    let outcome =
        run_with_reconnect(&feed, &policy, cfg.min_reconnect_attempts, &notify_shutdown).await?;

    // Teardown is idempotent: the marker and notification may already be set.
    closing.store(true, Ordering::Relaxed);
    notify_shutdown.notify_waiters();
    drop(tx);
    let _ = processor_handle.await;
    shutdown_handle.abort();

    debug!(
        target: "relay_cache",
        dedup_keys = ?event_cache.keys(),
        outbound_entries = outbound_cache.len(),
        "caches at teardown"
    );

    Ok(outcome)
}

/// Parsing, dedup, and dispatch state shared by the per-frame tasks.
struct Pipeline {
    feed_channel: String,
    content: Arc<ContentStore>,
    guard: DeduplicationGuard,
    dispatcher: EventDispatcher,
    metrics: Metrics,
}

impl Pipeline {
    /// Run one raw frame through extraction, the dedup gate, and dispatch.
    async fn process(&self, frame: String) {
        let value: Value = match serde_json::from_str(&frame) {
            Ok(v) => v,
            Err(err) => {
                warn!(target: "relay_pipeline", error = %err, "discarding unparseable frame");
                self.metrics.inc_parse_failure();
                return;
            }
        };
        let Some(payload) = self.unwrap_envelope(value) else {
            return;
        };

        let record = EventRecord::from_value(payload, &self.content);
        self.metrics.inc_event();

        if !self.guard.should_process(
            record.kind,
            record.from_user_or_default(),
            record.message_or_default(),
        ) {
            debug!(target: "relay_pipeline", kind = record.kind.as_str(), "duplicate suppressed");
            self.metrics.inc_duplicate();
            return;
        }

        self.dispatcher.dispatch(&record).await;
    }

    /// Frames may arrive wrapped in an envelope naming their logical
    /// channel; only the subscribed channel's `data` payload is consumed.
    /// A frame without an envelope is the raw event itself.
    fn unwrap_envelope(&self, mut value: Value) -> Option<Value> {
        let Some(channel) = value
            .get("channel")
            .and_then(|c| c.as_str())
            .map(str::to_string)
        else {
            return Some(value);
        };
        if channel != self.feed_channel {
            debug!(target: "relay_pipeline", channel = %channel, "frame for unsubscribed channel dropped");
            return None;
        }
        match value.get_mut("data") {
            Some(data) => Some(data.take()),
            None => Some(value),
        }
    }
}

fn spawn_frame_processor(
    mut rx: Receiver<String>,
    pipeline: Arc<Pipeline>,
    notify_shutdown: Arc<Notify>,
    grace: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut inflight = JoinSet::new();
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    match maybe {
                        Some(frame) => {
                            // Each frame runs as its own task so a handler
                            // blocked on an outbound call never stalls
                            // receipt of subsequent frames. Completion order
                            // across frames is not guaranteed.
                            let pipeline = pipeline.clone();
                            inflight.spawn(async move { pipeline.process(frame).await });
                        }
                        None => {
                            info!("frame channel closed; processor exiting");
                            break;
                        }
                    }
                }
                Some(res) = inflight.join_next(), if !inflight.is_empty() => {
                    if let Err(err) = res {
                        error!("frame task panicked: {}", err);
                        pipeline.metrics.inc_error();
                    }
                }
                _ = notify_shutdown.notified() => {
                    info!("frame processor received shutdown signal");
                    break;
                }
            }
        }

        // Let in-flight dispatches finish within the grace period, then
        // abandon the rest (the JoinSet aborts them on drop).
        let drain = async {
            while let Some(res) = inflight.join_next().await {
                if let Err(err) = res {
                    error!("frame task panicked: {}", err);
                }
            }
        };
        if timeout(grace, drain).await.is_err() {
            warn!("grace period elapsed; abandoning in-flight dispatches");
        }
    })
}

fn handle_shutdown(closing: Arc<AtomicBool>, notify_shutdown: Arc<Notify>) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", err);
        }
        // Mark the close as deliberate before waking anyone; repeated
        // signals are no-ops.
        closing.store(true, Ordering::Relaxed);
        notify_shutdown.notify_waiters();
    })
}
