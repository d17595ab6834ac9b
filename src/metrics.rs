use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

#[derive(Clone)]
pub struct Metrics {
    reconnects_total: Arc<AtomicU64>,
    reconnect_success_total: Arc<AtomicU64>,
    reconnect_failure_total: Arc<AtomicU64>,
    read_timeouts_total: Arc<AtomicU64>,
    heartbeats_sent_total: Arc<AtomicU64>,
    frames_received_total: Arc<AtomicU64>,
    events_total: Arc<AtomicU64>,
    parse_failures_total: Arc<AtomicU64>,
    duplicates_total: Arc<AtomicU64>,
    dispatched_total: Arc<AtomicU64>,
    unhandled_total: Arc<AtomicU64>,
    handler_errors_total: Arc<AtomicU64>,
    sent_total: Arc<AtomicU64>,
    channel_drops_total: Arc<AtomicU64>,
    errors_total: Arc<AtomicU64>,
    ready: Arc<AtomicBool>,
    feed: String,
    channel: String,
    reconnect_hist_success: Arc<Histogram>,
    interarrival_hist: Arc<Histogram>,
}

impl Metrics {
    pub fn new(
        feed: String,
        channel: String,
        reconnect_buckets: Vec<f64>,
        interarrival_buckets: Vec<f64>,
    ) -> Self {
        Metrics {
            reconnects_total: Arc::new(AtomicU64::new(0)),
            reconnect_success_total: Arc::new(AtomicU64::new(0)),
            reconnect_failure_total: Arc::new(AtomicU64::new(0)),
            read_timeouts_total: Arc::new(AtomicU64::new(0)),
            heartbeats_sent_total: Arc::new(AtomicU64::new(0)),
            frames_received_total: Arc::new(AtomicU64::new(0)),
            events_total: Arc::new(AtomicU64::new(0)),
            parse_failures_total: Arc::new(AtomicU64::new(0)),
            duplicates_total: Arc::new(AtomicU64::new(0)),
            dispatched_total: Arc::new(AtomicU64::new(0)),
            unhandled_total: Arc::new(AtomicU64::new(0)),
            handler_errors_total: Arc::new(AtomicU64::new(0)),
            sent_total: Arc::new(AtomicU64::new(0)),
            channel_drops_total: Arc::new(AtomicU64::new(0)),
            errors_total: Arc::new(AtomicU64::new(0)),
            ready: Arc::new(AtomicBool::new(false)),
            feed,
            channel,
            reconnect_hist_success: Arc::new(Histogram::new(reconnect_buckets)),
            interarrival_hist: Arc::new(Histogram::new(interarrival_buckets)),
        }
    }

    pub fn inc_reconnect(&self) {
        self.reconnects_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_reconnect_success(&self) {
        self.reconnect_success_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_reconnect_failure(&self) {
        self.reconnect_failure_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_timeout(&self) {
        self.read_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_heartbeat(&self) {
        self.heartbeats_sent_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_frame(&self) {
        self.frames_received_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_event(&self) {
        self.events_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_parse_failure(&self) {
        self.parse_failures_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_duplicate(&self) {
        self.duplicates_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_dispatched(&self) {
        self.dispatched_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_unhandled(&self) {
        self.unhandled_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_handler_error(&self) {
        self.handler_errors_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_sent(&self) {
        self.sent_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_drop(&self) {
        self.channel_drops_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn inc_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }
    pub fn set_ready(&self, v: bool) {
        self.ready.store(v, Ordering::Relaxed);
    }
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    pub fn render_prometheus(&self) -> String {
        let mut s = Vec::with_capacity(512);
        let name = env!("CARGO_PKG_NAME");
        let version = env!("CARGO_PKG_VERSION");
        let _ = writeln!(&mut s, "# HELP relay_build_info Build information");
        let _ = writeln!(&mut s, "# TYPE relay_build_info gauge");
        let _ = writeln!(
            &mut s,
            "relay_build_info{{name=\"{}\",version=\"{}\"}} 1",
            name, version
        );

        let labels = format!("feed=\"{}\",channel=\"{}\"", self.feed, self.channel);

        let counters: [(&str, &str, &Arc<AtomicU64>); 15] = [
            (
                "relay_reconnects_total",
                "Reconnect attempts",
                &self.reconnects_total,
            ),
            (
                "relay_reconnect_success_total",
                "Successful reconnect cycles",
                &self.reconnect_success_total,
            ),
            (
                "relay_reconnect_failure_total",
                "Failed reconnect attempts before retry",
                &self.reconnect_failure_total,
            ),
            (
                "relay_read_timeouts_total",
                "Read timeouts on the socket",
                &self.read_timeouts_total,
            ),
            (
                "relay_heartbeats_sent_total",
                "Heartbeat pings sent",
                &self.heartbeats_sent_total,
            ),
            (
                "relay_frames_received_total",
                "Raw frames received from the feed",
                &self.frames_received_total,
            ),
            (
                "relay_events_total",
                "Frames normalized into event records",
                &self.events_total,
            ),
            (
                "relay_parse_failures_total",
                "Frames discarded as unparseable",
                &self.parse_failures_total,
            ),
            (
                "relay_duplicates_total",
                "Events suppressed by the dedup window",
                &self.duplicates_total,
            ),
            (
                "relay_dispatched_total",
                "Events handled successfully",
                &self.dispatched_total,
            ),
            (
                "relay_unhandled_total",
                "Events dropped for lack of a handler",
                &self.unhandled_total,
            ),
            (
                "relay_handler_errors_total",
                "Handler failures contained at the dispatcher",
                &self.handler_errors_total,
            ),
            (
                "relay_sent_total",
                "Outbound messages delivered to the sink",
                &self.sent_total,
            ),
            (
                "relay_channel_drops_total",
                "Frames dropped due to backpressure",
                &self.channel_drops_total,
            ),
            ("relay_errors_total", "Errors encountered", &self.errors_total),
        ];

        for (metric, help, counter) in counters {
            let _ = writeln!(&mut s, "# HELP {} {}", metric, help);
            let _ = writeln!(&mut s, "# TYPE {} counter", metric);
            let _ = writeln!(
                &mut s,
                "{}{{{}}} {}",
                metric,
                labels,
                counter.load(Ordering::Relaxed)
            );
        }

        self.reconnect_hist_success
            .render("relay_reconnect_duration_seconds", &labels, &mut s);
        self.interarrival_hist
            .render("relay_frame_interarrival_seconds", &labels, &mut s);

        String::from_utf8(s).unwrap_or_default()
    }

    pub fn observe_reconnect_success_secs(&self, secs: f64) {
        self.reconnect_hist_success.observe(secs);
    }
    pub fn observe_interarrival_secs(&self, secs: f64) {
        self.interarrival_hist.observe(secs);
    }
}

pub fn spawn_http_server(
    metrics: Metrics,
    addr: String,
    notify_shutdown: Arc<Notify>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        match TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!("metrics_http_listen" = %addr, "Listening for /metrics and /health");
                loop {
                    tokio::select! {
                        _ = notify_shutdown.notified() => {
                            info!("metrics_http_shutdown" = true, "Shutting down metrics server");
                            break;
                        }
                        accept_res = listener.accept() => {
                            match accept_res {
                                Ok((socket, _peer)) => {
                                    let m = metrics.clone();
                                    tokio::spawn(async move {
                                        if let Err(e) = handle_conn(socket, m).await {
                                            debug!(error = %e, "metrics_http_conn_error");
                                        }
                                    });
                                }
                                Err(e) => {
                                    warn!(error = %e, "metrics_http_accept_error");
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                error!(error = %e, "Failed to bind metrics HTTP server");
            }
        }
    })
}

async fn handle_conn(
    mut socket: TcpStream,
    metrics: Metrics,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut buf = [0u8; 1024];
    let n = socket.read(&mut buf).await?;
    let req = std::str::from_utf8(&buf[..n]).unwrap_or("");
    let (status, content_type, body) =
        if req.starts_with("GET /metrics ") || req.starts_with("GET /metrics\r") {
            (
                "200 OK",
                "text/plain; version=0.0.4",
                metrics.render_prometheus(),
            )
        } else if req.starts_with("GET /health ")
            || req.starts_with("GET /health\r")
            || req.starts_with("GET / ")
        {
            ("200 OK", "text/plain", "OK".to_string())
        } else if req.starts_with("GET /ready ") || req.starts_with("GET /ready\r") {
            if metrics.is_ready() {
                ("200 OK", "text/plain", "READY".to_string())
            } else {
                (
                    "503 Service Unavailable",
                    "text/plain",
                    "NOT READY".to_string(),
                )
            }
        } else {
            ("404 Not Found", "text/plain", "Not Found".to_string())
        };
    let resp = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        content_type,
        body.len(),
        body
    );
    socket.write_all(resp.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

pub fn spawn_stats_logger(
    metrics: Metrics,
    notify_shutdown: Arc<Notify>,
    period: std::time::Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = Snapshot::from(&metrics);
        let mut tick = interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = notify_shutdown.notified() => break,
                _ = tick.tick() => {
                    let now = Snapshot::from(&metrics);
                    let secs = period.as_secs_f64().max(0.001);
                    info!(target: "relay_stats",
                        frames = now.frames - last.frames,
                        events = now.events - last.events,
                        duplicates = now.duplicates - last.duplicates,
                        dispatched = now.dispatched - last.dispatched,
                        sent = now.sent - last.sent,
                        drops = now.drops - last.drops,
                        errors = now.errors - last.errors,
                        frames_rate = (now.frames - last.frames) as f64 / secs,
                        "stats"
                    );
                    last = now;
                }
            }
        }
    })
}

#[derive(Clone, Copy, Default)]
struct Snapshot {
    frames: u64,
    events: u64,
    duplicates: u64,
    dispatched: u64,
    sent: u64,
    drops: u64,
    errors: u64,
}

impl From<&Metrics> for Snapshot {
    fn from(m: &Metrics) -> Self {
        use std::sync::atomic::Ordering::Relaxed;
        Snapshot {
            frames: m.frames_received_total.load(Relaxed),
            events: m.events_total.load(Relaxed),
            duplicates: m.duplicates_total.load(Relaxed),
            dispatched: m.dispatched_total.load(Relaxed),
            sent: m.sent_total.load(Relaxed),
            drops: m.channel_drops_total.load(Relaxed),
            errors: m.errors_total.load(Relaxed),
        }
    }
}

struct Histogram {
    buckets: Vec<f64>,
    counts: Vec<AtomicU64>,
    sum_us: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    fn new(mut buckets: Vec<f64>) -> Self {
        buckets.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let counts = (0..buckets.len()).map(|_| AtomicU64::new(0)).collect();
        Self {
            buckets,
            counts,
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    fn observe(&self, value_secs: f64) {
        let us = if value_secs.is_sign_positive() {
            (value_secs * 1_000_000.0) as u64
        } else {
            0
        };
        self.sum_us.fetch_add(us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);
        for (i, b) in self.buckets.iter().enumerate() {
            if value_secs <= *b {
                self.counts[i].fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    fn render(&self, name: &str, labels: &str, out: &mut Vec<u8>) {
        let _ = writeln!(out, "# HELP {} Histogram of {}", name, name);
        let _ = writeln!(out, "# TYPE {} histogram", name);
        let mut cumulative = 0u64;
        for (i, b) in self.buckets.iter().enumerate() {
            let c = self.counts[i].load(Ordering::Relaxed);
            cumulative += c;
            let _ = writeln!(
                out,
                "{}_bucket{{{},le=\"{}\"}} {}",
                name, labels, b, cumulative
            );
        }
        let total = self.count.load(Ordering::Relaxed);
        let _ = writeln!(out, "{}_bucket{{{},le=\"+Inf\"}} {}", name, labels, total);
        let sum_secs = (self.sum_us.load(Ordering::Relaxed) as f64) / 1_000_000.0;
        let _ = writeln!(out, "{}_sum{{{}}} {}", name, labels, sum_secs);
        let _ = writeln!(out, "{}_count{{{}}} {}", name, labels, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_counters_with_labels() {
        let metrics = Metrics::new(
            "feed.example".to_string(),
            "event".to_string(),
            vec![1.0, 5.0],
            vec![0.1, 1.0],
        );
        metrics.inc_frame();
        metrics.inc_frame();
        metrics.inc_duplicate();

        let rendered = metrics.render_prometheus();
        assert!(rendered.contains(
            "relay_frames_received_total{feed=\"feed.example\",channel=\"event\"} 2"
        ));
        assert!(rendered
            .contains("relay_duplicates_total{feed=\"feed.example\",channel=\"event\"} 1"));
        assert!(rendered.contains("relay_build_info"));
    }

    #[test]
    fn ready_flag_round_trips() {
        let metrics = Metrics::new("f".into(), "c".into(), vec![1.0], vec![1.0]);
        assert!(!metrics.is_ready());
        metrics.set_ready(true);
        assert!(metrics.is_ready());
    }
}
