//! Prometheus-compatible metrics endpoint
//!
//! Exposes round server metrics in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, debug};

/// Samples kept for tick time percentiles
const TICK_HISTORY: usize = 1000;

/// Metrics registry for the round server
#[derive(Debug)]
pub struct Metrics {
    // Player counts
    pub players_connected: AtomicU64,
    pub players_alive: AtomicU64,
    pub players_spectating: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Stats queries
    pub queries_submitted: AtomicU64,
    pub queries_rejected: AtomicU64,
    pub queries_routed: AtomicU64,
    pub queries_failed: AtomicU64,
    pub stats_queue_depth: AtomicU64,

    // Gameplay
    pub kills: AtomicU64,
    pub spawns: AtomicU64,
    pub team_changes: AtomicU64,

    // Network
    pub messages_sent: AtomicU64,
    pub bytes_sent: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            players_connected: AtomicU64::new(0),
            players_alive: AtomicU64::new(0),
            players_spectating: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            queries_submitted: AtomicU64::new(0),
            queries_rejected: AtomicU64::new(0),
            queries_routed: AtomicU64::new(0),
            queries_failed: AtomicU64::new(0),
            stats_queue_depth: AtomicU64::new(0),
            kills: AtomicU64::new(0),
            spawns: AtomicU64::new(0),
            team_changes: AtomicU64::new(0),
            messages_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(TICK_HISTORY)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > TICK_HISTORY {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("pvp_round_players_connected", "Connected players", "gauge",
            self.players_connected.load(Ordering::Relaxed));
        metric!("pvp_round_players_alive", "Players with a live body", "gauge",
            self.players_alive.load(Ordering::Relaxed));
        metric!("pvp_round_players_spectating", "Players in the spectator team", "gauge",
            self.players_spectating.load(Ordering::Relaxed));

        metric!("pvp_round_tick_time_microseconds", "Current tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("pvp_round_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("pvp_round_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("pvp_round_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("pvp_round_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        metric!("pvp_round_queries_submitted_total", "Stats queries handed to workers", "counter",
            self.queries_submitted.load(Ordering::Relaxed));
        metric!("pvp_round_queries_rejected_total", "Stats queries refused (lane busy or queue full)", "counter",
            self.queries_rejected.load(Ordering::Relaxed));
        metric!("pvp_round_queries_routed_total", "Completed queries routed to chat or callbacks", "counter",
            self.queries_routed.load(Ordering::Relaxed));
        metric!("pvp_round_queries_failed_total", "Completed queries that reported failure", "counter",
            self.queries_failed.load(Ordering::Relaxed));
        metric!("pvp_round_stats_queue_depth", "Stats jobs waiting for a worker thread", "gauge",
            self.stats_queue_depth.load(Ordering::Relaxed));

        metric!("pvp_round_kills_total", "Credited kills", "counter",
            self.kills.load(Ordering::Relaxed));
        metric!("pvp_round_spawns_total", "Bodies granted", "counter",
            self.spawns.load(Ordering::Relaxed));
        metric!("pvp_round_team_changes_total", "Team reassignments", "counter",
            self.team_changes.load(Ordering::Relaxed));

        metric!("pvp_round_messages_sent_total", "Total messages sent", "counter",
            self.messages_sent.load(Ordering::Relaxed));
        metric!("pvp_round_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("pvp_round_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON format metrics for direct API access
    pub fn to_json(&self) -> String {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        serde_json::json!({
            "players": {
                "connected": load(&self.players_connected),
                "alive": load(&self.players_alive),
                "spectating": load(&self.players_spectating),
            },
            "performance": {
                "tick_time_us": load(&self.tick_time_us),
                "tick_time_p95_us": load(&self.tick_time_p95_us),
                "tick_time_p99_us": load(&self.tick_time_p99_us),
                "tick_time_max_us": load(&self.tick_time_max_us),
                "tick_count": load(&self.tick_count),
            },
            "queries": {
                "submitted": load(&self.queries_submitted),
                "rejected": load(&self.queries_rejected),
                "routed": load(&self.queries_routed),
                "failed": load(&self.queries_failed),
                "queue_depth": load(&self.stats_queue_depth),
            },
            "round": {
                "kills": load(&self.kills),
                "spawns": load(&self.spawns),
                "team_changes": load(&self.team_changes),
            },
            "network": {
                "messages_sent": load(&self.messages_sent),
                "bytes_sent": load(&self.bytes_sent),
            },
            "uptime_seconds": self.uptime_seconds(),
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

fn respond(metrics: &Metrics, request: &str) -> String {
    let ok = |content_type: &str, body: String| {
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            content_type,
            body.len(),
            body
        )
    };

    if request.starts_with("GET /metrics/json") {
        ok("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ok("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") {
        ok("text/plain", "OK".to_string())
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.players_connected.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) > 0);
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.players_connected.store(12, Ordering::Relaxed);
        metrics.queries_failed.store(3, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("pvp_round_players_connected 12"));
        assert!(output.contains("pvp_round_queries_failed_total 3"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.players_alive.store(7, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["players"]["alive"], 7);
        assert!(value["queries"].is_object());
    }

    #[tokio::test]
    async fn test_server_answers_health() {
        use tokio::net::TcpStream;

        let port = 39417;
        tokio::spawn(start_metrics_server(Arc::new(Metrics::new()), port));

        let mut stream = None;
        for _ in 0..100 {
            if let Ok(s) = TcpStream::connect(("127.0.0.1", port)).await {
                stream = Some(s);
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let mut stream = stream.expect("metrics server did not start");

        tokio_test::assert_ok!(stream.write_all(b"GET /health HTTP/1.1\r\n\r\n").await);
        let mut response = String::new();
        tokio_test::assert_ok!(stream.read_to_string(&mut response).await);
        assert!(response.starts_with("HTTP/1.1 200 OK"));
        assert!(response.ends_with("OK"));
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(respond(&metrics, "GET /metrics/json HTTP/1.1").contains("application/json"));
        assert!(respond(&metrics, "GET /metrics HTTP/1.1").contains("pvp_round_tick_count"));
        assert!(respond(&metrics, "GET /health HTTP/1.1").ends_with("OK"));
        assert!(respond(&metrics, "GET /nope HTTP/1.1").starts_with("HTTP/1.1 404"));
    }
}
