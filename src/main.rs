use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, trace};
use tracing_subscriber::EnvFilter;

use pvp_round_server::config::ServerConfig;
use pvp_round_server::game::constants::map::TILE_SIZE;
use pvp_round_server::game::player::Team;
use pvp_round_server::game::round::Round;
use pvp_round_server::game::rules::{ArenaMap, StandardRules};
use pvp_round_server::metrics::{self, Metrics};
use pvp_round_server::stats::store::MemoryStatsStore;
use pvp_round_server::stats::worker::StatsWorker;
use pvp_round_server::util::time::SystemClock;
use pvp_round_server::util::vec2::Vec2;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = ServerConfig::load_or_default();

    // Initialize logging, RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("PvP Round Server v{}", env!("CARGO_PKG_VERSION"));

    config.validate()?;
    info!(
        "Configuration loaded: tick_rate={}, max_clients={}, stats_workers={}",
        config.tick_rate, config.max_clients, config.stats_workers
    );

    // Initialize metrics
    let metrics = Arc::new(Metrics::new());
    let metrics_clone = metrics.clone();
    let metrics_port = config.metrics_port;
    tokio::spawn(async move {
        if let Err(e) = metrics::start_metrics_server(metrics_clone, metrics_port).await {
            error!("Metrics server error: {}", e);
        }
    });

    let store = Arc::new(MemoryStatsStore::new());
    let worker = StatsWorker::spawn(store, config.stats_workers, config.stats_queue_capacity)?;

    let map = ArenaMap::new()
        .with_spawn(Team::Red, Vec2::new(4.0 * TILE_SIZE, 4.0 * TILE_SIZE))
        .with_spawn(Team::Blue, Vec2::new(60.0 * TILE_SIZE, 4.0 * TILE_SIZE));

    let tick_rate = config.tick_rate;
    let mut round = Round::new(
        config,
        Box::new(StandardRules::default()),
        Box::new(map),
        worker,
        Arc::new(SystemClock),
        metrics.clone(),
    );

    let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / tick_rate as f64));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    info!("Round running at {} Hz", tick_rate);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let start = Instant::now();
                let events = round.tick();
                let datagrams = round.flush();
                metrics.record_tick_time(start.elapsed());

                if !events.is_empty() || !datagrams.is_empty() {
                    trace!(
                        tick = round.current_tick(),
                        events = events.len(),
                        datagrams = datagrams.len(),
                        "Tick"
                    );
                }
            }
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!("Failed to listen for Ctrl+C: {}", e);
                }
                info!("Shutdown signal received");
                break;
            }
        }
    }

    // Persist what the round tracked before the workers stop
    let saved = round.end_round();
    round.flush();
    info!("Queued {} stats saves", saved);
    round.shutdown();
    info!("Server stopped");

    Ok(())
}
