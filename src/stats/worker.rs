//! Background execution of stats queries
//!
//! Jobs travel over a bounded crossbeam channel to a small pool of threads.
//! Each job carries the [`QueryCompletion`] of the slot that asked for it, so
//! the only thing shared with the tick loop is the slot's completion flag.

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, trace, warn};

use crate::stats::player_stats::PlayerStats;
use crate::stats::query::{QueryCompletion, QueryLane, QueryPayload, QueryResult};
use crate::stats::store::{RankColumn, StatsStore, StoreError};

/// Query a player can ask the stats backend
#[derive(Debug, Clone, PartialEq)]
pub enum StatsRequest {
    /// Full stats of a player, answered through the round callbacks
    ShowStats { requested: String },
    /// Rank of a player in one column
    ShowRank { requested: String, column: RankColumn },
    /// Profile load for a player's own name on connect
    LoadPlayerData { name: String },
    /// Leaderboard lines, private to the requester or public to everyone
    Top {
        column: RankColumn,
        limit: usize,
        public: bool,
    },
    /// Fire-and-forget merge of a round's stats
    Save { name: String, stats: PlayerStats },
}

impl StatsRequest {
    /// Lane the request occupies on the requester, `None` for fire-and-forget
    pub fn lane(&self) -> Option<QueryLane> {
        match self {
            StatsRequest::ShowRank { column, .. } | StatsRequest::Top { column, .. } => {
                Some(column.lane())
            }
            StatsRequest::ShowStats { .. } | StatsRequest::LoadPlayerData { .. } => {
                Some(QueryLane::Stats)
            }
            StatsRequest::Save { .. } => None,
        }
    }
}

/// Worker errors
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Stats queue is full")]
    QueueFull,
    #[error("Stats worker has stopped")]
    Stopped,
    #[error("Failed to spawn stats worker: {0}")]
    Spawn(#[from] std::io::Error),
}

struct Job {
    request: StatsRequest,
    completion: Option<QueryCompletion>,
}

/// Pool of threads executing [`StatsRequest`]s against a [`StatsStore`]
pub struct StatsWorker {
    sender: Option<Sender<Job>>,
    threads: Vec<JoinHandle<()>>,
}

impl StatsWorker {
    pub fn spawn(
        store: Arc<dyn StatsStore>,
        threads: usize,
        capacity: usize,
    ) -> Result<Self, WorkerError> {
        let (sender, receiver) = bounded::<Job>(capacity.max(1));
        let mut handles = Vec::with_capacity(threads.max(1));

        for index in 0..threads.max(1) {
            let receiver = receiver.clone();
            let store = Arc::clone(&store);
            let handle = std::thread::Builder::new()
                .name(format!("stats-worker-{}", index))
                .spawn(move || run_worker(store, receiver))?;
            handles.push(handle);
        }

        debug!(threads = handles.len(), capacity, "Stats worker started");

        Ok(Self {
            sender: Some(sender),
            threads: handles,
        })
    }

    /// Queue a request without blocking.
    ///
    /// On refusal the completion is dropped, which fails its slot so the
    /// requester's lane frees up on the next tick.
    pub fn submit(
        &self,
        request: StatsRequest,
        completion: Option<QueryCompletion>,
    ) -> Result<(), WorkerError> {
        let sender = self.sender.as_ref().ok_or(WorkerError::Stopped)?;
        sender
            .try_send(Job {
                request,
                completion,
            })
            .map_err(|e| match e {
                TrySendError::Full(_) => WorkerError::QueueFull,
                TrySendError::Disconnected(_) => WorkerError::Stopped,
            })
    }

    /// Jobs waiting for a worker thread
    pub fn queued(&self) -> usize {
        self.sender.as_ref().map_or(0, |s| s.len())
    }

    /// Finish queued jobs and join the threads
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.sender = None;
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                warn!("Stats worker thread panicked");
            }
        }
    }
}

impl Drop for StatsWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker(store: Arc<dyn StatsStore>, receiver: Receiver<Job>) {
    while let Ok(job) = receiver.recv() {
        if job.completion.as_ref().is_some_and(|c| c.is_abandoned()) {
            trace!(request = ?job.request, "Skipping query for departed player");
            continue;
        }

        let outcome = execute(store.as_ref(), &job.request);
        match (outcome, job.completion) {
            (Ok(Some(payload)), Some(completion)) => {
                completion.complete(QueryResult::Success(payload));
            }
            (Ok(_), _) => {}
            (Err(e), completion) => {
                warn!(request = ?job.request, error = %e, "Stats query failed");
                if let Some(completion) = completion {
                    completion.complete(QueryResult::Failure {
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

/// Run one request against the store. `Save` produces no payload.
pub fn execute(
    store: &dyn StatsStore,
    request: &StatsRequest,
) -> Result<Option<QueryPayload>, StoreError> {
    let payload = match request {
        StatsRequest::ShowStats { requested } => match store.load(requested)? {
            Some(stats) => QueryPayload::Stats {
                stats,
                requested: requested.clone(),
            },
            None => QueryPayload::Direct(vec![format!("'{}' has no stats yet", requested)]),
        },
        StatsRequest::ShowRank { requested, column } => match store.rank(requested, *column)? {
            Some((rank, ranked_score)) => QueryPayload::Rank {
                rank,
                ranked_score,
                column: *column,
                requested: requested.clone(),
            },
            None => QueryPayload::Direct(vec![format!(
                "'{}' is not ranked in {}",
                requested,
                column.display_name()
            )]),
        },
        StatsRequest::LoadPlayerData { name } => QueryPayload::PlayerData {
            stats: store.load(name)?.unwrap_or_default(),
            name: name.clone(),
        },
        StatsRequest::Top {
            column,
            limit,
            public,
        } => {
            let entries = store.top(*column, *limit)?;
            let mut lines = Vec::with_capacity(entries.len() + 1);
            lines.push(format!("Top {} {}", limit, column.display_name()));
            for (idx, (name, score)) in entries.iter().enumerate() {
                lines.push(format!("{}. {}: {}", idx + 1, name, format_score(*column, *score)));
            }
            if *public {
                QueryPayload::All(lines)
            } else {
                QueryPayload::Direct(lines)
            }
        }
        StatsRequest::Save { name, stats } => {
            store.save(name, stats)?;
            return Ok(None);
        }
    };
    Ok(Some(payload))
}

fn format_score(column: RankColumn, score: i64) -> String {
    match column {
        RankColumn::FastestCapture => format!("{:.2}s", score as f64 / 1000.0),
        _ => score.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::query::QuerySlot;
    use crate::stats::store::MemoryStatsStore;
    use std::time::{Duration, Instant};

    fn wait_for(slot: &mut QuerySlot) -> QueryResult {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(result) = slot.drain() {
                return result;
            }
            assert!(Instant::now() < deadline, "query did not complete");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    fn seeded_store() -> Arc<MemoryStatsStore> {
        let store = Arc::new(MemoryStatsStore::new());
        store
            .save(
                "alice",
                &PlayerStats {
                    points: 12,
                    kills: 9,
                    ..Default::default()
                },
            )
            .unwrap();
        store
            .save(
                "bob",
                &PlayerStats {
                    points: 20,
                    ..Default::default()
                },
            )
            .unwrap();
        store
    }

    #[test]
    fn test_request_lanes() {
        let fastcap = StatsRequest::ShowRank {
            requested: "a".into(),
            column: RankColumn::FastestCapture,
        };
        assert_eq!(fastcap.lane(), Some(QueryLane::Fastcap));
        let save = StatsRequest::Save {
            name: "a".into(),
            stats: PlayerStats::default(),
        };
        assert_eq!(save.lane(), None);
    }

    #[test]
    fn test_execute_show_stats() {
        let store = seeded_store();
        let payload = execute(
            store.as_ref(),
            &StatsRequest::ShowStats {
                requested: "alice".into(),
            },
        )
        .unwrap()
        .unwrap();
        match payload {
            QueryPayload::Stats { stats, requested } => {
                assert_eq!(requested, "alice");
                assert_eq!(stats.kills, 9);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_execute_unknown_rank_is_direct_line() {
        let store = seeded_store();
        let payload = execute(
            store.as_ref(),
            &StatsRequest::ShowRank {
                requested: "zed".into(),
                column: RankColumn::Points,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            payload,
            QueryPayload::Direct(vec!["'zed' is not ranked in points".to_string()])
        );
    }

    #[test]
    fn test_execute_top_public() {
        let store = seeded_store();
        let payload = execute(
            store.as_ref(),
            &StatsRequest::Top {
                column: RankColumn::Points,
                limit: 5,
                public: true,
            },
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            payload,
            QueryPayload::All(vec![
                "Top 5 points".to_string(),
                "1. bob: 20".to_string(),
                "2. alice: 12".to_string(),
            ])
        );
    }

    #[test]
    fn test_execute_save_has_no_payload() {
        let store = MemoryStatsStore::new();
        let result = execute(
            &store,
            &StatsRequest::Save {
                name: "carol".into(),
                stats: PlayerStats {
                    kills: 1,
                    ..Default::default()
                },
            },
        )
        .unwrap();
        assert!(result.is_none());
        assert_eq!(store.load("carol").unwrap().unwrap().kills, 1);
    }

    #[test]
    fn test_worker_completes_slot() {
        let worker = StatsWorker::spawn(seeded_store(), 1, 8).unwrap();
        let mut slot = QuerySlot::new(QueryLane::Stats);

        let completion = slot.arm().unwrap();
        worker
            .submit(
                StatsRequest::ShowRank {
                    requested: "alice".into(),
                    column: RankColumn::Points,
                },
                Some(completion),
            )
            .unwrap();

        let result = wait_for(&mut slot);
        assert_eq!(
            result,
            QueryResult::Success(QueryPayload::Rank {
                rank: 2,
                ranked_score: 12,
                column: RankColumn::Points,
                requested: "alice".into(),
            })
        );
        worker.shutdown();
    }

    #[test]
    fn test_worker_failure_marks_unsuccessful() {
        let store = seeded_store();
        store.set_unavailable(true);
        let worker = StatsWorker::spawn(store, 2, 8).unwrap();
        let mut slot = QuerySlot::new(QueryLane::Stats);

        worker
            .submit(
                StatsRequest::ShowStats {
                    requested: "alice".into(),
                },
                Some(slot.arm().unwrap()),
            )
            .unwrap();

        assert!(!wait_for(&mut slot).is_success());
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let store = Arc::new(MemoryStatsStore::new());
        let worker = StatsWorker::spawn(store.clone(), 1, 64).unwrap();
        for i in 0..10 {
            worker
                .submit(
                    StatsRequest::Save {
                        name: format!("p{}", i),
                        stats: PlayerStats::default(),
                    },
                    None,
                )
                .unwrap();
        }
        worker.shutdown();
        assert_eq!(store.len(), 10);
    }

    /// Store whose saves wait for a release signal
    struct GatedStore {
        release: Receiver<()>,
    }

    impl StatsStore for GatedStore {
        fn load(&self, _name: &str) -> Result<Option<PlayerStats>, StoreError> {
            Ok(None)
        }

        fn save(&self, _name: &str, _round: &PlayerStats) -> Result<(), StoreError> {
            self.release.recv().map_err(|_| StoreError::Unavailable)
        }

        fn rank(&self, _name: &str, _column: RankColumn) -> Result<Option<(u32, i64)>, StoreError> {
            Ok(None)
        }

        fn top(&self, _column: RankColumn, _limit: usize) -> Result<Vec<(String, i64)>, StoreError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_queued_counts_waiting_jobs() {
        let (release, gate) = bounded(8);
        let worker = StatsWorker::spawn(Arc::new(GatedStore { release: gate }), 1, 8).unwrap();
        assert_eq!(worker.queued(), 0);

        for i in 0..3 {
            worker
                .submit(
                    StatsRequest::Save {
                        name: format!("p{}", i),
                        stats: PlayerStats::default(),
                    },
                    None,
                )
                .unwrap();
        }

        // the single thread holds one job at the gate, the rest wait
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.queued() != 2 {
            assert!(Instant::now() < deadline, "worker never picked up a job");
            std::thread::sleep(Duration::from_millis(1));
        }

        for _ in 0..3 {
            release.send(()).unwrap();
        }
        worker.shutdown();
    }

    #[test]
    fn test_format_fastcap_score() {
        assert_eq!(format_score(RankColumn::FastestCapture, 12340), "12.34s");
        assert_eq!(format_score(RankColumn::Kills, 7), "7");
    }
}
