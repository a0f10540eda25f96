//! Single-owner result slots for background stats queries
//!
//! A [`QuerySlot`] lives on the player record. Arming it hands out a
//! [`QueryCompletion`] that travels with the job to a worker thread. The worker
//! fills the shared cell exactly once; the tick loop polls the completion flag
//! and takes the result. Nothing here ever blocks the tick.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::stats::player_stats::PlayerStats;
use crate::stats::store::RankColumn;

/// Independent query lanes a player may have in flight at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryLane {
    /// Stats, rank and profile lookups
    Stats,
    /// Fastest-capture lookups
    Fastcap,
}

impl fmt::Display for QueryLane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryLane::Stats => write!(f, "stats"),
            QueryLane::Fastcap => write!(f, "fastcap"),
        }
    }
}

/// Result kinds and the data each carries
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPayload {
    /// Private chat lines for the requester, terminated by the first empty line
    Direct(Vec<String>),
    /// Public chat lines, terminated by the first empty line
    All(Vec<String>),
    /// HUD broadcast; routing is intentionally disabled
    Broadcast(String),
    /// Full stats of `requested`
    Stats {
        stats: PlayerStats,
        requested: String,
    },
    /// Rank of `requested` in `column`
    Rank {
        rank: u32,
        ranked_score: i64,
        column: RankColumn,
        requested: String,
    },
    /// Stats loaded for the requester's own name
    PlayerData { stats: PlayerStats, name: String },
}

impl QueryPayload {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryPayload::Direct(_) => "direct",
            QueryPayload::All(_) => "all",
            QueryPayload::Broadcast(_) => "broadcast",
            QueryPayload::Stats { .. } => "stats",
            QueryPayload::Rank { .. } => "rank",
            QueryPayload::PlayerData { .. } => "player_data",
        }
    }
}

/// Completed query as seen by the tick loop
#[derive(Debug, Clone, PartialEq)]
pub enum QueryResult {
    Success(QueryPayload),
    Failure { reason: String },
}

impl QueryResult {
    pub fn is_success(&self) -> bool {
        matches!(self, QueryResult::Success(_))
    }
}

/// Query slot errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum QueryError {
    #[error("A {0} query is already pending for this player")]
    AlreadyPending(QueryLane),
}

#[derive(Default)]
struct QueryCell {
    completed: AtomicBool,
    result: Mutex<Option<QueryResult>>,
}

impl QueryCell {
    fn fill(&self, result: QueryResult) {
        *self.result.lock() = Some(result);
        self.completed.store(true, Ordering::Release);
    }
}

/// Per-lane slot owned by a player record
pub struct QuerySlot {
    lane: QueryLane,
    pending: Option<Arc<QueryCell>>,
}

impl QuerySlot {
    pub fn new(lane: QueryLane) -> Self {
        Self {
            lane,
            pending: None,
        }
    }

    pub fn lane(&self) -> QueryLane {
        self.lane
    }

    /// A query was armed and its result has not been taken yet
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// The worker has finished; the next [`drain`](Self::drain) returns the result
    pub fn is_complete(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|cell| cell.completed.load(Ordering::Acquire))
    }

    /// Arm the slot for a new query. Fails fast while a previous result is unconsumed.
    pub fn arm(&mut self) -> Result<QueryCompletion, QueryError> {
        if self.pending.is_some() {
            return Err(QueryError::AlreadyPending(self.lane));
        }
        let cell = Arc::new(QueryCell::default());
        self.pending = Some(Arc::clone(&cell));
        Ok(QueryCompletion {
            lane: self.lane,
            cell: Some(cell),
        })
    }

    /// Take the result if the worker has completed, freeing the slot
    pub fn drain(&mut self) -> Option<QueryResult> {
        if !self.is_complete() {
            return None;
        }
        self.pending.take().and_then(|cell| cell.result.lock().take())
    }

    /// Release the slot whatever its state. Returns a result that was ready
    /// but never routed.
    pub fn discard(&mut self) -> Option<QueryResult> {
        let cell = self.pending.take()?;
        if cell.completed.load(Ordering::Acquire) {
            cell.result.lock().take()
        } else {
            None
        }
    }
}

impl fmt::Debug for QuerySlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuerySlot")
            .field("lane", &self.lane)
            .field("pending", &self.is_pending())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Worker-side handle that fills a slot exactly once.
///
/// Dropping it unfilled (worker gone, queue refused the job) completes the
/// slot with a failure so the lane frees up on the next drain.
pub struct QueryCompletion {
    lane: QueryLane,
    cell: Option<Arc<QueryCell>>,
}

impl QueryCompletion {
    pub fn lane(&self) -> QueryLane {
        self.lane
    }

    /// The requesting slot was discarded (player left); the result has no reader
    pub fn is_abandoned(&self) -> bool {
        self.cell
            .as_ref()
            .map_or(true, |cell| Arc::strong_count(cell) == 1)
    }

    pub fn complete(mut self, result: QueryResult) {
        if let Some(cell) = self.cell.take() {
            cell.fill(result);
        }
    }
}

impl Drop for QueryCompletion {
    fn drop(&mut self) {
        if let Some(cell) = self.cell.take() {
            cell.fill(QueryResult::Failure {
                reason: "query dropped before completion".to_string(),
            });
        }
    }
}

impl fmt::Debug for QueryCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryCompletion")
            .field("lane", &self.lane)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn direct(lines: &[&str]) -> QueryResult {
        QueryResult::Success(QueryPayload::Direct(
            lines.iter().map(|s| s.to_string()).collect(),
        ))
    }

    #[test]
    fn test_slot_starts_empty() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        assert!(!slot.is_pending());
        assert!(!slot.is_complete());
        assert!(slot.drain().is_none());
    }

    #[test]
    fn test_arm_twice_rejected() {
        let mut slot = QuerySlot::new(QueryLane::Fastcap);
        let _completion = slot.arm().unwrap();

        let second = slot.arm();
        assert_eq!(
            second.err(),
            Some(QueryError::AlreadyPending(QueryLane::Fastcap))
        );
    }

    #[test]
    fn test_drain_before_completion() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        let completion = slot.arm().unwrap();

        assert!(slot.drain().is_none());
        assert!(slot.is_pending());

        completion.complete(direct(&["hi"]));
        assert!(slot.is_complete());
        assert_eq!(slot.drain(), Some(direct(&["hi"])));
    }

    #[test]
    fn test_drain_frees_slot_once() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        slot.arm().unwrap().complete(direct(&["a"]));

        assert!(slot.drain().is_some());
        assert!(slot.drain().is_none());
        assert!(!slot.is_pending());
        assert!(slot.arm().is_ok());
    }

    #[test]
    fn test_dropped_completion_fails_slot() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        drop(slot.arm().unwrap());

        let result = slot.drain().unwrap();
        assert!(!result.is_success());
        assert!(!slot.is_pending());
    }

    #[test]
    fn test_discard_pending_slot() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        let completion = slot.arm().unwrap();

        assert!(slot.discard().is_none());
        assert!(!slot.is_pending());
        assert!(completion.is_abandoned());

        // Completing an abandoned query is harmless
        completion.complete(direct(&["late"]));
    }

    #[test]
    fn test_discard_completed_slot_returns_result() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        slot.arm().unwrap().complete(direct(&["ready"]));

        assert_eq!(slot.discard(), Some(direct(&["ready"])));
    }

    #[test]
    fn test_completion_from_worker_thread() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        let completion = slot.arm().unwrap();

        let handle = std::thread::spawn(move || {
            completion.complete(direct(&["from worker"]));
        });
        handle.join().unwrap();

        assert_eq!(slot.drain(), Some(direct(&["from worker"])));
    }

    #[test]
    fn test_never_completed_stays_pending() {
        let mut slot = QuerySlot::new(QueryLane::Stats);
        let _held = slot.arm().unwrap();

        for _ in 0..100 {
            assert!(slot.drain().is_none());
        }
        assert!(slot.is_pending());
    }
}
