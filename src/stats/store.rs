//! Persisted stats storage
//!
//! The storage engine is a collaborator behind [`StatsStore`]. Workers call it
//! off the tick thread, so implementations may block. [`MemoryStatsStore`] is
//! the in-process implementation used by the binary and the tests.

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::stats::player_stats::PlayerStats;
use crate::stats::query::QueryLane;

/// Leaderboard column a rank or top list is computed over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RankColumn {
    Points,
    Kills,
    Spree,
    Multi,
    FastestCapture,
}

impl RankColumn {
    /// Name shown to players
    pub fn display_name(&self) -> &'static str {
        match self {
            RankColumn::Points => "points",
            RankColumn::Kills => "kills",
            RankColumn::Spree => "spree",
            RankColumn::Multi => "multi",
            RankColumn::FastestCapture => "fastcap",
        }
    }

    /// Value of this column, `None` when the player has no entry for it
    pub fn score_of(&self, stats: &PlayerStats) -> Option<i64> {
        match self {
            RankColumn::Points => Some(stats.points as i64),
            RankColumn::Kills => Some(stats.kills as i64),
            RankColumn::Spree => Some(stats.best_spree as i64),
            RankColumn::Multi => Some(stats.best_multi as i64),
            RankColumn::FastestCapture => stats.fastest_capture_ms.map(i64::from),
        }
    }

    /// Lower values rank higher (capture times)
    pub fn ascending(&self) -> bool {
        matches!(self, RankColumn::FastestCapture)
    }

    /// Lane a lookup of this column occupies on the requesting player
    pub fn lane(&self) -> QueryLane {
        match self {
            RankColumn::FastestCapture => QueryLane::Fastcap,
            _ => QueryLane::Stats,
        }
    }
}

/// Storage errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Stats storage unavailable")]
    Unavailable,
    #[error("Invalid player name: {0:?}")]
    InvalidName(String),
}

/// Persisted stats backend
pub trait StatsStore: Send + Sync {
    /// Stats stored under `name`
    fn load(&self, name: &str) -> Result<Option<PlayerStats>, StoreError>;

    /// Merge a round's stats into the stored total for `name`
    fn save(&self, name: &str, round: &PlayerStats) -> Result<(), StoreError>;

    /// 1-based rank and score of `name` in `column`
    fn rank(&self, name: &str, column: RankColumn) -> Result<Option<(u32, i64)>, StoreError>;

    /// Best `limit` entries of `column`, best first
    fn top(&self, column: RankColumn, limit: usize) -> Result<Vec<(String, i64)>, StoreError>;
}

/// In-memory stats backend
#[derive(Debug, Default)]
pub struct MemoryStatsStore {
    players: RwLock<HashMap<String, PlayerStats>>,
    unavailable: AtomicBool,
}

impl MemoryStatsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate an outage: every call fails with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::Relaxed);
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }

    fn check(&self, name: &str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable);
        }
        if name.trim().is_empty() {
            return Err(StoreError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    fn sorted(&self, column: RankColumn) -> Vec<(String, i64)> {
        let players = self.players.read();
        let mut entries: Vec<(String, i64)> = players
            .iter()
            .filter_map(|(name, stats)| column.score_of(stats).map(|s| (name.clone(), s)))
            .collect();
        entries.sort_by(|a, b| {
            let by_score = if column.ascending() {
                a.1.cmp(&b.1)
            } else {
                b.1.cmp(&a.1)
            };
            by_score.then_with(|| a.0.cmp(&b.0))
        });
        entries
    }
}

impl StatsStore for MemoryStatsStore {
    fn load(&self, name: &str) -> Result<Option<PlayerStats>, StoreError> {
        self.check(name)?;
        Ok(self.players.read().get(name).cloned())
    }

    fn save(&self, name: &str, round: &PlayerStats) -> Result<(), StoreError> {
        self.check(name)?;
        self.players
            .write()
            .entry(name.to_string())
            .or_default()
            .merge(round);
        Ok(())
    }

    fn rank(&self, name: &str, column: RankColumn) -> Result<Option<(u32, i64)>, StoreError> {
        self.check(name)?;
        let sorted = self.sorted(column);
        Ok(sorted
            .iter()
            .position(|(n, _)| n == name)
            .map(|idx| (idx as u32 + 1, sorted[idx].1)))
    }

    fn top(&self, column: RankColumn, limit: usize) -> Result<Vec<(String, i64)>, StoreError> {
        if self.unavailable.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable);
        }
        let mut entries = self.sorted(column);
        entries.truncate(limit);
        Ok(entries)
    }
}
