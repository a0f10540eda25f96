//! Tracked per-player statistics
//!
//! These are the copies that feed the persisted leaderboards. They are only
//! incremented while the round has stat tracking enabled; the live counters on
//! the player record are separate.

use serde::{Deserialize, Serialize};

use crate::game::constants::kills::MAX_MULTIS;

/// Number of multi-kill histogram buckets (indices 0..=MAX_MULTIS)
pub const MULTI_BUCKETS: usize = MAX_MULTIS + 1;

/// Statistics accumulated for leaderboards
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerStats {
    pub kills: u32,
    pub deaths: u32,
    /// Points only ever grow; negative score deltas are not recorded here
    pub points: u32,
    pub best_spree: u32,
    pub best_multi: u32,
    /// Bucket `i` counts multi-kills of size `i + 2`, the last bucket collects the rest
    pub multis: [u32; MULTI_BUCKETS],
    pub flag_captures: u32,
    /// Fastest flag capture in milliseconds
    pub fastest_capture_ms: Option<u32>,
}

impl PlayerStats {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Histogram bucket for a multi-kill counter, clamped to the last bucket.
    /// Counters below two are not multi-kills and have no bucket.
    pub fn multi_bucket(multi: u32) -> Option<usize> {
        if multi < 2 {
            return None;
        }
        Some(((multi - 2) as usize).min(MAX_MULTIS))
    }

    pub fn record_multi(&mut self, multi: u32) {
        self.best_multi = self.best_multi.max(multi);
        if let Some(bucket) = Self::multi_bucket(multi) {
            self.multis[bucket] += 1;
        }
    }

    pub fn record_capture(&mut self, time_ms: u32) {
        self.flag_captures += 1;
        self.fastest_capture_ms = Some(match self.fastest_capture_ms {
            Some(best) => best.min(time_ms),
            None => time_ms,
        });
    }

    /// Fold a round's worth of stats into a persisted total
    pub fn merge(&mut self, round: &PlayerStats) {
        self.kills += round.kills;
        self.deaths += round.deaths;
        self.points += round.points;
        self.best_spree = self.best_spree.max(round.best_spree);
        self.best_multi = self.best_multi.max(round.best_multi);
        for (total, add) in self.multis.iter_mut().zip(round.multis.iter()) {
            *total += add;
        }
        self.flag_captures += round.flag_captures;
        if let Some(time) = round.fastest_capture_ms {
            self.fastest_capture_ms = Some(self.fastest_capture_ms.map_or(time, |t| t.min(time)));
        }
    }

    /// Kills per death, deaths clamped to one
    pub fn kd_ratio(&self) -> f32 {
        self.kills as f32 / self.deaths.max(1) as f32
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
