//! Routing of completed stats queries
//!
//! Called once per tick per player with whatever the player's slots yielded.
//! Chat payloads become outbox messages; structured payloads go to the
//! round's [`RoundCallbacks`] untouched. Failed queries route nothing.

use tracing::trace;

use crate::game::player::PlayerRecord;
use crate::game::spam::SpamGuard;
use crate::net::outbox::Outbox;
use crate::stats::player_stats::PlayerStats;
use crate::stats::query::{QueryPayload, QueryResult};

/// Round-level consumers of structured query results
pub trait RoundCallbacks {
    fn on_show_stats_all(
        &mut self,
        _stats: &PlayerStats,
        _requester: &mut PlayerRecord,
        _requested: &str,
        _outbox: &mut Outbox,
    ) {
    }

    fn on_show_rank(
        &mut self,
        _rank: u32,
        _ranked_score: i64,
        _column: &str,
        _requester: &mut PlayerRecord,
        _requested: &str,
        _outbox: &mut Outbox,
    ) {
    }

    fn on_loaded_name_stats(
        &mut self,
        _stats: &PlayerStats,
        _requester: &mut PlayerRecord,
        _outbox: &mut Outbox,
    ) {
    }
}

/// Callbacks that answer in public chat
#[derive(Debug, Default)]
pub struct ChatCallbacks;

impl RoundCallbacks for ChatCallbacks {
    fn on_show_stats_all(
        &mut self,
        stats: &PlayerStats,
        _requester: &mut PlayerRecord,
        requested: &str,
        outbox: &mut Outbox,
    ) {
        outbox.chat_all(format!("~~~ all time stats of '{}'", requested));
        outbox.chat_all(format!(
            "~ Points: {}, Kills: {}, Deaths: {}, K/D: {:.2}",
            stats.points,
            stats.kills,
            stats.deaths,
            stats.kd_ratio()
        ));
        outbox.chat_all(format!(
            "~ Best spree: {}, Best multi: {}",
            stats.best_spree, stats.best_multi
        ));
    }

    fn on_show_rank(
        &mut self,
        rank: u32,
        ranked_score: i64,
        column: &str,
        _requester: &mut PlayerRecord,
        requested: &str,
        outbox: &mut Outbox,
    ) {
        outbox.chat_all(format!(
            "'{}' is rank {} in {} with {}",
            requested, rank, column, ranked_score
        ));
    }

    fn on_loaded_name_stats(
        &mut self,
        stats: &PlayerStats,
        requester: &mut PlayerRecord,
        outbox: &mut Outbox,
    ) {
        if !stats.is_empty() {
            outbox.chat_to(
                requester.cid,
                format!("Welcome back, {} kills on record", stats.kills),
            );
        }
    }
}

/// Per-tick collaborators the dispatcher routes into
pub struct DispatchEnv<'a> {
    pub tick: u64,
    pub outbox: &'a mut Outbox,
    pub spam: &'a mut dyn SpamGuard,
    pub callbacks: &'a mut dyn RoundCallbacks,
}

/// What happened to one result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Query failed, nothing routed
    Dropped,
    /// Chat lines queued
    Delivered { messages: usize, suppressed: usize },
    /// Handed to a round callback
    Forwarded,
    /// Payload kind is not routed
    Ignored,
}

/// Route one completed result for `player`
pub fn dispatch(player: &mut PlayerRecord, result: QueryResult, env: &mut DispatchEnv<'_>) -> DispatchOutcome {
    let payload = match result {
        QueryResult::Success(payload) => payload,
        QueryResult::Failure { reason } => {
            trace!(client_id = player.cid, %reason, "Dropping failed query");
            return DispatchOutcome::Dropped;
        }
    };

    match payload {
        QueryPayload::Direct(lines) => {
            let mut messages = 0;
            for line in lines.into_iter().take_while(|l| !l.is_empty()) {
                env.outbox.chat_to(player.cid, line);
                messages += 1;
            }
            DispatchOutcome::Delivered {
                messages,
                suppressed: 0,
            }
        }
        QueryPayload::All(lines) => {
            let mut messages = 0;
            let mut suppressed = 0;
            for (idx, line) in lines.into_iter().take_while(|l| !l.is_empty()).enumerate() {
                // Only the first line counts against the requester's chat budget
                if idx == 0 && env.spam.is_limited(player.cid, env.tick) {
                    suppressed += 1;
                    continue;
                }
                env.outbox.chat_all(line);
                messages += 1;
            }
            DispatchOutcome::Delivered {
                messages,
                suppressed,
            }
        }
        QueryPayload::Broadcast(_) => DispatchOutcome::Ignored,
        QueryPayload::Stats { stats, requested } => {
            env.callbacks
                .on_show_stats_all(&stats, player, &requested, env.outbox);
            DispatchOutcome::Forwarded
        }
        QueryPayload::Rank {
            rank,
            ranked_score,
            column,
            requested,
        } => {
            env.callbacks.on_show_rank(
                rank,
                ranked_score,
                column.display_name(),
                player,
                &requested,
                env.outbox,
            );
            DispatchOutcome::Forwarded
        }
        QueryPayload::PlayerData { stats, .. } => {
            env.callbacks
                .on_loaded_name_stats(&stats, player, env.outbox);
            DispatchOutcome::Forwarded
        }
    }
}
