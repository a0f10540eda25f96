//! Score, kill and death bookkeeping
//!
//! Live counters always change. The tracked copies in [`PlayerStats`] only
//! change while the round tracks stats, and tracked points never go down.
//!
//! [`PlayerStats`]: crate::stats::player_stats::PlayerStats

use crate::game::constants::round::{WARMUP_ALERT, WARMUP_ALERT_LIMIT};
use crate::game::player::PlayerRecord;
use crate::game::rules::RoundRules;
use crate::net::outbox::Outbox;

/// Apply a score delta. Negative deltas lower the live score only.
pub fn add_score(player: &mut PlayerRecord, delta: i32, rules: &dyn RoundRules, outbox: &mut Outbox) {
    if rules.is_warmup() {
        warmup_alert(player, outbox);
    }
    if delta > 0 && rules.is_stat_track() {
        player.stats.points += delta as u32;
    }
    player.score += delta;
}

pub fn add_kills(player: &mut PlayerRecord, amount: u32, stat_track: bool) {
    if stat_track {
        player.stats.kills += amount;
    }
    player.kills += amount;
}

pub fn add_deaths(player: &mut PlayerRecord, amount: u32, stat_track: bool) {
    if stat_track {
        player.stats.deaths += amount;
    }
    player.deaths += amount;
}

/// Clear live counters and tracked stats (round restart)
pub fn reset_stats(player: &mut PlayerRecord) {
    player.score = 0;
    player.kills = 0;
    player.deaths = 0;
    player.spree = 0;
    player.multi = 0;
    player.last_kill_time = None;
    player.stats.reset();
}

/// Remind legacy clients that the round is a warmup. Modern clients show
/// warmup themselves. At most `WARMUP_ALERT_LIMIT - 1` alerts per player.
pub fn warmup_alert(player: &mut PlayerRecord, outbox: &mut Outbox) -> bool {
    if player.protocol.has_native_warmup() {
        return false;
    }
    player.sent_warmup_alerts += 1;
    if player.sent_warmup_alerts < WARMUP_ALERT_LIMIT {
        outbox.broadcast_to(player.cid, WARMUP_ALERT);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Team;
    use crate::game::rules::StandardRules;
    use crate::net::protocol::{ProtocolVersion, ServerMessage};

    fn player(protocol: ProtocolVersion) -> PlayerRecord {
        PlayerRecord::new(2, "tee".to_string(), protocol, Team::Blue, 0)
    }

    #[test]
    fn test_negative_score_never_lowers_tracked_points() {
        let rules = StandardRules::default();
        let mut outbox = Outbox::new();
        let mut p = player(ProtocolVersion::Modern);

        add_score(&mut p, 3, &rules, &mut outbox);
        add_score(&mut p, -5, &rules, &mut outbox);

        assert_eq!(p.score, -2);
        assert_eq!(p.stats.points, 3);
    }

    #[test]
    fn test_untracked_round_keeps_live_score() {
        let rules = StandardRules {
            competitive: false,
            ..Default::default()
        };
        let mut outbox = Outbox::new();
        let mut p = player(ProtocolVersion::Modern);

        add_score(&mut p, 4, &rules, &mut outbox);
        assert_eq!(p.score, 4);
        assert_eq!(p.stats.points, 0);
    }

    #[test]
    fn test_kills_and_deaths() {
        let mut p = player(ProtocolVersion::Modern);
        add_kills(&mut p, 2, true);
        add_kills(&mut p, 1, false);
        add_deaths(&mut p, 1, false);
        assert_eq!(p.kills, 3);
        assert_eq!(p.stats.kills, 2);
        assert_eq!(p.deaths, 1);
        assert_eq!(p.stats.deaths, 0);
    }

    #[test]
    fn test_warmup_alert_legacy_only_twice() {
        let rules = StandardRules {
            warmup: true,
            ..Default::default()
        };
        let mut outbox = Outbox::new();
        let mut legacy = player(ProtocolVersion::Legacy);
        for _ in 0..5 {
            add_score(&mut legacy, 1, &rules, &mut outbox);
        }
        let alerts = outbox
            .messages_for(legacy.cid)
            .filter(|m| matches!(m, ServerMessage::Broadcast { .. }))
            .count();
        assert_eq!(alerts, 2);
        assert_eq!(legacy.score, 5);

        let mut outbox = Outbox::new();
        let mut modern = player(ProtocolVersion::Modern);
        add_score(&mut modern, 1, &rules, &mut outbox);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_reset_stats() {
        let mut p = player(ProtocolVersion::Modern);
        p.score = 9;
        p.spree = 3;
        add_kills(&mut p, 2, true);
        reset_stats(&mut p);
        assert_eq!(p.score, 0);
        assert_eq!(p.kills, 0);
        assert_eq!(p.spree, 0);
        assert!(p.stats.is_empty());
    }
}
