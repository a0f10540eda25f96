//! Kill streaks and multi-kills
//!
//! A spree counts consecutive kills without dying. A multi-kill chains kills
//! that land within [`MULTI_WINDOW_SECS`] of each other.

use tracing::debug;

use crate::game::constants::kills::{MULTI_WINDOW_SECS, SPREE_INTERVAL};
use crate::game::player::PlayerRecord;
use crate::net::outbox::Outbox;

/// Update the multi-kill counter for a kill at `now_secs`; returns the new counter.
///
/// The histogram and best-multi copies change only when `stat_track` is set.
/// `train_mode` keeps the announcement out of public chat.
pub fn handle_multi(
    player: &mut PlayerRecord,
    now_secs: i64,
    stat_track: bool,
    train_mode: bool,
    outbox: &mut Outbox,
) -> u32 {
    let chained = player
        .last_kill_time
        .is_some_and(|last| now_secs - last <= MULTI_WINDOW_SECS);
    player.last_kill_time = Some(now_secs);

    if !chained {
        player.multi = 1;
        return player.multi;
    }

    player.multi += 1;
    if stat_track {
        player.stats.record_multi(player.multi);
    }

    if !train_mode {
        outbox.chat_all(format!("'{}' multi x{}!", player.name, player.multi));
    }
    player.multi
}

/// Extend the kill streak, announcing every [`SPREE_INTERVAL`]th kill
pub fn add_spree(player: &mut PlayerRecord, stat_track: bool, outbox: &mut Outbox) {
    player.spree += 1;
    if stat_track && player.spree > player.stats.best_spree {
        player.stats.best_spree = player.spree;
    }
    if player.spree % SPREE_INTERVAL == 0 {
        outbox.chat_all(format!(
            "'{}' is on a killing spree with {} kills!",
            player.name, player.spree
        ));
    }
}

/// End the streak on death. Streaks long enough to have been announced get
/// an announcement of their end.
pub fn end_spree(player: &mut PlayerRecord, killer_name: Option<&str>, outbox: &mut Outbox) {
    if player.spree >= SPREE_INTERVAL {
        let text = match killer_name {
            Some(killer) => format!(
                "'{}' {}-kills killing spree was ended by '{}'",
                player.name, player.spree, killer
            ),
            None => format!("'{}' {}-kills killing spree was ended", player.name, player.spree),
        };
        outbox.chat_all(text);
    }
    debug!(client_id = player.cid, spree = player.spree, "Spree ended");
    player.spree = 0;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::constants::kills::MAX_MULTIS;
    use crate::game::player::Team;
    use crate::net::protocol::{ProtocolVersion, ServerMessage};

    fn player() -> PlayerRecord {
        PlayerRecord::new(0, "ace".to_string(), ProtocolVersion::Modern, Team::Red, 0)
    }

    fn chat_lines(outbox: &Outbox) -> Vec<String> {
        outbox
            .messages()
            .iter()
            .filter_map(|o| match &o.message {
                ServerMessage::Chat { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_multi_sequence_resets_after_window() {
        let mut p = player();
        let mut outbox = Outbox::new();
        let t = 1_000;

        let counters: Vec<u32> = [t, t + 1, t + 7]
            .iter()
            .map(|now| handle_multi(&mut p, *now, true, false, &mut outbox))
            .collect();

        assert_eq!(counters, vec![1, 2, 1]);
        assert_eq!(chat_lines(&outbox), vec!["'ace' multi x2!".to_string()]);
    }

    #[test]
    fn test_window_boundary_chains() {
        let mut p = player();
        let mut outbox = Outbox::new();
        handle_multi(&mut p, 100, true, false, &mut outbox);
        assert_eq!(handle_multi(&mut p, 105, true, false, &mut outbox), 2);
        assert_eq!(handle_multi(&mut p, 111, true, false, &mut outbox), 1);
    }

    #[test]
    fn test_multi_histogram_clamped() {
        let mut p = player();
        let mut outbox = Outbox::new();
        for _ in 0..(MAX_MULTIS + 5) {
            handle_multi(&mut p, 50, true, true, &mut outbox);
        }
        assert_eq!(p.stats.multis[0], 1);
        assert_eq!(p.stats.best_multi as usize, MAX_MULTIS + 5);
        // counters 13..=16 all land in the last bucket
        assert_eq!(p.stats.multis[MAX_MULTIS], 4);
    }

    #[test]
    fn test_train_mode_suppresses_announcement() {
        let mut p = player();
        let mut outbox = Outbox::new();
        handle_multi(&mut p, 10, true, true, &mut outbox);
        handle_multi(&mut p, 11, true, true, &mut outbox);
        assert_eq!(p.multi, 2);
        assert!(outbox.is_empty());
    }

    #[test]
    fn test_multi_without_stat_track() {
        let mut p = player();
        let mut outbox = Outbox::new();
        handle_multi(&mut p, 10, false, false, &mut outbox);
        handle_multi(&mut p, 11, false, false, &mut outbox);
        assert_eq!(p.multi, 2);
        assert_eq!(p.stats.best_multi, 0);
        assert!(p.stats.multis.iter().all(|m| *m == 0));
    }

    #[test]
    fn test_spree_announced_every_interval() {
        let mut p = player();
        let mut outbox = Outbox::new();
        for _ in 0..10 {
            add_spree(&mut p, true, &mut outbox);
        }
        assert_eq!(p.spree, 10);
        assert_eq!(p.stats.best_spree, 10);
        assert_eq!(outbox.len(), 2);
    }

    #[test]
    fn test_end_spree() {
        let mut p = player();
        let mut outbox = Outbox::new();
        for _ in 0..6 {
            add_spree(&mut p, true, &mut outbox);
        }
        outbox.clear();

        end_spree(&mut p, Some("rival"), &mut outbox);
        assert_eq!(p.spree, 0);
        assert_eq!(p.stats.best_spree, 6);
        assert_eq!(
            chat_lines(&outbox),
            vec!["'ace' 6-kills killing spree was ended by 'rival'".to_string()]
        );
    }

    #[test]
    fn test_short_spree_ends_quietly() {
        let mut p = player();
        let mut outbox = Outbox::new();
        add_spree(&mut p, true, &mut outbox);
        end_spree(&mut p, None, &mut outbox);
        assert!(outbox.is_empty());
        assert_eq!(p.spree, 0);
    }
}
