//! Per-connection player state
//!
//! A [`PlayerRecord`] is created on connect and owns at most one [`Body`].
//! `is_dead` is tracked separately from body ownership: the body of a killed
//! player lingers for one tick before the lifecycle controller destroys it.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::game::constants::map::DEFAULT_TUNE_ZONE;
use crate::net::protocol::ProtocolVersion;
use crate::stats::player_stats::PlayerStats;
use crate::stats::query::{QueryCompletion, QueryError, QueryLane, QueryResult, QuerySlot};
use crate::util::vec2::Vec2;

/// Connection slot index
pub type ClientId = usize;

/// Player team
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Team {
    Red,
    Blue,
    Spectators,
}

impl Team {
    /// Numeric team value used on the wire
    pub fn wire_value(&self) -> i32 {
        match self {
            Team::Spectators => -1,
            Team::Red => 0,
            Team::Blue => 1,
        }
    }

    pub fn is_spectator(&self) -> bool {
        matches!(self, Team::Spectators)
    }
}

/// Who a spectator is watching
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpectatorTarget {
    #[default]
    FreeView,
    Player(ClientId),
}

/// Facial expression of a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Emote {
    #[default]
    Normal,
    Pain,
    Happy,
    Surprise,
    Angry,
    Blink,
}

/// Simulated body of a player. Movement and collision happen elsewhere;
/// this tracks what the lifecycle needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Body {
    pub position: Vec2,
    alive: bool,
    paused: bool,
    /// Last tick the owner sent meaningful input
    pub last_action_tick: u64,
}

impl Body {
    pub fn spawn(position: Vec2, tick: u64) -> Self {
        Self {
            position,
            alive: true,
            paused: false,
            last_action_tick: tick,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Mark the body dead. It stays owned until the next lifecycle pass.
    pub fn die(&mut self) {
        self.alive = false;
        self.paused = false;
    }
}

/// Coarse lifecycle state, one of which holds at every tick boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    Alive,
    Dying,
    Spawning,
    Paused,
    Spectating,
}

/// Per-connection player state
#[derive(Debug)]
pub struct PlayerRecord {
    pub cid: ClientId,
    pub name: String,
    pub protocol: ProtocolVersion,
    pub team: Team,
    pub connected: bool,

    pub body: Option<Body>,
    /// Set at the death event, cleared when the next body is granted
    pub is_dead: bool,
    /// Wants a body that has not been granted yet
    pub spawning: bool,
    /// Earliest tick a new body may be granted
    pub respawn_tick: u64,
    /// Player asked to pause; the body is frozen in place
    pub paused: bool,
    /// External hold that keeps a spawning player from respawning
    pub weak_hook_hold: bool,

    pub last_set_team_tick: u64,
    pub last_action_tick: u64,
    pub join_tick: u64,

    pub(crate) spectating: SpectatorTarget,
    /// Last position the player looked at; drives zone lookups
    pub view_pos: Vec2,
    pub tune_zone: u8,
    /// Forced emote and the tick it expires
    pub override_emote: Option<(Emote, u64)>,

    pub score: i32,
    pub kills: u32,
    pub deaths: u32,
    /// Current kill streak
    pub spree: u32,
    /// Current multi-kill counter
    pub multi: u32,
    /// Unix second of the last credited kill
    pub last_kill_time: Option<i64>,
    pub stats: PlayerStats,
    pub last_toucher: Option<ClientId>,
    pub sent_warmup_alerts: u32,

    pub stats_query: QuerySlot,
    pub fastcap_query: QuerySlot,
}

impl PlayerRecord {
    pub fn new(cid: ClientId, name: String, protocol: ProtocolVersion, team: Team, tick: u64) -> Self {
        Self {
            cid,
            name,
            protocol,
            team,
            connected: true,
            body: None,
            is_dead: false,
            spawning: false,
            respawn_tick: tick,
            paused: false,
            weak_hook_hold: false,
            last_set_team_tick: tick,
            last_action_tick: tick,
            join_tick: tick,
            spectating: SpectatorTarget::FreeView,
            view_pos: Vec2::ZERO,
            tune_zone: DEFAULT_TUNE_ZONE,
            override_emote: None,
            score: 0,
            kills: 0,
            deaths: 0,
            spree: 0,
            multi: 0,
            last_kill_time: None,
            stats: PlayerStats::default(),
            last_toucher: None,
            sent_warmup_alerts: 0,
            stats_query: QuerySlot::new(QueryLane::Stats),
            fastcap_query: QuerySlot::new(QueryLane::Fastcap),
        }
    }

    /// Players in a game team who are not paused want a body
    pub fn wants_body(&self) -> bool {
        !self.team.is_spectator() && !self.paused
    }

    pub fn spectator_target(&self) -> SpectatorTarget {
        self.spectating
    }

    pub fn body_state(&self) -> BodyState {
        match &self.body {
            Some(_) if self.paused => BodyState::Paused,
            Some(body) if body.is_alive() => BodyState::Alive,
            Some(_) => BodyState::Dying,
            None if self.spawning => BodyState::Spawning,
            None if self.team.is_spectator() => BodyState::Spectating,
            None => BodyState::Paused,
        }
    }

    pub fn has_live_body(&self) -> bool {
        self.body.as_ref().is_some_and(|b| b.is_alive())
    }

    /// Release the body immediately, without death bookkeeping
    pub fn destroy_body(&mut self) -> bool {
        self.body.take().is_some()
    }

    /// Label used in listings and logs
    pub fn team_label(&self, team_play: bool) -> &'static str {
        match self.team {
            Team::Spectators => "spectator",
            _ if !team_play => "game",
            Team::Red => "red",
            Team::Blue => "blue",
        }
    }

    pub fn slot_mut(&mut self, lane: QueryLane) -> &mut QuerySlot {
        match lane {
            QueryLane::Stats => &mut self.stats_query,
            QueryLane::Fastcap => &mut self.fastcap_query,
        }
    }

    /// Arm the lane's slot for a new query
    pub fn arm_query(&mut self, lane: QueryLane) -> Result<QueryCompletion, QueryError> {
        self.slot_mut(lane).arm()
    }

    /// Take every completed result, stats lane first
    pub fn drain_completed_queries(&mut self) -> SmallVec<[QueryResult; 2]> {
        let mut results = SmallVec::new();
        if let Some(result) = self.stats_query.drain() {
            results.push(result);
        }
        if let Some(result) = self.fastcap_query.drain() {
            results.push(result);
        }
        results
    }

    /// Release both slots whatever their state. Returns how many finished
    /// results were dropped without being routed.
    pub fn discard_queries(&mut self) -> usize {
        self.stats_query.discard().into_iter().count() + self.fastcap_query.discard().into_iter().count()
    }

    pub fn set_emote_override(&mut self, emote: Emote, until_tick: u64) {
        self.override_emote = Some((emote, until_tick));
    }

    /// Emote currently shown on the body
    pub fn emote(&self) -> Emote {
        self.override_emote.map_or(Emote::Normal, |(emote, _)| emote)
    }

    /// Disconnect reset: the record stays in its slot until the slot is reused
    pub(crate) fn reset_for_disconnect(&mut self) {
        self.connected = false;
        self.body = None;
        self.spawning = false;
        self.is_dead = false;
        self.spree = 0;
        self.multi = 0;
        self.last_toucher = None;
        self.spectating = SpectatorTarget::FreeView;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(team: Team) -> PlayerRecord {
        PlayerRecord::new(3, "tee".to_string(), ProtocolVersion::Modern, team, 100)
    }

    #[test]
    fn test_team_wire_values() {
        assert_eq!(Team::Spectators.wire_value(), -1);
        assert_eq!(Team::Red.wire_value(), 0);
        assert_eq!(Team::Blue.wire_value(), 1);
    }

    #[test]
    fn test_team_label() {
        assert_eq!(record(Team::Spectators).team_label(true), "spectator");
        assert_eq!(record(Team::Red).team_label(false), "game");
        assert_eq!(record(Team::Red).team_label(true), "red");
        assert_eq!(record(Team::Blue).team_label(true), "blue");
    }

    #[test]
    fn test_new_record_timers() {
        let player = record(Team::Red);
        assert_eq!(player.join_tick, 100);
        assert_eq!(player.last_action_tick, 100);
        assert_eq!(player.last_set_team_tick, 100);
        assert!(!player.is_dead);
        assert!(player.body.is_none());
    }

    #[test]
    fn test_body_die_is_not_destroy() {
        let mut player = record(Team::Red);
        player.body = Some(Body::spawn(Vec2::new(1.0, 2.0), 100));
        assert_eq!(player.body_state(), BodyState::Alive);

        player.body.as_mut().unwrap().die();
        assert!(player.body.is_some());
        assert!(!player.has_live_body());
        assert_eq!(player.body_state(), BodyState::Dying);
    }

    #[test]
    fn test_body_state_without_body() {
        let mut player = record(Team::Blue);
        player.spawning = true;
        assert_eq!(player.body_state(), BodyState::Spawning);

        let spec = record(Team::Spectators);
        assert_eq!(spec.body_state(), BodyState::Spectating);
    }

    #[test]
    fn test_wants_body() {
        let mut player = record(Team::Red);
        assert!(player.wants_body());
        player.paused = true;
        assert!(!player.wants_body());
        assert!(!record(Team::Spectators).wants_body());
    }

    #[test]
    fn test_drain_both_lanes() {
        let mut player = record(Team::Red);
        player
            .arm_query(QueryLane::Stats)
            .unwrap()
            .complete(QueryResult::Failure {
                reason: "a".into(),
            });
        player
            .arm_query(QueryLane::Fastcap)
            .unwrap()
            .complete(QueryResult::Failure {
                reason: "b".into(),
            });

        let drained = player.drain_completed_queries();
        assert_eq!(drained.len(), 2);
        assert!(!player.stats_query.is_pending());
        assert!(!player.fastcap_query.is_pending());
    }

    #[test]
    fn test_arm_busy_lane_rejected() {
        let mut player = record(Team::Red);
        let _pending = player.arm_query(QueryLane::Stats).unwrap();
        assert!(player.arm_query(QueryLane::Stats).is_err());
        assert!(player.arm_query(QueryLane::Fastcap).is_ok());
    }

    #[test]
    fn test_discard_queries() {
        let mut player = record(Team::Red);
        player
            .arm_query(QueryLane::Stats)
            .unwrap()
            .complete(QueryResult::Failure {
                reason: "ready".into(),
            });
        let _held = player.arm_query(QueryLane::Fastcap).unwrap();

        assert_eq!(player.discard_queries(), 1);
        assert!(!player.stats_query.is_pending());
        assert!(!player.fastcap_query.is_pending());
    }

    #[test]
    fn test_emote_override() {
        let mut player = record(Team::Red);
        assert_eq!(player.emote(), Emote::Normal);
        player.set_emote_override(Emote::Happy, 150);
        assert_eq!(player.emote(), Emote::Happy);
    }
}
