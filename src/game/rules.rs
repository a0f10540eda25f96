//! Round policy and map queries
//!
//! Both are collaborators of the player state machine: the mode decides
//! whether stats count and who may spawn, the map answers zone and spawn
//! lookups.

use hashbrown::HashMap;
use rand::seq::SliceRandom;

use crate::game::constants::map::{DEFAULT_TUNE_ZONE, TILE_SIZE};
use crate::game::player::{PlayerRecord, Team};
use crate::util::vec2::Vec2;

/// Mode-specific round policy
pub trait RoundRules: Send {
    fn is_team_play(&self) -> bool;

    fn is_warmup(&self) -> bool;

    /// Tracked stats (leaderboard copies) are updated this round
    fn is_stat_track(&self) -> bool;

    /// Team shown to clients. Modes may report a different team than the
    /// stored one.
    fn displayed_team(&self, player: &PlayerRecord) -> Team {
        player.team
    }

    /// Extra spawn policy on top of the respawn delay
    fn can_spawn(&self, _player: &PlayerRecord, _tick: u64) -> bool {
        true
    }
}

/// Plain competitive round
#[derive(Debug, Clone)]
pub struct StandardRules {
    pub team_play: bool,
    pub warmup: bool,
    /// Rounds flagged non-competitive never track stats
    pub competitive: bool,
}

impl Default for StandardRules {
    fn default() -> Self {
        Self {
            team_play: true,
            warmup: false,
            competitive: true,
        }
    }
}

impl RoundRules for StandardRules {
    fn is_team_play(&self) -> bool {
        self.team_play
    }

    fn is_warmup(&self) -> bool {
        self.warmup
    }

    fn is_stat_track(&self) -> bool {
        self.competitive && !self.warmup
    }
}

/// Map lookups used by the lifecycle controller
pub trait GameMap: Send {
    /// Tune zone at a world position
    fn tune_zone_at(&self, position: Vec2) -> u8;

    /// Free spawn position for a team, `None` if every spawn is blocked
    fn spawn_point(&self, team: Team) -> Option<Vec2>;
}

/// Tile map with tune zones and per-team spawn points
#[derive(Debug, Clone, Default)]
pub struct ArenaMap {
    zones: HashMap<(i32, i32), u8>,
    spawns: HashMap<Team, Vec<Vec2>>,
}

impl ArenaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a tile as belonging to a tune zone
    pub fn with_zone(mut self, tile: (i32, i32), zone: u8) -> Self {
        self.zones.insert(tile, zone);
        self
    }

    pub fn with_spawn(mut self, team: Team, position: Vec2) -> Self {
        self.spawns.entry(team).or_default().push(position);
        self
    }

    /// Remove every spawn point of a team
    pub fn block_spawns(&mut self, team: Team) {
        self.spawns.remove(&team);
    }
}

impl GameMap for ArenaMap {
    fn tune_zone_at(&self, position: Vec2) -> u8 {
        self.zones
            .get(&position.to_tile(TILE_SIZE))
            .copied()
            .unwrap_or(DEFAULT_TUNE_ZONE)
    }

    fn spawn_point(&self, team: Team) -> Option<Vec2> {
        self.spawns
            .get(&team)
            .and_then(|points| points.choose(&mut rand::thread_rng()))
            .copied()
    }
}
