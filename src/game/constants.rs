/// Round timing constants
pub mod round {
    /// Server tick rate in Hz
    pub const TICK_RATE: u32 = 50;
    /// Default delay between voluntary team changes (seconds)
    pub const TEAM_CHANGE_DELAY_SECS: u32 = 3;
    /// Respawn delay after a team change or death, as a divisor of the tick rate
    /// (tick_rate / 2 = half a second)
    pub const RESPAWN_DELAY_DIVISOR: u64 = 2;
    /// Warmup alerts are sent while fewer than this many were sent
    pub const WARMUP_ALERT_LIMIT: u32 = 3;
    /// Text of the warmup HUD alert
    pub const WARMUP_ALERT: &str = "This is a warmup game. Call a restart vote to start.";
}

/// Kill streak constants
pub mod kills {
    /// Kills further apart than this (seconds) do not chain into a multi-kill
    pub const MULTI_WINDOW_SECS: i64 = 5;
    /// Highest multi-kill histogram bucket index; larger multis are clamped here
    pub const MAX_MULTIS: usize = 11;
    /// A killing spree is announced every this many consecutive kills
    pub const SPREE_INTERVAL: u32 = 5;
}

/// Cosmetic side-channel constants
pub mod cosmetics {
    /// Period of the ghost emote cue in ticks
    pub const GHOST_CYCLE_TICKS: u64 = 1200;
    /// The cue fires during the last ticks of each period
    pub const GHOST_WINDOW_TICKS: u64 = 5;
}

/// Networking constants
pub mod net {
    /// Number of connection slots a server can hold
    pub const MAX_CLIENTS: usize = 64;
}

/// Map constants
pub mod map {
    /// Side length of one map tile in world units
    pub const TILE_SIZE: f32 = 32.0;
    /// Tune zone used where the map defines none
    pub const DEFAULT_TUNE_ZONE: u8 = 0;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_respawn_delay_is_half_second() {
        assert_eq!(round::TICK_RATE as u64 / round::RESPAWN_DELAY_DIVISOR, 25);
    }

    #[test]
    fn test_ghost_window_fits_cycle() {
        assert!(cosmetics::GHOST_WINDOW_TICKS < cosmetics::GHOST_CYCLE_TICKS);
    }
}
