//! PvP Round Server Library
//!
//! Per-player tick state machine for a competitive multiplayer round, with
//! background stats queries folded into the tick loop.
//!
//! # Modules
//!
//! - `game` - player records, body lifecycle, teams, scoring and the round driver
//! - `stats` - query slots, the stats worker pool and result routing
//! - `net` - protocol encoders, the outbox and the server listing cache

pub mod config;
pub mod util;
pub mod game;
pub mod net;
pub mod stats;
pub mod metrics;
