pub mod player_stats;
pub mod query;
pub mod store;
pub mod worker;
pub mod dispatch;
