pub mod constants;
pub mod player;
pub mod registry;
pub mod rules;
pub mod spam;
pub mod scoring;
pub mod spree;
pub mod lifecycle;
pub mod team;
pub mod round;
