use crate::game::constants::{net, round};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Simulation ticks per second
    pub tick_rate: u32,
    /// Seconds a player has to wait between voluntary team changes
    pub team_change_delay_secs: u32,
    /// Training mode: multi-kill announcements are not broadcast
    pub train_mode: bool,
    /// Seasonal cosmetic: idle players periodically show a ghost emoticon
    pub ghost_cue: bool,
    /// Number of connection slots
    pub max_clients: usize,
    /// Background threads executing stats queries
    pub stats_workers: usize,
    /// Maximum queued stats jobs before submissions are refused
    pub stats_queue_capacity: usize,
    /// Chat messages allowed per spam window
    pub chat_burst: u32,
    /// Length of the spam window in ticks
    pub chat_window_ticks: u64,
    /// Port for the metrics endpoint
    pub metrics_port: u16,
    /// Default log filter when RUST_LOG is not set
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            tick_rate: round::TICK_RATE,
            team_change_delay_secs: round::TEAM_CHANGE_DELAY_SECS,
            train_mode: false,
            ghost_cue: false,
            max_clients: net::MAX_CLIENTS,
            stats_workers: 1,
            stats_queue_capacity: 256,
            chat_burst: 3,
            chat_window_ticks: round::TICK_RATE as u64 * 2,
            metrics_port: 9090,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("TICK_RATE") {
            match rate.parse::<u32>() {
                Ok(parsed) if (1..=1000).contains(&parsed) => config.tick_rate = parsed,
                Ok(_) => tracing::warn!("TICK_RATE must be 1-1000, using default"),
                Err(_) => tracing::warn!("Invalid TICK_RATE '{}', using default", rate),
            }
        }

        if let Ok(delay) = std::env::var("TEAM_CHANGE_DELAY") {
            if let Ok(parsed) = delay.parse::<u32>() {
                config.team_change_delay_secs = parsed;
            } else {
                tracing::warn!("Invalid TEAM_CHANGE_DELAY '{}', using default", delay);
            }
        }

        if let Ok(train) = std::env::var("TRAIN_MODE") {
            config.train_mode = matches!(train.as_str(), "1" | "true" | "yes");
        }

        if let Ok(ghost) = std::env::var("GHOST_CUE") {
            config.ghost_cue = matches!(ghost.as_str(), "1" | "true" | "yes");
        }

        if let Ok(max_clients) = std::env::var("MAX_CLIENTS") {
            match max_clients.parse::<usize>() {
                Ok(parsed) if (1..=net::MAX_CLIENTS).contains(&parsed) => {
                    config.max_clients = parsed
                }
                Ok(_) => tracing::warn!(
                    "MAX_CLIENTS must be 1-{}, using default",
                    net::MAX_CLIENTS
                ),
                Err(_) => tracing::warn!("Invalid MAX_CLIENTS '{}', using default", max_clients),
            }
        }

        if let Ok(workers) = std::env::var("STATS_WORKERS") {
            match workers.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.stats_workers = parsed,
                _ => tracing::warn!("Invalid STATS_WORKERS '{}', using default", workers),
            }
        }

        if let Ok(capacity) = std::env::var("STATS_QUEUE_CAPACITY") {
            match capacity.parse::<usize>() {
                Ok(parsed) if parsed > 0 => config.stats_queue_capacity = parsed,
                _ => tracing::warn!("Invalid STATS_QUEUE_CAPACITY '{}', using default", capacity),
            }
        }

        if let Ok(burst) = std::env::var("CHAT_BURST") {
            match burst.parse::<u32>() {
                Ok(parsed) if parsed > 0 => config.chat_burst = parsed,
                _ => tracing::warn!("Invalid CHAT_BURST '{}', using default", burst),
            }
        }

        if let Ok(window) = std::env::var("CHAT_WINDOW_TICKS") {
            match window.parse::<u64>() {
                Ok(parsed) if parsed > 0 => config.chat_window_ticks = parsed,
                _ => tracing::warn!("Invalid CHAT_WINDOW_TICKS '{}', using default", window),
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                config.metrics_port = parsed;
            } else {
                tracing::warn!("Invalid METRICS_PORT '{}', using default", port);
            }
        }

        if let Ok(level) = std::env::var("LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_rate == 0 {
            return Err(ConfigError::Invalid("tick_rate must be at least 1"));
        }
        if self.max_clients == 0 || self.max_clients > net::MAX_CLIENTS {
            return Err(ConfigError::Invalid("max_clients out of range"));
        }
        if self.stats_workers == 0 {
            return Err(ConfigError::Invalid("stats_workers must be at least 1"));
        }
        if self.stats_queue_capacity == 0 {
            return Err(ConfigError::Invalid("stats_queue_capacity must be at least 1"));
        }
        if self.chat_burst == 0 || self.chat_window_ticks == 0 {
            return Err(ConfigError::Invalid("chat spam window must be non-empty"));
        }
        Ok(())
    }

    /// Tick at which a team change stamped at `last_set_team_tick` may be repeated
    pub fn team_change_cooldown_tick(&self, last_set_team_tick: u64) -> u64 {
        last_set_team_tick + self.tick_rate as u64 * self.team_change_delay_secs as u64
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.tick_rate, 50);
        assert_eq!(config.team_change_delay_secs, 3);
        assert!(!config.train_mode);
        assert_eq!(config.max_clients, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_or_default() {
        let config = ServerConfig::load_or_default();
        assert!(config.tick_rate > 0);
    }

    #[test]
    fn test_load_queue_and_chat_limits() {
        std::env::set_var("STATS_QUEUE_CAPACITY", "32");
        std::env::set_var("CHAT_BURST", "5");
        std::env::set_var("CHAT_WINDOW_TICKS", "zero");
        let config = ServerConfig::load_or_default();
        std::env::remove_var("STATS_QUEUE_CAPACITY");
        std::env::remove_var("CHAT_BURST");
        std::env::remove_var("CHAT_WINDOW_TICKS");

        assert_eq!(config.stats_queue_capacity, 32);
        assert_eq!(config.chat_burst, 5);
        // bad value falls back to the default
        assert_eq!(config.chat_window_ticks, ServerConfig::default().chat_window_ticks);
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let config = ServerConfig {
            stats_workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_cooldown_tick() {
        let config = ServerConfig::default();
        assert_eq!(config.team_change_cooldown_tick(1000), 1000 + 50 * 3);
    }
}
