//! Chat spam protection
//!
//! Counts server-relayed public messages per player in a sliding tick window.

use hashbrown::HashMap;

use crate::game::player::ClientId;

/// Decides whether a player may put another line in public chat
pub trait SpamGuard {
    /// Record an attempt at `tick`; `true` means the line must be suppressed
    fn is_limited(&mut self, client_id: ClientId, tick: u64) -> bool;
}

/// Chat window for a single player
#[derive(Debug, Clone, Default)]
struct ChatWindow {
    window_start: u64,
    messages: u32,
}

/// Burst limiter: at most `burst` lines per `window_ticks`
#[derive(Debug)]
pub struct ChatRateLimiter {
    burst: u32,
    window_ticks: u64,
    players: HashMap<ClientId, ChatWindow>,
}

impl ChatRateLimiter {
    pub fn new(burst: u32, window_ticks: u64) -> Self {
        Self {
            burst,
            window_ticks: window_ticks.max(1),
            players: HashMap::new(),
        }
    }

    /// Forget a player (disconnect)
    pub fn forget(&mut self, client_id: ClientId) {
        self.players.remove(&client_id);
    }

    pub fn tracked(&self) -> usize {
        self.players.len()
    }
}

impl SpamGuard for ChatRateLimiter {
    fn is_limited(&mut self, client_id: ClientId, tick: u64) -> bool {
        let window = self.players.entry(client_id).or_insert_with(|| ChatWindow {
            window_start: tick,
            messages: 0,
        });

        if tick.saturating_sub(window.window_start) >= self.window_ticks {
            window.window_start = tick;
            window.messages = 0;
        }

        if window.messages >= self.burst {
            return true;
        }
        window.messages += 1;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_burst_then_limited() {
        let mut limiter = ChatRateLimiter::new(2, 100);
        assert!(!limiter.is_limited(1, 0));
        assert!(!limiter.is_limited(1, 1));
        assert!(limiter.is_limited(1, 2));
    }

    #[test]
    fn test_window_resets() {
        let mut limiter = ChatRateLimiter::new(1, 10);
        assert!(!limiter.is_limited(1, 0));
        assert!(limiter.is_limited(1, 9));
        assert!(!limiter.is_limited(1, 10));
    }

    #[test]
    fn test_players_independent() {
        let mut limiter = ChatRateLimiter::new(1, 10);
        assert!(!limiter.is_limited(1, 0));
        assert!(!limiter.is_limited(2, 0));
        assert!(limiter.is_limited(1, 0));
    }

    #[test]
    fn test_forget() {
        let mut limiter = ChatRateLimiter::new(1, 10);
        limiter.is_limited(4, 0);
        assert_eq!(limiter.tracked(), 1);
        limiter.forget(4);
        assert_eq!(limiter.tracked(), 0);
        assert!(!limiter.is_limited(4, 1));
    }
}
