//! Cached server listing
//!
//! Out-of-band listing queries read a snapshot of the player table. Anything
//! that changes a listed field expires the snapshot; the next read rebuilds it.

use serde::Serialize;

use crate::game::player::ClientId;
use crate::game::registry::PlayerRegistry;

/// One player as shown in the server listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerInfo {
    pub client_id: ClientId,
    pub name: String,
    pub team: &'static str,
    pub score: i32,
}

#[derive(Debug, Default)]
pub struct ServerInfoCache {
    entries: Option<Vec<PlayerInfo>>,
    rebuilds: u64,
}

impl ServerInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop the snapshot so the next read sees current state
    pub fn expire(&mut self) {
        self.entries = None;
    }

    pub fn is_expired(&self) -> bool {
        self.entries.is_none()
    }

    /// Number of times the snapshot was rebuilt
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn players(&mut self, registry: &PlayerRegistry, team_play: bool) -> &[PlayerInfo] {
        let rebuilds = &mut self.rebuilds;
        self.entries.get_or_insert_with(|| {
            *rebuilds += 1;
            registry
                .iter()
                .map(|p| PlayerInfo {
                    client_id: p.cid,
                    name: p.name.clone(),
                    team: p.team_label(team_play),
                    score: p.score,
                })
                .collect()
        })
    }

    /// Listing as JSON
    pub fn to_json(&mut self, registry: &PlayerRegistry, team_play: bool) -> serde_json::Result<String> {
        serde_json::to_string(self.players(registry, team_play))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::player::Team;
    use crate::net::protocol::ProtocolVersion;

    #[test]
    fn test_rebuild_only_after_expire() {
        let mut registry = PlayerRegistry::new(4);
        registry
            .connect(0, "red", ProtocolVersion::Modern, Team::Red, 0)
            .unwrap();
        let mut cache = ServerInfoCache::new();

        assert_eq!(cache.players(&registry, true)[0].team, "red");
        registry.get_mut(0).unwrap().team = Team::Spectators;

        // stale until expired
        assert_eq!(cache.players(&registry, true)[0].team, "red");
        assert_eq!(cache.rebuilds(), 1);

        cache.expire();
        assert_eq!(cache.players(&registry, true)[0].team, "spectator");
        assert_eq!(cache.rebuilds(), 2);
    }

    #[test]
    fn test_json_listing() {
        let mut registry = PlayerRegistry::new(4);
        registry
            .connect(2, "solo", ProtocolVersion::Legacy, Team::Blue, 0)
            .unwrap();
        let mut cache = ServerInfoCache::new();

        let json = cache.to_json(&registry, false).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["name"], "solo");
        assert_eq!(value[0]["team"], "game");
        assert_eq!(value[0]["client_id"], 2);
    }
}
