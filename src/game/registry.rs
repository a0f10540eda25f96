//! Connection slot table
//!
//! Owns every [`PlayerRecord`] and a reverse index of who is spectating whom,
//! so spectator fix-ups touch only the affected watchers.

use hashbrown::HashMap;
use smallvec::SmallVec;
use tracing::debug;

use crate::game::player::{ClientId, PlayerRecord, SpectatorTarget, Team};
use crate::net::protocol::ProtocolVersion;
use crate::stats::player_stats::PlayerStats;

/// Registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("Client id {0} is outside the slot table")]
    OutOfRange(ClientId),
    #[error("Slot {0} is already in use")]
    SlotTaken(ClientId),
    #[error("Client {0} is not connected")]
    NotConnected(ClientId),
    #[error("Client {0} cannot spectate itself")]
    SelfSpectate(ClientId),
}

/// What remains of a player after disconnecting
#[derive(Debug, Clone)]
pub struct Departure {
    pub name: String,
    pub stats: PlayerStats,
    /// Finished query results that never got routed
    pub discarded_results: usize,
    /// Spectators moved to free view
    pub redirected: usize,
}

/// Fixed-size table of connection slots
#[derive(Debug)]
pub struct PlayerRegistry {
    slots: Vec<Option<PlayerRecord>>,
    /// target -> players spectating it
    watchers: HashMap<ClientId, SmallVec<[ClientId; 4]>>,
}

impl PlayerRegistry {
    pub fn new(max_clients: usize) -> Self {
        Self {
            slots: (0..max_clients).map(|_| None).collect(),
            watchers: HashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupy a slot. A disconnected record left in the slot is retired.
    pub fn connect(
        &mut self,
        cid: ClientId,
        name: impl Into<String>,
        protocol: ProtocolVersion,
        team: Team,
        tick: u64,
    ) -> Result<&mut PlayerRecord, RegistryError> {
        let slot = self
            .slots
            .get_mut(cid)
            .ok_or(RegistryError::OutOfRange(cid))?;
        if slot.as_ref().is_some_and(|p| p.connected) {
            return Err(RegistryError::SlotTaken(cid));
        }
        if slot.is_some() {
            debug!(client_id = cid, "Retiring disconnected record");
        }
        Ok(slot.insert(PlayerRecord::new(cid, name.into(), protocol, team, tick)))
    }

    /// Reset a player on disconnect. The record stays until the slot is reused.
    pub fn disconnect(&mut self, cid: ClientId) -> Result<Departure, RegistryError> {
        self.get(cid).ok_or(RegistryError::NotConnected(cid))?;
        self.set_spectator_target(cid, SpectatorTarget::FreeView)?;
        let redirected = self.redirect_spectators_to_free_view(cid);

        // Nobody may be credited through a slot the leaver no longer holds
        for other in self.iter_mut() {
            if other.last_toucher == Some(cid) {
                other.last_toucher = None;
            }
        }

        let player = self.get_mut(cid).ok_or(RegistryError::NotConnected(cid))?;
        let discarded_results = player.discard_queries();
        player.reset_for_disconnect();

        Ok(Departure {
            name: player.name.clone(),
            stats: player.stats.clone(),
            discarded_results,
            redirected,
        })
    }

    /// Connected player in `cid`
    pub fn get(&self, cid: ClientId) -> Option<&PlayerRecord> {
        self.slots
            .get(cid)
            .and_then(|s| s.as_ref())
            .filter(|p| p.connected)
    }

    pub fn get_mut(&mut self, cid: ClientId) -> Option<&mut PlayerRecord> {
        self.slots
            .get_mut(cid)
            .and_then(|s| s.as_mut())
            .filter(|p| p.connected)
    }

    /// Record in `cid` whether connected or not
    pub fn record(&self, cid: ClientId) -> Option<&PlayerRecord> {
        self.slots.get(cid).and_then(|s| s.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.slots.iter().flatten().filter(|p| p.connected)
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut PlayerRecord> {
        self.slots.iter_mut().flatten().filter(|p| p.connected)
    }

    pub fn connected_ids(&self) -> SmallVec<[ClientId; 16]> {
        self.iter().map(|p| p.cid).collect()
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Point `watcher` at a target, keeping the reverse index in sync
    pub fn set_spectator_target(
        &mut self,
        watcher: ClientId,
        target: SpectatorTarget,
    ) -> Result<(), RegistryError> {
        if let SpectatorTarget::Player(t) = target {
            if t == watcher {
                return Err(RegistryError::SelfSpectate(watcher));
            }
            self.get(t).ok_or(RegistryError::NotConnected(t))?;
        }

        let player = self
            .get_mut(watcher)
            .ok_or(RegistryError::NotConnected(watcher))?;
        let previous = std::mem::replace(&mut player.spectating, target);

        if let SpectatorTarget::Player(old) = previous {
            if let Some(list) = self.watchers.get_mut(&old) {
                list.retain(|w| *w != watcher);
                if list.is_empty() {
                    self.watchers.remove(&old);
                }
            }
        }
        if let SpectatorTarget::Player(new) = target {
            self.watchers.entry(new).or_default().push(watcher);
        }
        Ok(())
    }

    /// Players currently spectating `target`
    pub fn watchers_of(&self, target: ClientId) -> &[ClientId] {
        self.watchers
            .get(&target)
            .map(|w| w.as_slice())
            .unwrap_or(&[])
    }

    /// Move everyone spectating `target` to free view; returns how many moved
    pub fn redirect_spectators_to_free_view(&mut self, target: ClientId) -> usize {
        let Some(list) = self.watchers.remove(&target) else {
            return 0;
        };
        for watcher in &list {
            if let Some(player) = self.slots.get_mut(*watcher).and_then(|s| s.as_mut()) {
                player.spectating = SpectatorTarget::FreeView;
            }
        }
        list.len()
    }

    /// Record who last hit `victim`.
    ///
    /// A self-touch leaves the toucher unchanged. `None`, ids that hold no
    /// connected player and teammates in team play reset it.
    pub fn update_last_toucher(&mut self, victim: ClientId, toucher: Option<ClientId>, team_play: bool) {
        let resolved = match toucher {
            Some(t) if t == victim => return,
            Some(t) => {
                let victim_team = self.get(victim).map(|p| p.team);
                match self.get(t) {
                    None => None,
                    Some(other) if team_play && Some(other.team) == victim_team => None,
                    Some(_) => Some(t),
                }
            }
            None => None,
        };
        if let Some(player) = self.get_mut(victim) {
            player.last_toucher = resolved;
        }
    }
}
