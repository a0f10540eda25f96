//! Round driver
//!
//! Owns every piece of per-round state and exposes the entry points the
//! network layer and the game mode call: connection changes, the tick,
//! combat events, team changes and stats requests. Outgoing messages pile
//! up in the outbox until [`Round::flush`] encodes them per protocol.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::game::constants::round::RESPAWN_DELAY_DIVISOR;
use crate::game::lifecycle::{tick_player, PlayerEvent, TickEnv};
use crate::game::player::{ClientId, PlayerRecord, Team};
use crate::game::registry::{Departure, PlayerRegistry, RegistryError};
use crate::game::rules::{GameMap, RoundRules};
use crate::game::scoring::{add_deaths, add_kills, add_score, reset_stats};
use crate::game::spam::ChatRateLimiter;
use crate::game::spree::{add_spree, end_spree, handle_multi};
use crate::game::team::{
    check_cooldown, set_team_forced, set_team_no_kill, TeamChangeOutcome, TeamEnv, TeamError,
};
use crate::metrics::Metrics;
use crate::net::outbox::{Datagram, Outbox};
use crate::net::protocol::ProtocolVersion;
use crate::net::server_info::ServerInfoCache;
use crate::stats::dispatch::{ChatCallbacks, DispatchOutcome, RoundCallbacks};
use crate::stats::player_stats::PlayerStats;
use crate::stats::query::QueryError;
use crate::stats::store::RankColumn;
use crate::stats::worker::{StatsRequest, StatsWorker, WorkerError};
use crate::util::time::Clock;

/// Round errors
#[derive(Debug, thiserror::Error)]
pub enum RoundError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Team(#[from] TeamError),
    #[error(transparent)]
    Query(#[from] QueryError),
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// How a team change treats the current body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamChangeMode {
    /// Destroy the body first
    Forced,
    /// Leave the body alone; silent while the player is dead
    NoKill,
}

/// Who got credit for a death
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillCredit {
    /// An opponent scored the kill
    Kill { killer: ClientId, multi: u32 },
    /// A teammate killed the victim and lost a point
    TeamKill { killer: ClientId },
    /// Nobody to credit; the victim lost a point
    Suicide,
}

pub struct Round {
    config: ServerConfig,
    registry: PlayerRegistry,
    outbox: Outbox,
    server_info: ServerInfoCache,
    rules: Box<dyn RoundRules>,
    map: Box<dyn GameMap>,
    callbacks: Box<dyn RoundCallbacks + Send>,
    spam: ChatRateLimiter,
    worker: StatsWorker,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
    tick: u64,
    world_paused: bool,
}

impl Round {
    pub fn new(
        config: ServerConfig,
        rules: Box<dyn RoundRules>,
        map: Box<dyn GameMap>,
        worker: StatsWorker,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            registry: PlayerRegistry::new(config.max_clients),
            spam: ChatRateLimiter::new(config.chat_burst, config.chat_window_ticks),
            config,
            outbox: Outbox::new(),
            server_info: ServerInfoCache::new(),
            rules,
            map,
            callbacks: Box::new(ChatCallbacks),
            worker,
            clock,
            metrics,
            tick: 0,
            world_paused: false,
        }
    }

    /// Replace the consumers of structured query results
    pub fn with_callbacks(mut self, callbacks: Box<dyn RoundCallbacks + Send>) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Switch round policy, e.g. when warmup ends
    pub fn set_rules(&mut self, rules: Box<dyn RoundRules>) {
        self.rules = rules;
        self.server_info.expire();
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &PlayerRegistry {
        &self.registry
    }

    pub fn player(&self, client_id: ClientId) -> Option<&PlayerRecord> {
        self.registry.get(client_id)
    }

    pub fn player_mut(&mut self, client_id: ClientId) -> Option<&mut PlayerRecord> {
        self.registry.get_mut(client_id)
    }

    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    pub fn is_world_paused(&self) -> bool {
        self.world_paused
    }

    /// Server listing as JSON, rebuilt only after it was expired
    pub fn server_info_json(&mut self) -> serde_json::Result<String> {
        self.server_info
            .to_json(&self.registry, self.rules.is_team_play())
    }

    /// Seat a player and start loading their persisted stats
    pub fn connect(
        &mut self,
        client_id: ClientId,
        name: impl Into<String>,
        protocol: ProtocolVersion,
        team: Team,
    ) -> Result<(), RoundError> {
        let player = self
            .registry
            .connect(client_id, name, protocol, team, self.tick)?;
        player.spawning = player.wants_body();
        let name = player.name.clone();

        info!(client_id, %name, ?protocol, ?team, "Player joined");
        self.server_info.expire();
        self.update_gauges();

        // A failed profile load is not a reason to refuse the player
        if let Err(e) = self.submit(client_id, StatsRequest::LoadPlayerData { name }) {
            warn!(client_id, error = %e, "Could not load player stats");
        }
        Ok(())
    }

    pub fn disconnect(&mut self, client_id: ClientId) -> Result<Departure, RoundError> {
        let departure = self.registry.disconnect(client_id)?;

        if self.rules.is_stat_track() && !departure.stats.is_empty() {
            self.save(&departure.name, departure.stats.clone());
        }
        self.spam.forget(client_id);
        self.server_info.expire();
        self.update_gauges();

        info!(
            client_id,
            name = %departure.name,
            discarded = departure.discarded_results,
            redirected = departure.redirected,
            "Player left"
        );
        Ok(departure)
    }

    /// Advance every connected player by one tick
    pub fn tick(&mut self) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        {
            let mut env = TickEnv {
                tick: self.tick,
                world_paused: self.world_paused,
                ghost_cue: self.config.ghost_cue,
                rules: &*self.rules,
                map: &*self.map,
                outbox: &mut self.outbox,
                spam: &mut self.spam,
                callbacks: &mut *self.callbacks,
            };
            for player in self.registry.iter_mut() {
                events.extend(tick_player(player, &mut env));
            }
        }

        for event in &events {
            match event {
                PlayerEvent::QueryRouted {
                    outcome: DispatchOutcome::Dropped,
                    ..
                } => {
                    self.metrics.queries_failed.fetch_add(1, Ordering::Relaxed);
                }
                PlayerEvent::QueryRouted { .. } => {
                    self.metrics.queries_routed.fetch_add(1, Ordering::Relaxed);
                }
                PlayerEvent::Spawned { .. } => {
                    self.metrics.spawns.fetch_add(1, Ordering::Relaxed);
                }
                _ => {}
            }
        }

        self.metrics
            .stats_queue_depth
            .store(self.worker.queued() as u64, Ordering::Relaxed);
        self.tick += 1;
        self.update_gauges();
        events
    }

    /// Record a hit on `victim`. Credits environmental deaths later.
    pub fn on_hit(&mut self, victim: ClientId, attacker: Option<ClientId>) {
        let team_play = self.rules.is_team_play();
        self.registry
            .update_last_toucher(victim, attacker, team_play);
    }

    /// Kill `victim`'s body and settle score, streaks and multi-kills.
    ///
    /// `killer` of `None` (or the victim itself) falls back to the last
    /// toucher. Returns `None` when the victim had no live body.
    pub fn on_death(
        &mut self,
        victim: ClientId,
        killer: Option<ClientId>,
    ) -> Result<Option<KillCredit>, RoundError> {
        let stat_track = self.rules.is_stat_track();
        let team_play = self.rules.is_team_play();
        let respawn_delay = self.config.tick_rate as u64 / RESPAWN_DELAY_DIVISOR;

        let victim_player = self
            .registry
            .get(victim)
            .ok_or(RegistryError::NotConnected(victim))?;
        if !victim_player.has_live_body() {
            return Ok(None);
        }
        let victim_team = victim_player.team;
        let killer = killer
            .filter(|&k| k != victim)
            .or(victim_player.last_toucher)
            .and_then(|k| self.registry.get(k))
            .map(|k| (k.cid, k.name.clone(), k.team));

        let player = self
            .registry
            .get_mut(victim)
            .ok_or(RegistryError::NotConnected(victim))?;
        if let Some(body) = player.body.as_mut() {
            body.die();
        }
        player.is_dead = true;
        player.respawn_tick = self.tick + respawn_delay;
        player.last_toucher = None;
        add_deaths(player, 1, stat_track);
        end_spree(
            player,
            killer.as_ref().map(|(_, name, _)| name.as_str()),
            &mut self.outbox,
        );

        let credit = match killer {
            Some((killer_id, _, killer_team)) if team_play && killer_team == victim_team => {
                if let Some(player) = self.registry.get_mut(killer_id) {
                    add_score(player, -1, &*self.rules, &mut self.outbox);
                }
                KillCredit::TeamKill { killer: killer_id }
            }
            Some((killer_id, _, _)) => {
                let now = self.clock.now_secs();
                let train_mode = self.config.train_mode;
                let player = self
                    .registry
                    .get_mut(killer_id)
                    .ok_or(RegistryError::NotConnected(killer_id))?;
                add_kills(player, 1, stat_track);
                add_score(player, 1, &*self.rules, &mut self.outbox);
                add_spree(player, stat_track, &mut self.outbox);
                let multi = handle_multi(player, now, stat_track, train_mode, &mut self.outbox);
                self.metrics.kills.fetch_add(1, Ordering::Relaxed);
                KillCredit::Kill {
                    killer: killer_id,
                    multi,
                }
            }
            None => {
                if let Some(player) = self.registry.get_mut(victim) {
                    add_score(player, -1, &*self.rules, &mut self.outbox);
                }
                KillCredit::Suicide
            }
        };

        debug!(victim, ?credit, tick = self.tick, "Player died");
        self.server_info.expire();
        Ok(Some(credit))
    }

    /// Record a flag capture time. Only tracked rounds keep it.
    pub fn record_capture(&mut self, client_id: ClientId, time_ms: u32) -> Result<(), RoundError> {
        let stat_track = self.rules.is_stat_track();
        let player = self
            .registry
            .get_mut(client_id)
            .ok_or(RegistryError::NotConnected(client_id))?;
        if stat_track {
            player.stats.record_capture(time_ms);
        }
        Ok(())
    }

    /// Move a player to `team` without cooldown checks
    pub fn set_team(
        &mut self,
        client_id: ClientId,
        team: Team,
        mode: TeamChangeMode,
        announce: bool,
    ) -> Result<TeamChangeOutcome, RoundError> {
        let mut env = TeamEnv {
            tick: self.tick,
            config: &self.config,
            rules: &*self.rules,
            outbox: &mut self.outbox,
            server_info: &mut self.server_info,
        };
        let outcome = match mode {
            TeamChangeMode::Forced => {
                set_team_forced(&mut self.registry, client_id, team, announce, &mut env)?
            }
            TeamChangeMode::NoKill => {
                set_team_no_kill(&mut self.registry, client_id, team, announce, &mut env)?
            }
        };
        self.metrics.team_changes.fetch_add(1, Ordering::Relaxed);
        self.update_gauges();
        Ok(outcome)
    }

    /// Voluntary team change. Players with a body lose it, others keep
    /// waiting for a spawn in the new team.
    pub fn request_team(
        &mut self,
        client_id: ClientId,
        team: Team,
    ) -> Result<TeamChangeOutcome, RoundError> {
        check_cooldown(&self.registry, client_id, team, &self.config, self.tick)?;
        let mode = match self.registry.get(client_id) {
            Some(player) if player.body.is_some() => TeamChangeMode::Forced,
            _ => TeamChangeMode::NoKill,
        };
        self.set_team(client_id, team, mode, true)
    }

    /// Pause or resume a single player
    pub fn set_paused(&mut self, client_id: ClientId, paused: bool) -> Result<(), RoundError> {
        let tick = self.tick;
        let player = self
            .registry
            .get_mut(client_id)
            .ok_or(RegistryError::NotConnected(client_id))?;
        player.paused = paused;
        player.last_action_tick = tick;
        if player.body.is_none() {
            player.spawning = player.wants_body();
        }
        Ok(())
    }

    /// Freeze or resume the whole world
    pub fn set_world_paused(&mut self, paused: bool) {
        if self.world_paused != paused {
            info!(paused, tick = self.tick, "World pause toggled");
        }
        self.world_paused = paused;
    }

    /// Full stats of `requested`, or of the requester when `None`
    pub fn request_stats(
        &mut self,
        client_id: ClientId,
        requested: Option<&str>,
    ) -> Result<(), RoundError> {
        let requested = self.requested_name(client_id, requested)?;
        self.submit(client_id, StatsRequest::ShowStats { requested })
    }

    pub fn request_rank(
        &mut self,
        client_id: ClientId,
        requested: Option<&str>,
        column: RankColumn,
    ) -> Result<(), RoundError> {
        let requested = self.requested_name(client_id, requested)?;
        self.submit(client_id, StatsRequest::ShowRank { requested, column })
    }

    /// Leaderboard for `column`. Public listings go to everyone and count
    /// against the requester's chat budget.
    pub fn request_top(
        &mut self,
        client_id: ClientId,
        column: RankColumn,
        limit: usize,
        public: bool,
    ) -> Result<(), RoundError> {
        self.submit(
            client_id,
            StatsRequest::Top {
                column,
                limit,
                public,
            },
        )
    }

    /// Save tracked stats of everyone still connected and reset all counters.
    /// Returns how many saves were queued.
    pub fn end_round(&mut self) -> usize {
        let stat_track = self.rules.is_stat_track();
        let mut pending = Vec::new();
        for player in self.registry.iter_mut() {
            if stat_track && !player.stats.is_empty() {
                pending.push((player.name.clone(), player.stats.clone()));
            }
            reset_stats(player);
        }

        let saved = pending.len();
        for (name, stats) in pending {
            self.save(&name, stats);
        }
        self.server_info.expire();
        info!(tick = self.tick, saved, "Round ended");
        saved
    }

    /// Encode queued messages for every recipient
    pub fn flush(&mut self) -> Vec<Datagram> {
        let datagrams = self.outbox.flush(&self.registry);
        let bytes: usize = datagrams.iter().map(|d| d.bytes.len()).sum();
        self.metrics
            .messages_sent
            .fetch_add(datagrams.len() as u64, Ordering::Relaxed);
        self.metrics
            .bytes_sent
            .fetch_add(bytes as u64, Ordering::Relaxed);
        datagrams
    }

    /// Stop the stats workers after they finish queued jobs
    pub fn shutdown(self) {
        self.worker.shutdown();
    }

    fn requested_name(
        &self,
        client_id: ClientId,
        requested: Option<&str>,
    ) -> Result<String, RoundError> {
        let player = self
            .registry
            .get(client_id)
            .ok_or(RegistryError::NotConnected(client_id))?;
        Ok(requested.unwrap_or(&player.name).to_string())
    }

    /// Arm the request's lane on the requester and hand it to the workers
    fn submit(&mut self, client_id: ClientId, request: StatsRequest) -> Result<(), RoundError> {
        let completion = match request.lane() {
            Some(lane) => {
                let player = self
                    .registry
                    .get_mut(client_id)
                    .ok_or(RegistryError::NotConnected(client_id))?;
                match player.arm_query(lane) {
                    Ok(completion) => Some(completion),
                    Err(e) => {
                        self.metrics.queries_rejected.fetch_add(1, Ordering::Relaxed);
                        return Err(e.into());
                    }
                }
            }
            None => None,
        };

        // A refused job drops its completion, which fails the slot
        if let Err(e) = self.worker.submit(request, completion) {
            self.metrics.queries_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(e.into());
        }
        self.metrics.queries_submitted.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn save(&self, name: &str, stats: PlayerStats) {
        let request = StatsRequest::Save {
            name: name.to_string(),
            stats,
        };
        match self.worker.submit(request, None) {
            Ok(()) => {
                self.metrics.queries_submitted.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.metrics.queries_rejected.fetch_add(1, Ordering::Relaxed);
                warn!(%name, error = %e, "Could not queue stats save");
            }
        }
    }

    fn update_gauges(&self) {
        let mut connected = 0;
        let mut alive = 0;
        let mut spectating = 0;
        for player in self.registry.iter() {
            connected += 1;
            if player.has_live_body() {
                alive += 1;
            }
            if player.team.is_spectator() {
                spectating += 1;
            }
        }
        self.metrics.players_connected.store(connected, Ordering::Relaxed);
        self.metrics.players_alive.store(alive, Ordering::Relaxed);
        self.metrics
            .players_spectating
            .store(spectating, Ordering::Relaxed);
    }
}
