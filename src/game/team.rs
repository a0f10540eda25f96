//! Team reassignment
//!
//! Two entry points share the bookkeeping. [`set_team_forced`] takes the body
//! away first. [`set_team_no_kill`] is for players who have no body to lose
//! and stays quiet while the player is dead, so modern clients keep their
//! dead-spectate view.

use tracing::{debug, info};

use crate::config::ServerConfig;
use crate::game::constants::round::RESPAWN_DELAY_DIVISOR;
use crate::game::player::{ClientId, SpectatorTarget, Team};
use crate::game::registry::{PlayerRegistry, RegistryError};
use crate::game::rules::RoundRules;
use crate::net::outbox::Outbox;
use crate::net::protocol::{ServerMessage, TeamChange};
use crate::net::server_info::ServerInfoCache;

/// Team change errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TeamError {
    #[error("Team change on cooldown for {remaining_ticks} more ticks")]
    Cooldown { remaining_ticks: u64 },
    #[error("Already in team {0:?}")]
    SameTeam(Team),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Collaborators of a team change
pub struct TeamEnv<'a> {
    pub tick: u64,
    pub config: &'a ServerConfig,
    pub rules: &'a dyn RoundRules,
    pub outbox: &'a mut Outbox,
    pub server_info: &'a mut ServerInfoCache,
}

/// Result of a team change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TeamChangeOutcome {
    /// A team packet was queued
    pub announced: bool,
    /// Spectators of this player moved to free view
    pub redirected: usize,
    pub cooldown_tick: u64,
}

/// Move a player, destroying the current body unconditionally
pub fn set_team_forced(
    registry: &mut PlayerRegistry,
    client_id: ClientId,
    team: Team,
    announce: bool,
    env: &mut TeamEnv<'_>,
) -> Result<TeamChangeOutcome, TeamError> {
    let player = registry
        .get_mut(client_id)
        .ok_or(RegistryError::NotConnected(client_id))?;
    if player.destroy_body() {
        debug!(client_id, "Body removed by team change");
    }

    let cooldown_tick = assign(registry, client_id, team, env)?;
    let player = registry
        .get(client_id)
        .ok_or(RegistryError::NotConnected(client_id))?;

    env.outbox.send_all(ServerMessage::TeamChange(TeamChange {
        client_id,
        team: env.rules.displayed_team(player),
        silent: !announce,
        cooldown_tick,
    }));

    finish(registry, client_id, team, cooldown_tick, true, env)
}

/// Move a player without touching the body. No packet is sent while the
/// player is dead.
pub fn set_team_no_kill(
    registry: &mut PlayerRegistry,
    client_id: ClientId,
    team: Team,
    announce: bool,
    env: &mut TeamEnv<'_>,
) -> Result<TeamChangeOutcome, TeamError> {
    let cooldown_tick = assign(registry, client_id, team, env)?;
    let player = registry
        .get(client_id)
        .ok_or(RegistryError::NotConnected(client_id))?;

    let announced = !player.is_dead;
    if announced {
        env.outbox.send_all(ServerMessage::TeamChange(TeamChange {
            client_id,
            team: player.team,
            silent: !announce,
            cooldown_tick,
        }));
    }

    finish(registry, client_id, team, cooldown_tick, announced, env)
}

/// Refuse a voluntary change before the previous one cooled down
pub fn check_cooldown(
    registry: &PlayerRegistry,
    client_id: ClientId,
    team: Team,
    config: &ServerConfig,
    tick: u64,
) -> Result<(), TeamError> {
    let player = registry
        .get(client_id)
        .ok_or(RegistryError::NotConnected(client_id))?;
    if player.team == team {
        return Err(TeamError::SameTeam(team));
    }
    let ready = config.team_change_cooldown_tick(player.last_set_team_tick);
    if tick < ready {
        return Err(TeamError::Cooldown {
            remaining_ticks: ready - tick,
        });
    }
    Ok(())
}

fn assign(
    registry: &mut PlayerRegistry,
    client_id: ClientId,
    team: Team,
    env: &TeamEnv<'_>,
) -> Result<u64, TeamError> {
    registry.set_spectator_target(client_id, SpectatorTarget::FreeView)?;

    let player = registry
        .get_mut(client_id)
        .ok_or(RegistryError::NotConnected(client_id))?;
    player.team = team;
    player.last_set_team_tick = env.tick;
    player.last_action_tick = env.tick;
    player.respawn_tick = env.tick + env.config.tick_rate as u64 / RESPAWN_DELAY_DIVISOR;
    if player.body.is_none() {
        player.spawning = player.wants_body();
    }

    Ok(env.config.team_change_cooldown_tick(player.last_set_team_tick))
}

fn finish(
    registry: &mut PlayerRegistry,
    client_id: ClientId,
    team: Team,
    cooldown_tick: u64,
    announced: bool,
    env: &mut TeamEnv<'_>,
) -> Result<TeamChangeOutcome, TeamError> {
    let redirected = if team.is_spectator() {
        registry.redirect_spectators_to_free_view(client_id)
    } else {
        0
    };
    env.server_info.expire();

    info!(client_id, ?team, announced, redirected, "Team changed");
    Ok(TeamChangeOutcome {
        announced,
        redirected,
        cooldown_tick,
    })
}
