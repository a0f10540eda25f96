//! Per-tick body lifecycle
//!
//! Runs once per tick for every connected player, in a fixed order:
//! drain finished queries, then (unless the world is paused) advance the
//! body state machine, then refresh the tune zone and cosmetic timers.

use smallvec::SmallVec;
use tracing::{debug, trace};

use crate::game::constants::cosmetics::{GHOST_CYCLE_TICKS, GHOST_WINDOW_TICKS};
use crate::game::player::{Body, ClientId, PlayerRecord};
use crate::game::rules::{GameMap, RoundRules};
use crate::game::spam::SpamGuard;
use crate::net::outbox::Outbox;
use crate::net::protocol::{Emoticon, ServerMessage};
use crate::stats::dispatch::{dispatch, DispatchEnv, DispatchOutcome, RoundCallbacks};
use crate::util::vec2::Vec2;

/// Everything a player tick reads or writes besides the player itself
pub struct TickEnv<'a> {
    pub tick: u64,
    pub world_paused: bool,
    pub ghost_cue: bool,
    pub rules: &'a dyn RoundRules,
    pub map: &'a dyn GameMap,
    pub outbox: &'a mut Outbox,
    pub spam: &'a mut dyn SpamGuard,
    pub callbacks: &'a mut dyn RoundCallbacks,
}

/// Observable outcome of a player tick
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    QueryRouted {
        client_id: ClientId,
        outcome: DispatchOutcome,
    },
    BodyDestroyed {
        client_id: ClientId,
    },
    Spawned {
        client_id: ClientId,
        position: Vec2,
    },
    ZoneChanged {
        client_id: ClientId,
        zone: u8,
    },
}

pub type PlayerEvents = SmallVec<[PlayerEvent; 4]>;

/// Advance one player by one tick
pub fn tick_player(player: &mut PlayerRecord, env: &mut TickEnv<'_>) -> PlayerEvents {
    let mut events = PlayerEvents::new();

    // Results first so stats changed this tick are visible to later logic
    for result in player.drain_completed_queries() {
        let mut dispatch_env = DispatchEnv {
            tick: env.tick,
            outbox: &mut *env.outbox,
            spam: &mut *env.spam,
            callbacks: &mut *env.callbacks,
        };
        let outcome = dispatch(player, result, &mut dispatch_env);
        events.push(PlayerEvent::QueryRouted {
            client_id: player.cid,
            outcome,
        });
    }

    if env.world_paused {
        // Shift the timers so cooldowns measured against them stay put
        player.join_tick += 1;
        player.last_action_tick += 1;
        player.last_set_team_tick += 1;
        return events;
    }

    advance_body(player, env, &mut events);
    refresh_tune_zone(player, env, &mut events);
    tick_cosmetics(player, env);

    events
}

fn advance_body(player: &mut PlayerRecord, env: &mut TickEnv<'_>, events: &mut PlayerEvents) {
    if player.body.is_none() {
        player.spawning = player.wants_body();
    }

    let paused = player.paused;
    match player.body.as_mut() {
        Some(body) if body.is_alive() => {
            body.set_paused(paused);
            if !paused {
                player.view_pos = body.position;
            }
        }
        Some(body) if !body.is_paused() => {
            player.body = None;
            // A destroyed body leaves the player waiting for a new one
            player.spawning = player.wants_body();
            trace!(client_id = player.cid, tick = env.tick, "Body destroyed");
            events.push(PlayerEvent::BodyDestroyed {
                client_id: player.cid,
            });
        }
        Some(_) => {}
        None if player.spawning && !player.weak_hook_hold => {
            if let Some(position) = try_respawn(player, env) {
                events.push(PlayerEvent::Spawned {
                    client_id: player.cid,
                    position,
                });
            }
        }
        None => {}
    }
}

/// Grant a body if the delay has passed, the rules allow it and the map has
/// room. Refusal leaves `spawning` set so the next tick tries again.
fn try_respawn(player: &mut PlayerRecord, env: &TickEnv<'_>) -> Option<Vec2> {
    if env.tick < player.respawn_tick {
        return None;
    }
    if !env.rules.can_spawn(player, env.tick) {
        return None;
    }
    let position = env.map.spawn_point(player.team)?;

    player.body = Some(Body::spawn(position, env.tick));
    player.spawning = false;
    player.is_dead = false;
    player.view_pos = position;
    debug!(client_id = player.cid, tick = env.tick, "Player spawned");
    Some(position)
}

fn refresh_tune_zone(player: &mut PlayerRecord, env: &mut TickEnv<'_>, events: &mut PlayerEvents) {
    let zone = env.map.tune_zone_at(player.view_pos);
    if zone == player.tune_zone {
        return;
    }
    player.tune_zone = zone;
    env.outbox
        .send_to(player.cid, ServerMessage::TuneParams { zone });
    events.push(PlayerEvent::ZoneChanged {
        client_id: player.cid,
        zone,
    });
}

fn tick_cosmetics(player: &mut PlayerRecord, env: &mut TickEnv<'_>) {
    if player
        .override_emote
        .is_some_and(|(_, until)| until <= env.tick)
    {
        player.override_emote = None;
    }

    if !env.ghost_cue {
        return;
    }
    if let Some(body) = player.body.as_ref().filter(|b| !b.is_paused()) {
        if ghost_cue_due(env.tick, body.last_action_tick) {
            env.outbox.send_all(ServerMessage::Emoticon {
                client_id: player.cid,
                emoticon: Emoticon::Ghost,
            });
        }
    }
}

/// Fires during the last few ticks of every idle cycle
pub fn ghost_cue_due(tick: u64, last_action_tick: u64) -> bool {
    let idle = tick.wrapping_sub(last_action_tick) % GHOST_CYCLE_TICKS;
    GHOST_CYCLE_TICKS - idle < GHOST_WINDOW_TICKS
}
