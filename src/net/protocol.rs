//! Server-to-client messages and their per-protocol wire encodings
//!
//! Gameplay code queues one logical [`ServerMessage`]. At flush time the
//! [`MessageEncoder`] matching the recipient's negotiated [`ProtocolVersion`]
//! turns it into bytes. Legacy clients expect fixed-width integers and report
//! teams as plain numbers; modern clients use varints.

use serde::{Deserialize, Serialize};

use crate::game::player::{ClientId, Team};

/// Client protocol generation negotiated on connect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Older clients. No native warmup display, no dead-spectate mode.
    Legacy,
    /// Newer clients with dead-spectate mode and team-change cooldown display
    Modern,
}

impl ProtocolVersion {
    pub fn has_native_warmup(&self) -> bool {
        matches!(self, ProtocolVersion::Modern)
    }
}

/// Emoticons shown above a player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum Emoticon {
    Oop = 0,
    Exclamation = 1,
    Hearts = 2,
    Drop = 3,
    Dotdot = 4,
    Music = 5,
    Sorry = 6,
    Ghost = 7,
    Sushi = 8,
    Splattee = 9,
    Deviltee = 10,
    Zomg = 11,
    Zzz = 12,
    Wtf = 13,
    Eyes = 14,
    Question = 15,
}

/// Team assignment announcement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamChange {
    pub client_id: ClientId,
    /// Team shown to clients, which may differ from the stored team
    pub team: Team,
    /// Clients do not print a chat line for this change
    pub silent: bool,
    /// Tick before which the player may not change team again
    pub cooldown_tick: u64,
}

/// Messages from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// Chat line. `None` sender means the server itself.
    Chat {
        sender: Option<ClientId>,
        text: String,
    },
    /// HUD broadcast
    Broadcast { text: String },
    /// Team assignment changed
    TeamChange(TeamChange),
    /// Physics tuning for the zone the player is in
    TuneParams { zone: u8 },
    /// Emoticon bubble above a player
    Emoticon {
        client_id: ClientId,
        emoticon: Emoticon,
    },
}

impl ServerMessage {
    pub fn server_chat(text: impl Into<String>) -> Self {
        ServerMessage::Chat {
            sender: None,
            text: text.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Chat { .. } => "chat",
            ServerMessage::Broadcast { .. } => "broadcast",
            ServerMessage::TeamChange(_) => "team_change",
            ServerMessage::TuneParams { .. } => "tune_params",
            ServerMessage::Emoticon { .. } => "emoticon",
        }
    }
}

/// Legacy wire layout: every number is a fixed-width `i32`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LegacyPacket {
    Chat {
        team: i32,
        client_id: i32,
        message: String,
    },
    Broadcast {
        message: String,
    },
    SetTeam {
        client_id: i32,
        team: i32,
        silent: i32,
        cooldown_tick: i32,
    },
    TuneParams {
        zone: i32,
    },
    Emoticon {
        client_id: i32,
        emoticon: i32,
    },
}

/// Modern wire layout: compact integers, booleans as booleans
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ModernPacket {
    Chat {
        client_id: i16,
        message: String,
    },
    Broadcast {
        message: String,
    },
    Team {
        client_id: u16,
        team: i8,
        silent: bool,
        cooldown_tick: u64,
    },
    TuneParams {
        zone: u8,
    },
    Emoticon {
        client_id: u16,
        emoticon: u8,
    },
}

/// Chat channel value of an all-players message on the legacy protocol
const LEGACY_CHAT_ALL: i32 = 0;
/// Client id used for server-originated chat
const SERVER_CHAT_ID: i32 = -1;

/// Translates logical messages into one protocol's bytes
pub trait MessageEncoder: Send + Sync {
    fn protocol(&self) -> ProtocolVersion;

    fn encode(&self, message: &ServerMessage) -> Result<Vec<u8>, EncodeError>;
}

/// Encoder for [`ProtocolVersion::Legacy`]
#[derive(Debug, Default, Clone, Copy)]
pub struct LegacyEncoder;

impl LegacyEncoder {
    pub fn packet(message: &ServerMessage) -> Result<LegacyPacket, EncodeError> {
        Ok(match message {
            ServerMessage::Chat { sender, text } => LegacyPacket::Chat {
                team: LEGACY_CHAT_ALL,
                client_id: sender.map_or(Ok(SERVER_CHAT_ID), to_i32)?,
                message: text.clone(),
            },
            ServerMessage::Broadcast { text } => LegacyPacket::Broadcast {
                message: text.clone(),
            },
            ServerMessage::TeamChange(change) => LegacyPacket::SetTeam {
                client_id: to_i32(change.client_id)?,
                team: change.team.wire_value(),
                silent: change.silent as i32,
                // Legacy clients track the game tick as i32
                cooldown_tick: i32::try_from(change.cooldown_tick)
                    .map_err(|_| EncodeError::OutOfRange("cooldown_tick"))?,
            },
            ServerMessage::TuneParams { zone } => LegacyPacket::TuneParams { zone: *zone as i32 },
            ServerMessage::Emoticon {
                client_id,
                emoticon,
            } => LegacyPacket::Emoticon {
                client_id: to_i32(*client_id)?,
                emoticon: *emoticon as i32,
            },
        })
    }
}

impl MessageEncoder for LegacyEncoder {
    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::Legacy
    }

    fn encode(&self, message: &ServerMessage) -> Result<Vec<u8>, EncodeError> {
        let packet = Self::packet(message)?;
        bincode::serde::encode_to_vec(&packet, bincode::config::legacy())
            .map_err(|e| EncodeError::Serialize(e.to_string()))
    }
}

/// Encoder for [`ProtocolVersion::Modern`]
#[derive(Debug, Default, Clone, Copy)]
pub struct ModernEncoder;

impl ModernEncoder {
    pub fn packet(message: &ServerMessage) -> Result<ModernPacket, EncodeError> {
        Ok(match message {
            ServerMessage::Chat { sender, text } => ModernPacket::Chat {
                client_id: match sender {
                    Some(cid) => {
                        i16::try_from(*cid).map_err(|_| EncodeError::OutOfRange("client_id"))?
                    }
                    None => SERVER_CHAT_ID as i16,
                },
                message: text.clone(),
            },
            ServerMessage::Broadcast { text } => ModernPacket::Broadcast {
                message: text.clone(),
            },
            ServerMessage::TeamChange(change) => ModernPacket::Team {
                client_id: to_u16(change.client_id)?,
                team: change.team.wire_value() as i8,
                silent: change.silent,
                cooldown_tick: change.cooldown_tick,
            },
            ServerMessage::TuneParams { zone } => ModernPacket::TuneParams { zone: *zone },
            ServerMessage::Emoticon {
                client_id,
                emoticon,
            } => ModernPacket::Emoticon {
                client_id: to_u16(*client_id)?,
                emoticon: *emoticon as u8,
            },
        })
    }
}

impl MessageEncoder for ModernEncoder {
    fn protocol(&self) -> ProtocolVersion {
        ProtocolVersion::Modern
    }

    fn encode(&self, message: &ServerMessage) -> Result<Vec<u8>, EncodeError> {
        let packet = Self::packet(message)?;
        bincode::serde::encode_to_vec(&packet, bincode::config::standard())
            .map_err(|e| EncodeError::Serialize(e.to_string()))
    }
}

static LEGACY: LegacyEncoder = LegacyEncoder;
static MODERN: ModernEncoder = ModernEncoder;

/// Encoder for a negotiated protocol
pub fn encoder_for(protocol: ProtocolVersion) -> &'static dyn MessageEncoder {
    match protocol {
        ProtocolVersion::Legacy => &LEGACY,
        ProtocolVersion::Modern => &MODERN,
    }
}

/// Decode a legacy packet (tools and tests)
pub fn decode_legacy(data: &[u8]) -> Result<LegacyPacket, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::legacy())
        .map(|(packet, _)| packet)
        .map_err(|e| DecodeError(e.to_string()))
}

/// Decode a modern packet (tools and tests)
pub fn decode_modern(data: &[u8]) -> Result<ModernPacket, DecodeError> {
    bincode::serde::decode_from_slice(data, bincode::config::standard())
        .map(|(packet, _)| packet)
        .map_err(|e| DecodeError(e.to_string()))
}

fn to_i32(cid: ClientId) -> Result<i32, EncodeError> {
    i32::try_from(cid).map_err(|_| EncodeError::OutOfRange("client_id"))
}

fn to_u16(cid: ClientId) -> Result<u16, EncodeError> {
    u16::try_from(cid).map_err(|_| EncodeError::OutOfRange("client_id"))
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EncodeError {
    #[error("Encode error: {0}")]
    Serialize(String),
    #[error("Field {0} does not fit the wire format")]
    OutOfRange(&'static str),
}

#[derive(Debug, thiserror::Error)]
#[error("Decode error: {0}")]
pub struct DecodeError(String);
