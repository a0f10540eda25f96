//! Outgoing message queue
//!
//! Gameplay code queues logical messages during a tick. [`Outbox::flush`]
//! encodes each one at most once per protocol and fans it out to the
//! recipients' connection slots.

use tracing::warn;

use crate::game::player::ClientId;
use crate::game::registry::PlayerRegistry;
use crate::net::protocol::{encoder_for, ProtocolVersion, ServerMessage};

/// Who a queued message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    All,
    Client(ClientId),
}

/// Queued message
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub recipient: Recipient,
    pub message: ServerMessage,
}

/// Encoded bytes for one connection
#[derive(Debug, Clone, PartialEq)]
pub struct Datagram {
    pub client_id: ClientId,
    pub bytes: Vec<u8>,
}

/// Per-tick queue of server messages
#[derive(Debug, Default)]
pub struct Outbox {
    queue: Vec<Outgoing>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send_to(&mut self, client_id: ClientId, message: ServerMessage) {
        self.queue.push(Outgoing {
            recipient: Recipient::Client(client_id),
            message,
        });
    }

    pub fn send_all(&mut self, message: ServerMessage) {
        self.queue.push(Outgoing {
            recipient: Recipient::All,
            message,
        });
    }

    /// Private server chat line
    pub fn chat_to(&mut self, client_id: ClientId, text: impl Into<String>) {
        self.send_to(client_id, ServerMessage::server_chat(text));
    }

    /// Public server chat line
    pub fn chat_all(&mut self, text: impl Into<String>) {
        self.send_all(ServerMessage::server_chat(text));
    }

    /// HUD broadcast to one client
    pub fn broadcast_to(&mut self, client_id: ClientId, text: impl Into<String>) {
        self.send_to(client_id, ServerMessage::Broadcast { text: text.into() });
    }

    pub fn messages(&self) -> &[Outgoing] {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }

    /// Queued messages a given client would receive
    pub fn messages_for(&self, client_id: ClientId) -> impl Iterator<Item = &ServerMessage> {
        self.queue.iter().filter_map(move |o| match o.recipient {
            Recipient::All => Some(&o.message),
            Recipient::Client(cid) if cid == client_id => Some(&o.message),
            Recipient::Client(_) => None,
        })
    }

    /// Encode and address everything queued. Messages for disconnected
    /// clients are dropped; encoding failures are logged and skipped.
    pub fn flush(&mut self, registry: &PlayerRegistry) -> Vec<Datagram> {
        let mut datagrams = Vec::with_capacity(self.queue.len());

        for outgoing in self.queue.drain(..) {
            let mut legacy: Option<Option<Vec<u8>>> = None;
            let mut modern: Option<Option<Vec<u8>>> = None;

            let recipients: Vec<(ClientId, ProtocolVersion)> = match outgoing.recipient {
                Recipient::All => registry.iter().map(|p| (p.cid, p.protocol)).collect(),
                Recipient::Client(cid) => registry
                    .get(cid)
                    .map(|p| (p.cid, p.protocol))
                    .into_iter()
                    .collect(),
            };

            for (client_id, protocol) in recipients {
                let cache = match protocol {
                    ProtocolVersion::Legacy => &mut legacy,
                    ProtocolVersion::Modern => &mut modern,
                };
                let encoded = cache.get_or_insert_with(|| {
                    match encoder_for(protocol).encode(&outgoing.message) {
                        Ok(bytes) => Some(bytes),
                        Err(e) => {
                            warn!(
                                kind = outgoing.message.kind(),
                                ?protocol,
                                error = %e,
                                "Dropping unencodable message"
                            );
                            None
                        }
                    }
                });
                if let Some(bytes) = encoded {
                    datagrams.push(Datagram {
                        client_id,
                        bytes: bytes.clone(),
                    });
                }
            }
        }

        datagrams
    }
}
