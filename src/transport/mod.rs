//! Boundary to the real-time transport that carries lobby traffic to clients
//!
//! The coordinator only talks outward through [`LobbyTransport`]. Every call is
//! fire-and-forget: delivery happens asynchronously on the transport's side.

use crate::types::{LobbyId, LobbyMetadata};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

/// Outward calls a lobby makes to its connected clients
pub trait LobbyTransport: Send + Sync {
    /// Publish lobby-visible metadata; called once at creation
    fn set_metadata(&self, lobby_id: &str, metadata: LobbyMetadata);

    /// Send an event to every member of the lobby
    fn broadcast(&self, lobby_id: &str, event: &str, payload: Value);

    /// Close every client connection of the lobby. The transport answers
    /// with a leave for each member it closes.
    fn disconnect_all(&self, lobby_id: &str);
}

/// One outward call, as seen by a transport gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum TransportEvent {
    Metadata {
        lobby_id: LobbyId,
        metadata: LobbyMetadata,
    },
    Broadcast {
        lobby_id: LobbyId,
        event: String,
        payload: Value,
    },
    DisconnectAll {
        lobby_id: LobbyId,
    },
}

impl TransportEvent {
    pub fn lobby_id(&self) -> &str {
        match self {
            TransportEvent::Metadata { lobby_id, .. }
            | TransportEvent::Broadcast { lobby_id, .. }
            | TransportEvent::DisconnectAll { lobby_id } => lobby_id,
        }
    }
}

/// Transport that republishes every call on a broadcast channel.
///
/// A real-time gateway subscribes and forwards the events to its sockets.
/// With no subscriber attached, events are dropped.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: broadcast::Sender<TransportEvent>,
}

impl ChannelTransport {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: TransportEvent) {
        if self.sender.send(event).is_err() {
            debug!("No transport gateway attached, event dropped");
        }
    }
}

impl Default for ChannelTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl LobbyTransport for ChannelTransport {
    fn set_metadata(&self, lobby_id: &str, metadata: LobbyMetadata) {
        self.publish(TransportEvent::Metadata {
            lobby_id: lobby_id.to_string(),
            metadata,
        });
    }

    fn broadcast(&self, lobby_id: &str, event: &str, payload: Value) {
        self.publish(TransportEvent::Broadcast {
            lobby_id: lobby_id.to_string(),
            event: event.to_string(),
            payload,
        });
    }

    fn disconnect_all(&self, lobby_id: &str) {
        self.publish(TransportEvent::DisconnectAll {
            lobby_id: lobby_id.to_string(),
        });
    }
}
