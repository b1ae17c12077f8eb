//! Common types used throughout the lobby coordinator

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Unique identifier for lobbies
pub type LobbyId = String;

/// Unique identifier of one client connection inside a lobby
pub type SessionId = String;

/// Player status slot carried by every member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberStatus {
    #[default]
    None,
}

/// One connected participant of a lobby
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub session_id: SessionId,
    pub id: String,
    pub name: String,
    /// 0 means "unassigned"
    pub team: u8,
    #[serde(rename = "state")]
    pub status: MemberStatus,
}

impl Member {
    pub fn new(session_id: impl Into<SessionId>, options: &JoinOptions) -> Self {
        Self {
            session_id: session_id.into(),
            id: options.id.clone(),
            name: options.name.clone(),
            team: 0,
            status: MemberStatus::None,
        }
    }
}

/// Options a client supplies when joining a lobby
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinOptions {
    pub id: String,
    pub name: String,
    pub login_token: Option<String>,
}

/// Lifecycle of the lobby itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LifecycleState {
    /// A valid manager is present
    Running,
    /// No manager; the dispose countdown is running
    Stopping,
    /// Terminal; members disconnected and lobby disposed
    Stopped,
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleState::Running => write!(f, "Running"),
            LifecycleState::Stopping => write!(f, "Stopping"),
            LifecycleState::Stopped => write!(f, "Stopped"),
        }
    }
}

/// State of the worker (game-server) process attached to a lobby
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WorkerState {
    #[default]
    None,
    Starting,
    Running,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::None => write!(f, "None"),
            WorkerState::Starting => write!(f, "Starting"),
            WorkerState::Running => write!(f, "Running"),
        }
    }
}

/// Public description of a lobby, served by the HTTP front door
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LobbyInfo {
    #[serde(rename = "roomId")]
    pub lobby_id: LobbyId,
    #[serde(rename = "roomName")]
    pub name: String,
    #[serde(rename = "maxClients")]
    pub max_clients: usize,
    #[serde(rename = "maxTeams")]
    pub max_teams: u8,
    pub annotations: BTreeMap<String, String>,
}

/// Lobby-visible metadata handed to the real-time transport at creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyMetadata {
    pub title: String,
    pub annotations: BTreeMap<String, String>,
    pub has_password: bool,
}

/// Messages a connected client may send to its lobby
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    StartGame { payload: Value },
}

impl ClientMessage {
    pub const START_GAME: &'static str = "startGame";

    /// Build a message from its transport type tag, `None` for unknown tags
    pub fn parse(kind: &str, payload: Value) -> Option<Self> {
        match kind {
            Self::START_GAME => Some(ClientMessage::StartGame { payload }),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::StartGame { .. } => Self::START_GAME,
        }
    }
}

/// Read-only view of one lobby's mutable state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub lobby_id: LobbyId,
    pub members: Vec<Member>,
    pub manager_session_id: Option<SessionId>,
    pub lifecycle: LifecycleState,
    pub worker_state: WorkerState,
    pub worker_pid: Option<u32>,
}
