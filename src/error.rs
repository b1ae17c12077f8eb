//! Error types for the lobby coordinator
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific lobby scenarios
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    #[error("Lobby not found: {lobby_id}")]
    LobbyNotFound { lobby_id: String },

    #[error("Lobby is full: {lobby_id}")]
    LobbyFull { lobby_id: String },

    #[error("Lobby is closed: {lobby_id}")]
    LobbyClosed { lobby_id: String },

    #[error("Invalid join request: {reason}")]
    InvalidJoin { reason: String },

    #[error("Invalid lobby options: {reason}")]
    InvalidLobbyOptions { reason: String },

    #[error("Login rejected for session {session_id}")]
    LoginRejected { session_id: String },

    #[error("Worker port range exhausted (next port would be {next_port})")]
    PortsExhausted { next_port: u32 },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl LobbyError {
    /// Short machine-readable label, used for metrics and HTTP error bodies
    pub fn kind(&self) -> &'static str {
        match self {
            LobbyError::LobbyNotFound { .. } => "not_found",
            LobbyError::LobbyFull { .. } => "full",
            LobbyError::LobbyClosed { .. } => "closed",
            LobbyError::InvalidJoin { .. } => "invalid_join",
            LobbyError::InvalidLobbyOptions { .. } => "invalid_options",
            LobbyError::LoginRejected { .. } => "login_rejected",
            LobbyError::PortsExhausted { .. } => "ports_exhausted",
            LobbyError::InternalError { .. } => "internal",
        }
    }
}
