//! Arena Lobby - matchmaking lobby coordinator
//!
//! This crate groups connected sessions into lobbies, elects a manager per
//! lobby, launches a dedicated game-server worker when the manager starts the
//! game, tracks the worker's health and disposes lobbies left without a
//! manager.

pub mod auth;
pub mod config;
pub mod error;
pub mod http;
pub mod lobby;
pub mod metrics;
pub mod service;
pub mod transport;
pub mod types;
pub mod utils;
pub mod worker;

// Re-export commonly used types and traits
pub use error::{LobbyError, Result};
pub use types::*;

// Re-export key components
pub use lobby::{LobbyHandle, LobbyRegistry, LobbyRuntime};
pub use transport::{ChannelTransport, LobbyTransport};
pub use worker::{ProcessWorkerLauncher, WorkerLauncher};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
