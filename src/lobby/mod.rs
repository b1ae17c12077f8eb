//! Lobby coordination
//!
//! A lobby is a group of connected sessions with one elected manager. The
//! manager may launch a game-server worker; the lobby tracks that worker and
//! disposes itself once it has been without a manager for too long.

pub mod controller;
pub mod election;
pub mod members;
pub mod registry;
pub mod runtime;

// Re-export commonly used types
pub use controller::{events, LobbyContext, LobbyController, LobbyEvent, StartGameOutcome};
pub use election::ManagerElection;
pub use members::MemberSet;
pub use registry::LobbyRegistry;
pub use runtime::{LobbyCommand, LobbyHandle, LobbyRuntime};
