//! Service layer for the arena-lobby coordinator
//!
//! This module contains the main application state, the lobby entry points,
//! and health reporting for the production service.

pub mod app;
pub mod health;
pub mod lobbies;

pub use app::{AppState, ServiceError};
pub use health::{HealthCheck, HealthStatus};
pub use lobbies::{LobbyService, LobbyStats};
