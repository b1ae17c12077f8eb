//! Configuration management for the arena-lobby service
//!
//! This module handles all configuration loading from environment variables
//! and TOML files, validation, and default values for the coordinator.

pub mod app;
pub mod lobby;

// Re-export commonly used types
pub use app::{
    parse_launch_args, validate_config, AppConfig, LobbySettings, ServiceSettings, WorkerSettings,
};
pub use lobby::LobbyOptions;
