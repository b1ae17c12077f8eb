//! Main application configuration
//!
//! This module defines the primary configuration structures for the arena-lobby
//! coordinator, including environment variable loading and validation.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub lobby: LobbySettings,
    pub worker: WorkerSettings,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Host the HTTP front door binds to
    pub http_host: String,
    /// Port for lobby lookups, worker callbacks and metrics
    pub http_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Per-lobby timing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbySettings {
    /// Grace period before a lobby without manager is disposed
    pub no_manager_dispose_delay_ms: u64,
    /// Fixed simulation step of every lobby
    pub tick_interval_ms: u64,
    /// How long a running worker is assumed healthy without a ping
    pub worker_health_timeout_ms: u64,
    /// Capacity of each lobby's command channel
    pub command_buffer: usize,
    /// Kill a lobby's worker when the lobby is disposed
    pub terminate_workers_on_dispose: bool,
    /// Reject joins that carry no login token
    pub require_login_token: bool,
}

/// Worker (game-server) launch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Executable started for every game
    pub exe_path: PathBuf,
    /// Extra arguments placed before the generated ones
    pub extra_args: Vec<String>,
    /// Flag carrying the lobby id
    pub room_id_flag: String,
    /// Optional flag carrying the address the worker should bind
    pub address_flag: Option<String>,
    /// Value for `address_flag`
    pub address: Option<String>,
    /// Flag carrying the allocated port
    pub port_flag: String,
    /// First port handed out by the registry
    pub starting_port: u16,
    /// Directory for per-launch worker output; discarded when unset
    pub log_dir: Option<PathBuf>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "arena-lobby".to_string(),
            log_level: "info".to_string(),
            http_host: "0.0.0.0".to_string(),
            http_port: 2567,
            shutdown_timeout_seconds: 10,
        }
    }
}

impl Default for LobbySettings {
    fn default() -> Self {
        Self {
            no_manager_dispose_delay_ms: 5000,
            tick_interval_ms: 50,
            worker_health_timeout_ms: 30_000,
            command_buffer: 64,
            terminate_workers_on_dispose: false,
            require_login_token: false,
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            exe_path: PathBuf::from("./game-server"),
            extra_args: Vec::new(),
            room_id_flag: "--roomId".to_string(),
            address_flag: None,
            address: None,
            port_flag: "--port".to_string(),
            starting_port: 7770,
            log_dir: None,
        }
    }
}

fn parse_env<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| anyhow!("Invalid {} value: {}", name, value)),
        Err(_) => Ok(None),
    }
}

/// Parse the JSON-encoded extra argument list (`["--foo", "bar"]`)
pub fn parse_launch_args(raw: &str) -> Result<Vec<String>> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
        .map_err(|e| anyhow!("Invalid EXE_LAUNCH_ARGS value (expected JSON string array): {}", e))
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(host) = env::var("HTTP_HOST") {
            config.service.http_host = host;
        }
        if let Some(port) = parse_env("HTTP_PORT")? {
            config.service.http_port = port;
        }
        if let Some(timeout) = parse_env("SHUTDOWN_TIMEOUT_SECONDS")? {
            config.service.shutdown_timeout_seconds = timeout;
        }

        // Lobby settings
        if let Some(delay) = parse_env("NO_MANAGER_DISPOSE_DELAY")? {
            config.lobby.no_manager_dispose_delay_ms = delay;
        }
        if let Some(interval) = parse_env("TICK_INTERVAL_MS")? {
            config.lobby.tick_interval_ms = interval;
        }
        if let Some(timeout) = parse_env("WORKER_HEALTH_TIMEOUT")? {
            config.lobby.worker_health_timeout_ms = timeout;
        }
        if let Some(buffer) = parse_env("LOBBY_COMMAND_BUFFER")? {
            config.lobby.command_buffer = buffer;
        }
        if let Some(terminate) = parse_env("TERMINATE_WORKERS_ON_DISPOSE")? {
            config.lobby.terminate_workers_on_dispose = terminate;
        }
        if let Some(require) = parse_env("REQUIRE_LOGIN_TOKEN")? {
            config.lobby.require_login_token = require;
        }

        // Worker settings
        if let Ok(path) = env::var("EXE_PATH") {
            config.worker.exe_path = PathBuf::from(path);
        }
        if let Ok(args) = env::var("EXE_LAUNCH_ARGS") {
            config.worker.extra_args = parse_launch_args(&args)?;
        }
        if let Ok(flag) = env::var("ROOM_ID_FLAG") {
            config.worker.room_id_flag = flag;
        }
        if let Ok(flag) = env::var("ADDRESS_FLAG") {
            config.worker.address_flag = Some(flag);
        }
        if let Ok(address) = env::var("WORKER_ADDRESS") {
            config.worker.address = Some(address);
        }
        if let Ok(flag) = env::var("PORT_FLAG") {
            config.worker.port_flag = flag;
        }
        if let Some(port) = parse_env("STARTING_PORT")? {
            config.worker.starting_port = port;
        }
        if let Ok(dir) = env::var("WORKER_LOG_DIR") {
            config.worker.log_dir = Some(PathBuf::from(dir));
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file; missing keys fall back to defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = Self::from_toml_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(raw)?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

impl LobbySettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn no_manager_dispose_delay(&self) -> Duration {
        Duration::from_millis(self.no_manager_dispose_delay_ms)
    }

    pub fn worker_health_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_health_timeout_ms)
    }
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }

    // Validate lobby timing
    if config.lobby.tick_interval_ms == 0 {
        return Err(anyhow!("Tick interval must be greater than 0"));
    }
    if config.lobby.no_manager_dispose_delay_ms == 0 {
        return Err(anyhow!("No-manager dispose delay must be greater than 0"));
    }
    if config.lobby.worker_health_timeout_ms == 0 {
        return Err(anyhow!("Worker health timeout must be greater than 0"));
    }
    if config.lobby.command_buffer == 0 {
        return Err(anyhow!("Lobby command buffer must be greater than 0"));
    }

    // Validate worker launch settings
    if config.worker.exe_path.as_os_str().is_empty() {
        return Err(anyhow!("Worker executable path cannot be empty"));
    }
    if config.worker.room_id_flag.is_empty() {
        return Err(anyhow!("Room id flag cannot be empty"));
    }
    if config.worker.port_flag.is_empty() {
        return Err(anyhow!("Port flag cannot be empty"));
    }
    if config.worker.address_flag.is_some() != config.worker.address.is_some() {
        return Err(anyhow!(
            "Worker address flag and address must be configured together"
        ));
    }
    if config.worker.starting_port == 0 {
        return Err(anyhow!("Starting port cannot be 0"));
    }

    Ok(())
}
