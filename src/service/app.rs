//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the lobby registry,
//! worker launcher, transport and HTTP front door together and owns the
//! background tasks.

use crate::auth::{AcceptAllValidator, LoginValidator, TokenRequiredValidator};
use crate::config::{validate_config, AppConfig};
use crate::http::{ApiServer, ApiServerConfig};
use crate::lobby::{LobbyContext, LobbyRegistry};
use crate::metrics::MetricsCollector;
use crate::service::lobbies::LobbyService;
use crate::transport::ChannelTransport;
use crate::worker::{ProcessWorkerLauncher, WorkerLauncher};
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Service-level errors
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Service initialization error: {message}")]
    Initialization { message: String },

    #[error("HTTP server error: {message}")]
    Http { message: String },

    #[error("Background task error: {message}")]
    BackgroundTask { message: String },
}

/// Main application state containing all service components
pub struct AppState {
    config: AppConfig,

    /// Entry point for everything addressed to a lobby
    lobbies: LobbyService,

    /// Outbound lobby events for the real-time gateway
    transport: Arc<ChannelTransport>,

    metrics: Arc<MetricsCollector>,

    /// Background task handles
    background_tasks: Mutex<Vec<JoinHandle<()>>>,

    server_task: Mutex<Option<JoinHandle<()>>>,
    server_shutdown: Mutex<Option<broadcast::Sender<()>>>,
    local_addr: OnceLock<SocketAddr>,

    is_running: Arc<RwLock<bool>>,
    started_at: Instant,
}

impl AppState {
    /// Initialize the application with the process launcher
    pub async fn new(config: AppConfig) -> Result<Self, ServiceError> {
        let launcher = ProcessWorkerLauncher::with_log_dir(config.worker.log_dir.clone());
        Self::with_launcher(config, Arc::new(launcher)).await
    }

    /// Initialize the application with a custom worker launcher
    pub async fn with_launcher(
        config: AppConfig,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> Result<Self, ServiceError> {
        info!("Initializing arena-lobby coordinator");
        validate_config(&config).map_err(|e| ServiceError::Configuration {
            message: e.to_string(),
        })?;
        info!(
            "Configuration: service={}, worker={}, starting_port={}",
            config.service.name,
            config.worker.exe_path.display(),
            config.worker.starting_port
        );

        let metrics = Arc::new(MetricsCollector::new().map_err(|e| {
            ServiceError::Initialization {
                message: format!("Failed to create metrics collector: {}", e),
            }
        })?);
        let transport = Arc::new(ChannelTransport::default());

        let context = LobbyContext {
            registry: Arc::new(LobbyRegistry::new(config.worker.starting_port)),
            transport: transport.clone(),
            launcher,
            metrics: metrics.clone(),
            lobby_settings: config.lobby.clone(),
            worker_settings: config.worker.clone(),
        };

        let validator: Arc<dyn LoginValidator> = if config.lobby.require_login_token {
            info!("Joins require a login token");
            Arc::new(TokenRequiredValidator)
        } else {
            Arc::new(AcceptAllValidator)
        };
        let lobbies = LobbyService::new(context).with_validator(validator);

        Ok(Self {
            config,
            lobbies,
            transport,
            metrics,
            background_tasks: Mutex::new(Vec::new()),
            server_task: Mutex::new(None),
            server_shutdown: Mutex::new(None),
            local_addr: OnceLock::new(),
            is_running: Arc::new(RwLock::new(false)),
            started_at: Instant::now(),
        })
    }

    /// Start the HTTP front door and background tasks
    pub async fn start(self: &Arc<Self>) -> Result<(), ServiceError> {
        info!("Starting arena-lobby coordinator");

        self.start_http_server().await?;
        *self.is_running.write().await = true;
        self.start_background_tasks().await;

        info!("Arena-lobby coordinator started successfully");
        Ok(())
    }

    /// Perform graceful shutdown
    pub async fn shutdown(&self) -> Result<(), ServiceError> {
        info!("Starting graceful shutdown of arena-lobby");

        *self.is_running.write().await = false;

        let stopped = self
            .lobbies
            .shutdown_all()
            .await
            .map_err(|e| ServiceError::BackgroundTask {
                message: format!("Failed to stop lobbies: {}", e),
            })?;
        info!("Stopped {} lobbies", stopped);

        self.stop_http_server().await;
        self.stop_background_tasks().await;

        info!("Arena-lobby shutdown completed");
        Ok(())
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn lobbies(&self) -> &LobbyService {
        &self.lobbies
    }

    pub fn transport(&self) -> Arc<ChannelTransport> {
        self.transport.clone()
    }

    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub fn uptime(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Address the HTTP server is bound to, once started
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    async fn start_http_server(self: &Arc<Self>) -> Result<(), ServiceError> {
        let config = ApiServerConfig {
            host: self.config.service.http_host.clone(),
            port: self.config.service.http_port,
        };

        let server = ApiServer::bind(&config, self.clone())
            .await
            .map_err(|e| ServiceError::Http {
                message: e.to_string(),
            })?;
        let addr = server.local_addr().map_err(|e| ServiceError::Http {
            message: e.to_string(),
        })?;
        let _ = self.local_addr.set(addr);
        *self.server_shutdown.lock().await = Some(server.shutdown_handle());

        let handle = tokio::spawn(async move {
            if let Err(e) = server.serve().await {
                error!("HTTP server failed: {}", e);
            }
        });
        *self.server_task.lock().await = Some(handle);

        info!("HTTP front door started on {}", addr);
        Ok(())
    }

    async fn stop_http_server(&self) {
        if let Some(shutdown) = self.server_shutdown.lock().await.take() {
            if shutdown.send(()).is_err() {
                warn!("HTTP server already stopped");
            }
        }

        if let Some(task) = self.server_task.lock().await.take() {
            match tokio::time::timeout(self.config.shutdown_timeout(), task).await {
                Ok(_) => info!("HTTP server stopped"),
                Err(_) => warn!(
                    "HTTP server did not stop within {}s",
                    self.config.service.shutdown_timeout_seconds
                ),
            }
        }
    }

    /// Start background maintenance tasks
    async fn start_background_tasks(&self) {
        let uptime_task = {
            let metrics = self.metrics.clone();
            let is_running = self.is_running.clone();
            let started_at = self.started_at;

            tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_secs(15));
                debug!("Uptime metrics task started");

                while *is_running.read().await {
                    interval.tick().await;
                    metrics
                        .service()
                        .uptime_seconds
                        .set(started_at.elapsed().as_secs() as i64);
                }

                debug!("Uptime metrics task stopped");
            })
        };

        self.background_tasks.lock().await.push(uptime_task);
        info!("Background tasks started");
    }

    /// Stop all background tasks
    async fn stop_background_tasks(&self) {
        let mut tasks = self.background_tasks.lock().await;
        let task_count = tasks.len();
        for (i, task) in tasks.drain(..).enumerate() {
            debug!("Aborting background task {}/{}", i + 1, task_count);
            task.abort();
        }
        info!("All {} background tasks stopped", task_count);
    }
}
