//! Main entry point for the Arena Lobby coordinator
//!
//! Loads configuration, initializes logging, starts the HTTP front door and
//! lobby machinery, and shuts everything down on SIGINT/SIGTERM.

use anyhow::Result;
use arena_lobby::config::AppConfig;
use arena_lobby::service::{AppState, HealthCheck, HealthStatus};
use arena_lobby::transport::TransportEvent;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

/// Arena Lobby - lobby coordinator with per-game worker processes
#[derive(Parser)]
#[command(
    name = "arena-lobby",
    version,
    about = "A lobby coordinator that elects a manager and launches game-server workers",
    long_about = "Arena Lobby groups connected sessions into lobbies, elects a manager per lobby, \
                 launches a dedicated game-server process when the manager starts the game, \
                 tracks the worker's readiness and health, and disposes lobbies that stay \
                 without a manager."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Perform health check and exit
    #[arg(long, help = "Perform a health check and exit with status code")]
    health_check: bool,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// HTTP port override
    #[arg(long, value_name = "PORT", help = "Override HTTP server port")]
    http_port: Option<u16>,

    /// Worker executable override
    #[arg(long, value_name = "PATH", help = "Override the game-server executable")]
    exe_path: Option<PathBuf>,

    /// First worker port override
    #[arg(long, value_name = "PORT", help = "Override the first port handed to workers")]
    starting_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Perform health check and return appropriate exit code
async fn perform_health_check(config: AppConfig) -> Result<()> {
    info!("Performing health check...");

    let app_state = AppState::new(config).await?;

    match HealthCheck::check(&app_state).await {
        Ok(health) => {
            println!("Health Check: {}", health.status);
            println!("  Active Lobbies: {}", health.stats.lobbies.active_lobbies);
            println!("  Members: {}", health.stats.lobbies.members);
            println!("  Running Workers: {}", health.stats.lobbies.running_workers);
            if let Ok(details) = health.to_json() {
                debug!("Health details: {}", details);
            }

            if health.status == HealthStatus::Healthy {
                std::process::exit(0);
            } else {
                std::process::exit(1);
            }
        }
        Err(e) => {
            error!("Health check failed: {}", e);
            std::process::exit(1);
        }
    }
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Log outbound lobby events until a real-time gateway takes over the channel
async fn transport_log_task(app_state: Arc<AppState>) {
    let mut events = app_state.transport().subscribe();

    loop {
        match events.recv().await {
            Ok(TransportEvent::Broadcast {
                lobby_id,
                event,
                payload,
            }) => debug!("[lobby {}] broadcast {}: {}", lobby_id, event, payload),
            Ok(TransportEvent::Metadata { lobby_id, metadata }) => {
                debug!("[lobby {}] metadata {:?}", lobby_id, metadata)
            }
            Ok(TransportEvent::DisconnectAll { lobby_id }) => {
                debug!("[lobby {}] disconnect all clients", lobby_id)
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Transport log fell behind, skipped {} events", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

/// Run periodic health checks
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    while app_state.is_running().await {
        interval.tick().await;

        match HealthCheck::check(&app_state).await {
            Ok(health) => {
                info!(
                    "Health check: {} - {} active lobbies, {} members, {} running workers",
                    health.status,
                    health.stats.lobbies.active_lobbies,
                    health.stats.lobbies.members,
                    health.stats.lobbies.running_workers
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Arena Lobby Coordinator");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   HTTP: {}:{}",
        config.service.http_host, config.service.http_port
    );
    info!("   Worker: {}", config.worker.exe_path.display());
    info!("   First worker port: {}", config.worker.starting_port);
    info!(
        "   No-manager dispose delay: {}ms",
        config.lobby.no_manager_dispose_delay_ms
    );
    info!(
        "   Worker health timeout: {}ms",
        config.lobby.worker_health_timeout_ms
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(http_port) = args.http_port {
        config.service.http_port = http_port;
    }

    if let Some(exe_path) = &args.exe_path {
        config.worker.exe_path = exe_path.clone();
    }

    if let Some(starting_port) = args.starting_port {
        config.worker.starting_port = starting_port;
    }

    arena_lobby::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.health_check {
        return perform_health_check(config).await;
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    let transport_task = tokio::spawn(transport_log_task(app_state.clone()));

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    let health_task = tokio::spawn(health_check_task(app_state.clone()));

    info!("Arena Lobby is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    health_task.abort();

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("Graceful shutdown completed successfully"),
        Ok(Err(e)) => error!("Shutdown failed: {}", e),
        Err(_) => warn!("Shutdown timeout exceeded, forcing exit"),
    }

    transport_task.abort();
    info!("Arena Lobby stopped");
    Ok(())
}
