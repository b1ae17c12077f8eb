//! HTTP listener with graceful shutdown

use crate::http::router;
use crate::service::app::AppState;
use anyhow::{Context, Result};
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::info;

/// Address the front door binds to
#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    pub host: String,
    /// 0 picks an ephemeral port
    pub port: u16,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            port: 2567,
            host: "0.0.0.0".to_string(),
        }
    }
}

/// Bound HTTP server, ready to serve
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
    shutdown_tx: broadcast::Sender<()>,
    shutdown_rx: broadcast::Receiver<()>,
}

impl ApiServer {
    /// Bind the listener; serving starts with [`serve`](Self::serve)
    pub async fn bind(config: &ApiServerConfig, state: Arc<AppState>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind HTTP server to {}", addr))?;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        Ok(Self {
            listener,
            router: router(state),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .context("HTTP listener has no local address")
    }

    /// Sending on this stops the server after in-flight requests finish
    pub fn shutdown_handle(&self) -> broadcast::Sender<()> {
        self.shutdown_tx.clone()
    }

    pub async fn serve(self) -> Result<()> {
        let addr = self.local_addr()?;
        let mut shutdown_rx = self.shutdown_rx;

        info!("HTTP server listening on http://{}", addr);

        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("HTTP server shutdown signal received");
            })
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}
