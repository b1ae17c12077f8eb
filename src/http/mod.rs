//! HTTP front door
//!
//! Serves lobby lookups, lobby creation, worker callbacks, health probes and
//! Prometheus metrics using Axum.

pub mod server;

pub use server::{ApiServer, ApiServerConfig};

use crate::config::LobbyOptions;
use crate::error::LobbyError;
use crate::service::app::AppState;
use crate::service::health::{HealthCheck, HealthStatus};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

const ROUTE_ROOT: &str = "/";
const ROUTE_HEALTH: &str = "/health";
const ROUTE_READY: &str = "/ready";
const ROUTE_STATS: &str = "/stats";
const ROUTE_METRICS: &str = "/metrics";
const ROUTE_LOBBIES: &str = "/lobbies";
const ROUTE_LOBBY_INFO: &str = "/{lobby_id}";
const ROUTE_WORKER_READY: &str = "/worker/ready/{lobby_id}";
const ROUTE_WORKER_PING: &str = "/worker/ping/{lobby_id}";

/// Create the Axum router with every endpoint
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(ROUTE_ROOT, get(root_handler))
        .route(ROUTE_HEALTH, get(health_handler))
        .route(ROUTE_READY, get(ready_handler))
        .route(ROUTE_STATS, get(stats_handler))
        .route(ROUTE_METRICS, get(metrics_handler))
        .route(ROUTE_LOBBIES, post(create_lobby_handler))
        .route(ROUTE_LOBBY_INFO, get(lobby_info_handler))
        .route(ROUTE_WORKER_READY, post(worker_ready_handler))
        .route(ROUTE_WORKER_PING, post(worker_ping_handler))
        .with_state(state)
}

fn respond(state: &AppState, route: &str, status: StatusCode, body: impl IntoResponse) -> Response {
    state.metrics().record_http_request(route, status.as_u16());
    (status, body).into_response()
}

fn status_for(error: &anyhow::Error) -> StatusCode {
    match error.downcast_ref::<LobbyError>() {
        Some(LobbyError::LobbyNotFound { .. }) | Some(LobbyError::LobbyClosed { .. }) => {
            StatusCode::NOT_FOUND
        }
        Some(LobbyError::InvalidLobbyOptions { .. }) | Some(LobbyError::InvalidJoin { .. }) => {
            StatusCode::BAD_REQUEST
        }
        Some(LobbyError::LobbyFull { .. }) => StatusCode::CONFLICT,
        Some(LobbyError::LoginRejected { .. }) => StatusCode::FORBIDDEN,
        Some(LobbyError::PortsExhausted { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(state: &AppState, route: &str, error: anyhow::Error) -> Response {
    let status = status_for(&error);
    if status.is_server_error() {
        error!("{} failed: {}", route, error);
    } else {
        debug!("{} rejected with {}: {}", route, status, error);
    }
    let kind = error
        .downcast_ref::<LobbyError>()
        .map_or("internal", LobbyError::kind);
    respond(
        state,
        route,
        status,
        Json(json!({ "error": error.to_string(), "kind": kind })),
    )
}

/// Empty bodies decode as `T::default()`
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T, serde_json::Error> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
}

/// Root endpoint handler - shows service information
async fn root_handler(State(state): State<Arc<AppState>>) -> Response {
    let info = json!({
        "service": state.config().service.name,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": [
            ROUTE_HEALTH,
            ROUTE_READY,
            ROUTE_STATS,
            ROUTE_METRICS,
            ROUTE_LOBBIES,
            ROUTE_LOBBY_INFO,
            ROUTE_WORKER_READY,
            ROUTE_WORKER_PING,
        ]
    });
    respond(&state, ROUTE_ROOT, StatusCode::OK, Json(info))
}

/// Lightweight health check endpoint handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Response {
    debug!("Health check requested");

    let (status, label) = match HealthCheck::liveness_check(&state).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, HealthStatus::Healthy),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, HealthStatus::Degraded),
        Ok(HealthStatus::Unhealthy) | Err(_) => {
            (StatusCode::SERVICE_UNAVAILABLE, HealthStatus::Unhealthy)
        }
    };

    let body = json!({
        "status": label,
        "service": state.config().service.name,
        "version": env!("CARGO_PKG_VERSION")
    });
    respond(&state, ROUTE_HEALTH, status, Json(body))
}

/// Readiness check endpoint handler
async fn ready_handler(State(state): State<Arc<AppState>>) -> Response {
    let (status, text) = match HealthCheck::readiness_check(&state).await {
        Ok(HealthStatus::Healthy) => (StatusCode::OK, "Ready"),
        Ok(HealthStatus::Degraded) => (StatusCode::OK, "Degraded but ready"),
        Ok(HealthStatus::Unhealthy) => (StatusCode::SERVICE_UNAVAILABLE, "Not ready"),
        Err(e) => {
            error!("Readiness check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    };
    respond(&state, ROUTE_READY, status, text)
}

/// Detailed service statistics for humans
async fn stats_handler(State(state): State<Arc<AppState>>) -> Response {
    match HealthCheck::check(&state).await {
        Ok(health) => {
            let status = match health.status {
                HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::OK,
            };
            let stats = json!({
                "service": {
                    "name": health.service,
                    "version": health.version,
                    "status": health.status,
                    "uptimeSeconds": health.stats.uptime_seconds
                },
                "lobbies": health.stats.lobbies,
                "components": health.checks,
                "timestamp": health.timestamp
            });
            respond(&state, ROUTE_STATS, status, Json(stats))
        }
        Err(e) => error_response(&state, ROUTE_STATS, e),
    }
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    let metric_families = state.metrics().registry().gather();
    let encoder = TextEncoder::new();

    match encoder.encode_to_string(&metric_families) {
        Ok(output) => {
            debug!("Serving {} metric families", metric_families.len());
            respond(
                &state,
                ROUTE_METRICS,
                StatusCode::OK,
                ([(header::CONTENT_TYPE, encoder.format_type().to_string())], output),
            )
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            respond(
                &state,
                ROUTE_METRICS,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to encode metrics",
            )
        }
    }
}

/// `POST /lobbies` with [`LobbyOptions`] as JSON
async fn create_lobby_handler(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let options: LobbyOptions = match parse_body(&body) {
        Ok(options) => options,
        Err(e) => {
            return respond(
                &state,
                ROUTE_LOBBIES,
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Invalid lobby options: {}", e) })),
            )
        }
    };

    match state.lobbies().create_lobby(options) {
        Ok(info) => respond(&state, ROUTE_LOBBIES, StatusCode::CREATED, Json(info)),
        Err(e) => error_response(&state, ROUTE_LOBBIES, e),
    }
}

/// Creation-time description of one lobby
async fn lobby_info_handler(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
) -> Response {
    match state.lobbies().info(&lobby_id) {
        Ok(info) => respond(&state, ROUTE_LOBBY_INFO, StatusCode::OK, Json(info)),
        Err(e) => error_response(&state, ROUTE_LOBBY_INFO, e),
    }
}

/// Readiness callback from a worker; the body is broadcast to members as-is
async fn worker_ready_handler(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
    body: Bytes,
) -> Response {
    let payload: Value = match parse_body(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!("Malformed readiness payload for lobby {}: {}", lobby_id, e);
            return respond(
                &state,
                ROUTE_WORKER_READY,
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": format!("Invalid JSON body: {}", e) })),
            );
        }
    };

    match state.lobbies().worker_ready(&lobby_id, payload).await {
        Ok(()) => respond(&state, ROUTE_WORKER_READY, StatusCode::OK, Json(json!({}))),
        Err(e) => error_response(&state, ROUTE_WORKER_READY, e),
    }
}

async fn worker_ping_handler(
    State(state): State<Arc<AppState>>,
    Path(lobby_id): Path<String>,
) -> Response {
    match state.lobbies().worker_ping(&lobby_id).await {
        Ok(()) => respond(&state, ROUTE_WORKER_PING, StatusCode::OK, Json(json!({}))),
        Err(e) => error_response(&state, ROUTE_WORKER_PING, e),
    }
}
