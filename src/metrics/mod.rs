//! Metrics for the arena-lobby coordinator
//!
//! Prometheus collectors for lobbies, workers and request handling. The HTTP
//! front door serves them under `/metrics`.

pub mod collector;

pub use collector::{
    LobbyMetrics, MetricsCollector, MetricsTimer, PerformanceMetrics, ServiceMetrics,
    WorkerMetrics,
};
