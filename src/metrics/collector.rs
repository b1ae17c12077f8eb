//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the arena-lobby coordinator
//! using Prometheus metrics.

use anyhow::Result;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Main metrics collector for the coordinator
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Lobby-related metrics
    lobby_metrics: LobbyMetrics,

    /// Worker-process metrics
    worker_metrics: WorkerMetrics,

    /// Performance metrics
    performance_metrics: PerformanceMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// HTTP requests served by route and status code
    pub http_requests_total: IntCounterVec,
}

/// Lobby-related metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Number of live lobbies
    pub active_lobbies: IntGauge,

    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Total lobbies disposed
    pub lobbies_disposed_total: IntCounter,

    /// Members currently connected across all lobbies
    pub active_members: IntGauge,

    /// Accepted joins
    pub member_joins_total: IntCounter,

    /// Departures
    pub member_leaves_total: IntCounter,

    /// Rejected joins by reason
    pub joins_rejected_total: IntCounterVec,

    /// Start-game commands that did not launch a worker, by reason
    pub start_game_rejected_total: IntCounterVec,

    /// Lifecycle transitions by target state
    pub lifecycle_transitions_total: IntCounterVec,
}

/// Worker-process metrics
#[derive(Clone)]
pub struct WorkerMetrics {
    /// Launch calls issued
    pub launches_total: IntCounter,

    /// Worker exits by status (success, failure, signaled, spawn_failed)
    pub exits_total: IntCounterVec,

    /// Ready notifications received
    pub ready_total: IntCounter,

    /// Health pings received
    pub pings_total: IntCounter,

    /// Workers presumed unhealthy
    pub unhealthy_total: IntCounter,

    /// Workers currently in the Running state
    pub running_workers: IntGauge,
}

/// Performance metrics
#[derive(Clone)]
pub struct PerformanceMetrics {
    /// Duration of one lobby tick
    pub tick_duration: Histogram,

    /// Duration of lobby commands by kind
    pub command_duration: HistogramVec,
}

impl MetricsCollector {
    /// Create a new metrics collector with default registry
    pub fn new() -> Result<Self> {
        let registry = Arc::new(Registry::new());
        Self::with_registry(registry)
    }

    /// Create a new metrics collector with custom registry
    pub fn with_registry(registry: Arc<Registry>) -> Result<Self> {
        let service_metrics = ServiceMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let worker_metrics = WorkerMetrics::new(&registry)?;
        let performance_metrics = PerformanceMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            lobby_metrics,
            worker_metrics,
            performance_metrics,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Get service metrics
    pub fn service(&self) -> &ServiceMetrics {
        &self.service_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get worker metrics
    pub fn worker(&self) -> &WorkerMetrics {
        &self.worker_metrics
    }

    /// Get performance metrics
    pub fn performance(&self) -> &PerformanceMetrics {
        &self.performance_metrics
    }

    pub fn record_lobby_created(&self) {
        self.lobby_metrics.lobbies_created_total.inc();
        self.lobby_metrics.active_lobbies.inc();
    }

    /// Record a disposal, releasing whatever the lobby still counted
    pub fn record_lobby_disposed(&self, remaining_members: usize, worker_running: bool) {
        self.lobby_metrics.lobbies_disposed_total.inc();
        self.lobby_metrics.active_lobbies.dec();
        self.lobby_metrics
            .active_members
            .sub(remaining_members as i64);
        if worker_running {
            self.worker_metrics.running_workers.dec();
        }
    }

    pub fn record_member_joined(&self) {
        self.lobby_metrics.member_joins_total.inc();
        self.lobby_metrics.active_members.inc();
    }

    pub fn record_member_left(&self) {
        self.lobby_metrics.member_leaves_total.inc();
        self.lobby_metrics.active_members.dec();
    }

    pub fn record_join_rejected(&self, reason: &str) {
        self.lobby_metrics
            .joins_rejected_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_start_game_rejected(&self, reason: &str) {
        self.lobby_metrics
            .start_game_rejected_total
            .with_label_values(&[reason])
            .inc();
    }

    pub fn record_lifecycle_transition(&self, to: &str) {
        self.lobby_metrics
            .lifecycle_transitions_total
            .with_label_values(&[to])
            .inc();
    }

    pub fn record_worker_launched(&self) {
        self.worker_metrics.launches_total.inc();
    }

    pub fn record_worker_exit(&self, status: &str, was_running: bool) {
        self.worker_metrics
            .exits_total
            .with_label_values(&[status])
            .inc();
        if was_running {
            self.worker_metrics.running_workers.dec();
        }
    }

    pub fn record_worker_ready(&self, was_running: bool) {
        self.worker_metrics.ready_total.inc();
        if !was_running {
            self.worker_metrics.running_workers.inc();
        }
    }

    pub fn record_worker_ping(&self) {
        self.worker_metrics.pings_total.inc();
    }

    pub fn record_worker_unhealthy(&self) {
        self.worker_metrics.unhealthy_total.inc();
    }

    pub fn record_tick(&self, duration: Duration) {
        self.performance_metrics
            .tick_duration
            .observe(duration.as_secs_f64());
    }

    pub fn record_command(&self, command: &str, duration: Duration) {
        self.performance_metrics
            .command_duration
            .with_label_values(&[command])
            .observe(duration.as_secs_f64());
    }

    pub fn record_http_request(&self, route: &str, status: u16) {
        self.service_metrics
            .http_requests_total
            .with_label_values(&[route, &status.to_string()])
            .inc();
    }

    /// Create a timer for measuring operation duration
    pub fn start_timer(&self) -> MetricsTimer {
        MetricsTimer::new()
    }
}

/// Timer for measuring operation durations
pub struct MetricsTimer {
    start: Instant,
}

impl MetricsTimer {
    fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get the elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Stop the timer and return the duration
    pub fn stop(self) -> Duration {
        self.elapsed()
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("arena_lobby_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let http_requests_total = IntCounterVec::new(
            Opts::new(
                "arena_lobby_http_requests_total",
                "HTTP requests served by route and status",
            ),
            &["route", "status"],
        )?;
        registry.register(Box::new(http_requests_total.clone()))?;

        Ok(Self {
            uptime_seconds,
            http_requests_total,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let active_lobbies = IntGauge::new("arena_lobby_active_lobbies", "Number of live lobbies")?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let lobbies_created_total =
            IntCounter::new("arena_lobby_lobbies_created_total", "Total lobbies created")?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_disposed_total = IntCounter::new(
            "arena_lobby_lobbies_disposed_total",
            "Total lobbies disposed",
        )?;
        registry.register(Box::new(lobbies_disposed_total.clone()))?;

        let active_members = IntGauge::new(
            "arena_lobby_active_members",
            "Members connected across all lobbies",
        )?;
        registry.register(Box::new(active_members.clone()))?;

        let member_joins_total =
            IntCounter::new("arena_lobby_member_joins_total", "Accepted member joins")?;
        registry.register(Box::new(member_joins_total.clone()))?;

        let member_leaves_total =
            IntCounter::new("arena_lobby_member_leaves_total", "Member departures")?;
        registry.register(Box::new(member_leaves_total.clone()))?;

        let joins_rejected_total = IntCounterVec::new(
            Opts::new("arena_lobby_joins_rejected_total", "Rejected joins"),
            &["reason"],
        )?;
        registry.register(Box::new(joins_rejected_total.clone()))?;

        let start_game_rejected_total = IntCounterVec::new(
            Opts::new(
                "arena_lobby_start_game_rejected_total",
                "Start-game commands that did not launch a worker",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(start_game_rejected_total.clone()))?;

        let lifecycle_transitions_total = IntCounterVec::new(
            Opts::new(
                "arena_lobby_lifecycle_transitions_total",
                "Lobby lifecycle transitions by target state",
            ),
            &["to"],
        )?;
        registry.register(Box::new(lifecycle_transitions_total.clone()))?;

        Ok(Self {
            active_lobbies,
            lobbies_created_total,
            lobbies_disposed_total,
            active_members,
            member_joins_total,
            member_leaves_total,
            joins_rejected_total,
            start_game_rejected_total,
            lifecycle_transitions_total,
        })
    }
}

impl WorkerMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let launches_total =
            IntCounter::new("arena_lobby_worker_launches_total", "Worker launches issued")?;
        registry.register(Box::new(launches_total.clone()))?;

        let exits_total = IntCounterVec::new(
            Opts::new("arena_lobby_worker_exits_total", "Worker exits by status"),
            &["status"],
        )?;
        registry.register(Box::new(exits_total.clone()))?;

        let ready_total = IntCounter::new(
            "arena_lobby_worker_ready_total",
            "Worker ready notifications",
        )?;
        registry.register(Box::new(ready_total.clone()))?;

        let pings_total =
            IntCounter::new("arena_lobby_worker_pings_total", "Worker health pings")?;
        registry.register(Box::new(pings_total.clone()))?;

        let unhealthy_total = IntCounter::new(
            "arena_lobby_worker_unhealthy_total",
            "Workers presumed unhealthy",
        )?;
        registry.register(Box::new(unhealthy_total.clone()))?;

        let running_workers = IntGauge::new(
            "arena_lobby_running_workers",
            "Workers currently running",
        )?;
        registry.register(Box::new(running_workers.clone()))?;

        Ok(Self {
            launches_total,
            exits_total,
            ready_total,
            pings_total,
            unhealthy_total,
            running_workers,
        })
    }
}

impl PerformanceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let tick_duration = Histogram::with_opts(
            HistogramOpts::new(
                "arena_lobby_tick_duration_seconds",
                "Duration of one lobby tick",
            )
            .buckets(vec![0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01]),
        )?;
        registry.register(Box::new(tick_duration.clone()))?;

        let command_duration = HistogramVec::new(
            HistogramOpts::new(
                "arena_lobby_command_duration_seconds",
                "Duration of lobby commands",
            ),
            &["command"],
        )?;
        registry.register(Box::new(command_duration.clone()))?;

        Ok(Self {
            tick_duration,
            command_duration,
        })
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create default metrics collector")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_collector_creation() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        let _service = collector.service();
        let _lobby = collector.lobby();
        let _worker = collector.worker();
        let _performance = collector.performance();
    }

    #[test]
    fn test_lobby_gauges_balance() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_lobby_created();
        collector.record_member_joined();
        collector.record_member_joined();
        collector.record_member_left();
        assert_eq!(collector.lobby().active_lobbies.get(), 1);
        assert_eq!(collector.lobby().active_members.get(), 1);

        collector.record_lobby_disposed(1, false);
        assert_eq!(collector.lobby().active_lobbies.get(), 0);
        assert_eq!(collector.lobby().active_members.get(), 0);
        assert_eq!(collector.lobby().lobbies_disposed_total.get(), 1);
    }

    #[test]
    fn test_worker_running_gauge() {
        let collector = MetricsCollector::new().unwrap();

        collector.record_worker_launched();
        collector.record_worker_ready(false);
        collector.record_worker_ready(true);
        assert_eq!(collector.worker().running_workers.get(), 1);
        assert_eq!(collector.worker().ready_total.get(), 2);

        collector.record_worker_exit("success", true);
        assert_eq!(collector.worker().running_workers.get(), 0);
        assert_eq!(
            collector
                .worker()
                .exits_total
                .with_label_values(&["success"])
                .get(),
            1
        );
    }

    #[test]
    fn test_metrics_timer() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");
        let timer = collector.start_timer();

        std::thread::sleep(Duration::from_millis(10));
        let duration = timer.elapsed();

        assert!(duration >= Duration::from_millis(10));

        let final_duration = timer.stop();
        assert!(final_duration >= Duration::from_millis(10));
    }

    #[test]
    fn test_registry_exports_names() {
        let collector = MetricsCollector::new().unwrap();
        collector.record_http_request("lobby_info", 404);
        collector.record_tick(Duration::from_micros(20));

        let names: Vec<String> = collector
            .registry()
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.iter().any(|n| n == "arena_lobby_http_requests_total"));
        assert!(names.iter().any(|n| n == "arena_lobby_tick_duration_seconds"));
    }
}
