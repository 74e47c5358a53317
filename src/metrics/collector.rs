//! Metrics collection using Prometheus
//!
//! This module provides metrics collection for the bracket-host
//! orchestration service using Prometheus metrics.

use anyhow::Result;
use prometheus::{IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Main metrics collector for the orchestration service
#[derive(Clone)]
pub struct MetricsCollector {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Service-level metrics
    service_metrics: ServiceMetrics,

    /// Session pool metrics
    session_metrics: SessionMetrics,

    /// Lobby metrics
    lobby_metrics: LobbyMetrics,

    /// Bracket progression metrics
    bracket_metrics: BracketMetrics,
}

/// Service-level metrics
#[derive(Clone)]
pub struct ServiceMetrics {
    /// Service uptime in seconds
    pub uptime_seconds: IntGauge,

    /// Health check status (0=unhealthy, 1=degraded, 2=healthy)
    pub health_status: IntGauge,
}

/// Session pool metrics
#[derive(Clone)]
pub struct SessionMetrics {
    /// Configured pool size
    pub pool_size: IntGauge,

    /// Sessions currently reporting ready
    pub sessions_ready: IntGauge,

    /// Sessions currently checked out
    pub sessions_busy: IntGauge,

    /// Total reconnect attempts across all sessions
    pub reconnects_total: IntCounter,

    /// Sessions excluded after authentication failure
    pub auth_failures_total: IntCounter,
}

/// Lobby metrics
#[derive(Clone)]
pub struct LobbyMetrics {
    /// Total lobbies created
    pub lobbies_created_total: IntCounter,

    /// Total lobbies torn down
    pub lobbies_destroyed_total: IntCounter,

    /// Lobby records currently active
    pub active_lobbies: IntGauge,

    /// Allocation failures by reason
    pub allocation_failures_total: IntCounterVec,
}

/// Bracket progression metrics
#[derive(Clone)]
pub struct BracketMetrics {
    /// Tournaments started
    pub tournaments_started_total: IntCounter,

    /// Tournaments concluded with a champion
    pub tournaments_concluded_total: IntCounter,

    /// Matches decided
    pub matches_decided_total: IntCounter,

    /// Round advancements
    pub rounds_advanced_total: IntCounter,
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
        let session_metrics = SessionMetrics::new(&registry)?;
        let lobby_metrics = LobbyMetrics::new(&registry)?;
        let bracket_metrics = BracketMetrics::new(&registry)?;

        Ok(Self {
            registry,
            service_metrics,
            session_metrics,
            lobby_metrics,
            bracket_metrics,
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

    /// Get session pool metrics
    pub fn session(&self) -> &SessionMetrics {
        &self.session_metrics
    }

    /// Get lobby metrics
    pub fn lobby(&self) -> &LobbyMetrics {
        &self.lobby_metrics
    }

    /// Get bracket metrics
    pub fn bracket(&self) -> &BracketMetrics {
        &self.bracket_metrics
    }

    /// Update the pool gauges from a live snapshot
    pub fn update_pool_gauges(&self, size: usize, ready: usize, busy: usize) {
        self.session_metrics.pool_size.set(size as i64);
        self.session_metrics.sessions_ready.set(ready as i64);
        self.session_metrics.sessions_busy.set(busy as i64);
    }

    /// Record one reconnect attempt by a session
    pub fn record_reconnect_attempt(&self) {
        self.session_metrics.reconnects_total.inc();
    }

    /// Record a session being excluded after an authentication failure
    pub fn record_auth_failure(&self) {
        self.session_metrics.auth_failures_total.inc();
    }

    /// Record a lobby being created
    pub fn record_lobby_created(&self) {
        self.lobby_metrics.lobbies_created_total.inc();
        self.lobby_metrics.active_lobbies.inc();
    }

    /// Record a lobby being torn down
    pub fn record_lobby_destroyed(&self) {
        self.lobby_metrics.lobbies_destroyed_total.inc();
        self.lobby_metrics.active_lobbies.dec();
    }

    /// Record an allocation failure by reason label
    pub fn record_allocation_failure(&self, reason: &str) {
        self.lobby_metrics
            .allocation_failures_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Record a decided match
    pub fn record_match_decided(&self) {
        self.bracket_metrics.matches_decided_total.inc();
    }

    /// Record a round advancement
    pub fn record_round_advanced(&self) {
        self.bracket_metrics.rounds_advanced_total.inc();
    }

    /// Record a tournament start
    pub fn record_tournament_started(&self) {
        self.bracket_metrics.tournaments_started_total.inc();
    }

    /// Record a concluded tournament
    pub fn record_tournament_concluded(&self) {
        self.bracket_metrics.tournaments_concluded_total.inc();
    }

    /// Update health status
    pub fn update_health_status(&self, status: u8) {
        self.service_metrics.health_status.set(status as i64);
    }
}

impl ServiceMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let uptime_seconds =
            IntGauge::new("bracket_host_uptime_seconds", "Service uptime in seconds")?;
        registry.register(Box::new(uptime_seconds.clone()))?;

        let health_status = IntGauge::new(
            "bracket_host_health_status",
            "Health status (0=unhealthy, 1=degraded, 2=healthy)",
        )?;
        registry.register(Box::new(health_status.clone()))?;

        Ok(Self {
            uptime_seconds,
            health_status,
        })
    }
}

impl SessionMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let pool_size = IntGauge::new("bracket_host_pool_size", "Configured session pool size")?;
        registry.register(Box::new(pool_size.clone()))?;

        let sessions_ready = IntGauge::new(
            "bracket_host_sessions_ready",
            "Sessions currently reporting ready",
        )?;
        registry.register(Box::new(sessions_ready.clone()))?;

        let sessions_busy = IntGauge::new(
            "bracket_host_sessions_busy",
            "Sessions currently checked out",
        )?;
        registry.register(Box::new(sessions_busy.clone()))?;

        let reconnects_total = IntCounter::new(
            "bracket_host_reconnects_total",
            "Total reconnect attempts across all sessions",
        )?;
        registry.register(Box::new(reconnects_total.clone()))?;

        let auth_failures_total = IntCounter::new(
            "bracket_host_auth_failures_total",
            "Sessions excluded after authentication failure",
        )?;
        registry.register(Box::new(auth_failures_total.clone()))?;

        Ok(Self {
            pool_size,
            sessions_ready,
            sessions_busy,
            reconnects_total,
            auth_failures_total,
        })
    }
}

impl LobbyMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let lobbies_created_total = IntCounter::new(
            "bracket_host_lobbies_created_total",
            "Total lobbies created",
        )?;
        registry.register(Box::new(lobbies_created_total.clone()))?;

        let lobbies_destroyed_total = IntCounter::new(
            "bracket_host_lobbies_destroyed_total",
            "Total lobbies torn down",
        )?;
        registry.register(Box::new(lobbies_destroyed_total.clone()))?;

        let active_lobbies = IntGauge::new(
            "bracket_host_active_lobbies",
            "Lobby records currently active",
        )?;
        registry.register(Box::new(active_lobbies.clone()))?;

        let allocation_failures_total = IntCounterVec::new(
            Opts::new(
                "bracket_host_allocation_failures_total",
                "Lobby allocation failures",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(allocation_failures_total.clone()))?;

        Ok(Self {
            lobbies_created_total,
            lobbies_destroyed_total,
            active_lobbies,
            allocation_failures_total,
        })
    }
}

impl BracketMetrics {
    fn new(registry: &Registry) -> Result<Self> {
        let tournaments_started_total = IntCounter::new(
            "bracket_host_tournaments_started_total",
            "Tournaments started",
        )?;
        registry.register(Box::new(tournaments_started_total.clone()))?;

        let tournaments_concluded_total = IntCounter::new(
            "bracket_host_tournaments_concluded_total",
            "Tournaments concluded with a champion",
        )?;
        registry.register(Box::new(tournaments_concluded_total.clone()))?;

        let matches_decided_total =
            IntCounter::new("bracket_host_matches_decided_total", "Matches decided")?;
        registry.register(Box::new(matches_decided_total.clone()))?;

        let rounds_advanced_total =
            IntCounter::new("bracket_host_rounds_advanced_total", "Round advancements")?;
        registry.register(Box::new(rounds_advanced_total.clone()))?;

        Ok(Self {
            tournaments_started_total,
            tournaments_concluded_total,
            matches_decided_total,
            rounds_advanced_total,
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
        let _session = collector.session();
        let _lobby = collector.lobby();
        let _bracket = collector.bracket();
    }

    #[test]
    fn test_lobby_counters_track_active_gauge() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_lobby_created();
        collector.record_lobby_created();
        collector.record_lobby_destroyed();

        assert_eq!(collector.lobby().lobbies_created_total.get(), 2);
        assert_eq!(collector.lobby().lobbies_destroyed_total.get(), 1);
        assert_eq!(collector.lobby().active_lobbies.get(), 1);
    }

    #[test]
    fn test_session_fault_counters() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_reconnect_attempt();
        collector.record_reconnect_attempt();
        collector.record_auth_failure();

        assert_eq!(collector.session().reconnects_total.get(), 2);
        assert_eq!(collector.session().auth_failures_total.get(), 1);
    }

    #[test]
    fn test_pool_gauges() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_pool_gauges(4, 3, 1);
        assert_eq!(collector.session().pool_size.get(), 4);
        assert_eq!(collector.session().sessions_ready.get(), 3);
        assert_eq!(collector.session().sessions_busy.get(), 1);
    }

    #[test]
    fn test_bracket_counters() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.record_tournament_started();
        collector.record_match_decided();
        collector.record_round_advanced();
        collector.record_tournament_concluded();
        collector.record_allocation_failure("exhausted");

        assert_eq!(collector.bracket().matches_decided_total.get(), 1);
        assert_eq!(collector.bracket().rounds_advanced_total.get(), 1);
        assert_eq!(
            collector
                .lobby()
                .allocation_failures_total
                .with_label_values(&["exhausted"])
                .get(),
            1
        );
    }

    #[test]
    fn test_health_status_updates() {
        let collector = MetricsCollector::new().expect("Failed to create metrics collector");

        collector.update_health_status(2);
        assert_eq!(collector.service().health_status.get(), 2);
    }
}
