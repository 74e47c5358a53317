//! Health check endpoints and monitoring
//!
//! This module provides health check functionality for the bracket-host
//! orchestration service, including readiness and liveness probes.

use crate::service::app::AppState;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Health check status
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheck {
    /// Overall service status
    pub status: HealthStatus,
    /// Service name
    pub service: String,
    /// Current timestamp
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Detailed component checks
    pub checks: Vec<ComponentCheck>,
    /// Service statistics
    pub stats: ServiceStats,
}

/// Individual component health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCheck {
    /// Component name
    pub name: String,
    /// Component status
    pub status: HealthStatus,
    /// Optional message explaining a non-healthy status
    pub message: Option<String>,
}

/// Service statistics for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceStats {
    /// Configured session pool size
    pub pool_size: usize,
    /// Sessions currently reporting ready
    pub sessions_ready: usize,
    /// Sessions currently checked out
    pub sessions_busy: usize,
    /// Current tournament phase
    pub tournament_phase: String,
    /// Match rows currently in the bracket
    pub bracket_matches: usize,
}

impl HealthCheck {
    /// Perform a comprehensive health check of the service
    pub async fn check(app_state: Arc<AppState>) -> Result<Self> {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        let service_check = Self::check_service_running(&app_state);
        if service_check.status != HealthStatus::Healthy {
            overall_status = HealthStatus::Unhealthy;
        }
        checks.push(service_check);

        let pool_check = Self::check_session_pool(&app_state);
        if pool_check.status == HealthStatus::Unhealthy {
            overall_status = HealthStatus::Unhealthy;
        } else if pool_check.status == HealthStatus::Degraded
            && overall_status == HealthStatus::Healthy
        {
            overall_status = HealthStatus::Degraded;
        }
        checks.push(pool_check);

        let stats = Self::gather_service_stats(&app_state);

        Ok(HealthCheck {
            status: overall_status,
            service: app_state.config().service.name.clone(),
            timestamp: chrono::Utc::now(),
            checks,
            stats,
        })
    }

    /// Lightweight liveness probe: is the process coordinating at all
    pub async fn liveness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        debug!("Performing liveness check");
        if app_state.is_running() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Unhealthy)
        }
    }

    /// Readiness probe: can the service host lobbies right now
    ///
    /// A fully connected pool is healthy, a partially connected pool is
    /// degraded but still serves, zero ready sessions cannot host.
    pub async fn readiness_check(app_state: Arc<AppState>) -> Result<HealthStatus> {
        debug!("Performing readiness check");
        if !app_state.is_running() {
            return Ok(HealthStatus::Unhealthy);
        }

        let pool = app_state.pool();
        let ready = pool.ready_count();
        if ready == 0 {
            Ok(HealthStatus::Unhealthy)
        } else if ready < pool.size() {
            Ok(HealthStatus::Degraded)
        } else {
            Ok(HealthStatus::Healthy)
        }
    }

    fn check_service_running(app_state: &Arc<AppState>) -> ComponentCheck {
        if app_state.is_running() {
            ComponentCheck {
                name: "service".to_string(),
                status: HealthStatus::Healthy,
                message: None,
            }
        } else {
            ComponentCheck {
                name: "service".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some("Service is not running".to_string()),
            }
        }
    }

    fn check_session_pool(app_state: &Arc<AppState>) -> ComponentCheck {
        let pool = app_state.pool();
        let ready = pool.ready_count();
        let size = pool.size();

        let (status, message) = if size == 0 {
            (
                HealthStatus::Unhealthy,
                Some("No sessions configured".to_string()),
            )
        } else if ready == 0 {
            (
                HealthStatus::Unhealthy,
                Some("No sessions are ready".to_string()),
            )
        } else if ready < size {
            (
                HealthStatus::Degraded,
                Some(format!("{}/{} sessions ready", ready, size)),
            )
        } else {
            (HealthStatus::Healthy, None)
        };

        ComponentCheck {
            name: "session_pool".to_string(),
            status,
            message,
        }
    }

    fn gather_service_stats(app_state: &Arc<AppState>) -> ServiceStats {
        let pool = app_state.pool();
        let bracket_matches = app_state
            .engine()
            .bracket()
            .map(|rows| rows.len())
            .unwrap_or(0);

        ServiceStats {
            pool_size: pool.size(),
            sessions_ready: pool.ready_count(),
            sessions_busy: pool.busy_count(),
            tournament_phase: app_state.engine().phase().to_string(),
            bracket_matches,
        }
    }
}
