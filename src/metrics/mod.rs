//! Metrics and monitoring for the bracket-host orchestration service
//!
//! This module provides metrics collection and health monitoring for the
//! tournament orchestrator.

pub mod collector;
pub mod health;

pub use collector::{
    BracketMetrics, LobbyMetrics, MetricsCollector, ServiceMetrics, SessionMetrics,
};
pub use health::{HealthServer, HealthServerConfig};
