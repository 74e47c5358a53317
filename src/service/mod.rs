//! Service layer for the bracket-host orchestration service
//!
//! This module contains the main application state, service coordination,
//! and background task management for the production service.

pub mod app;
pub mod health;

pub use app::AppState;
pub use health::{HealthCheck, HealthStatus};
