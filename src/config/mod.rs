//! Configuration management for the bracket-host service
//!
//! This module handles all configuration loading from environment variables,
//! validation, and default values for the orchestration service.

pub mod app;
pub mod lobby;

// Re-export commonly used types
pub use app::{validate_config, AppConfig, ServiceSettings, SessionSettings};
pub use lobby::LobbyDefaults;
