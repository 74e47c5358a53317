//! Bracket Host - single-elimination tournament orchestrator
//!
//! This crate runs knockout tournaments over a pool of lobby-hosting
//! game-client sessions: per-account connection state machines, fair
//! lobby allocation, and asynchronous bracket progression.

pub mod bracket;
pub mod config;
pub mod error;
pub mod lobby;
pub mod metrics;
pub mod notify;
pub mod service;
pub mod session;
pub mod types;
pub mod utils;

// Re-export commonly used types and traits
pub use error::{OrchestratorError, Result};
pub use types::*;

// Re-export key components
pub use bracket::BracketEngine;
pub use lobby::LobbyAllocator;
pub use session::{Session, SessionClient, SessionClientFactory, SessionPool};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
