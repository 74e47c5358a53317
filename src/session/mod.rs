//! Session management: remote clients, per-account state machines, pool

pub mod client;
pub mod instance;
pub mod pool;

pub use client::{SessionClient, SessionClientFactory, SimulatedClientFactory, SimulatedSessionClient};
pub use instance::Session;
pub use pool::SessionPool;
