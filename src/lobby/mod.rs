//! Lobby allocation and record persistence

pub mod allocator;
pub mod store;

pub use allocator::LobbyAllocator;
pub use store::{InMemoryLobbyStore, LobbyStore};
