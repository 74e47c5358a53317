//! Bracket engine and match persistence

pub mod engine;
pub mod store;

pub use engine::BracketEngine;
pub use store::{InMemoryMatchStore, MatchStore};
