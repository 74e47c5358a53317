//! Match persistence interface and implementations
//!
//! This module defines the interface for persisting and querying bracket
//! match rows, with an in-memory implementation. Typed records are
//! constructed here, at the persistence boundary, and never re-derived
//! downstream.

use crate::error::{OrchestratorError, Result};
use crate::types::{LobbyId, MatchId, MatchRecord, TeamName};
use std::sync::RwLock;

/// Trait for match-row storage operations
pub trait MatchStore: Send + Sync {
    /// Insert a new match row and return its id
    fn insert_match(
        &self,
        round: u32,
        team1: TeamName,
        team2: Option<TeamName>,
        winner: Option<TeamName>,
    ) -> Result<MatchId>;

    /// Set the winner only if no winner is recorded yet
    ///
    /// Returns true when the write was applied. This is the single atomic
    /// per-match update that makes duplicate completion events safe.
    fn set_winner_if_unset(&self, id: MatchId, winner: TeamName) -> Result<bool>;

    /// Attach the remote lobby id to a match row
    fn set_lobby_id(&self, id: MatchId, lobby_id: LobbyId) -> Result<()>;

    /// Look up a match by the lobby that hosted it
    fn find_by_lobby(&self, lobby_id: &str) -> Result<Option<MatchRecord>>;

    /// All matches of a round in ascending id (seed) order
    fn matches_in_round(&self, round: u32) -> Result<Vec<MatchRecord>>;

    /// Number of matches in a round still lacking a winner
    fn unresolved_in_round(&self, round: u32) -> Result<usize>;

    /// All matches ordered by round then id (for display/audit)
    fn all_matches(&self) -> Result<Vec<MatchRecord>>;

    /// Remove all match rows (admin reset)
    fn clear(&self) -> Result<()>;
}

/// In-memory match store implementation
#[derive(Debug, Default)]
pub struct InMemoryMatchStore {
    inner: RwLock<MatchTable>,
}

#[derive(Debug, Default)]
struct MatchTable {
    rows: Vec<MatchRecord>,
    next_id: MatchId,
}

impl InMemoryMatchStore {
    /// Create a new empty match store
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MatchTable {
                rows: Vec::new(),
                next_id: 1,
            }),
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MatchTable>> {
        self.inner
            .read()
            .map_err(|_| {
                OrchestratorError::InternalError {
                    message: "Failed to acquire match table read lock".to_string(),
                }
                .into()
            })
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MatchTable>> {
        self.inner
            .write()
            .map_err(|_| {
                OrchestratorError::InternalError {
                    message: "Failed to acquire match table write lock".to_string(),
                }
                .into()
            })
    }
}

impl MatchStore for InMemoryMatchStore {
    fn insert_match(
        &self,
        round: u32,
        team1: TeamName,
        team2: Option<TeamName>,
        winner: Option<TeamName>,
    ) -> Result<MatchId> {
        let mut table = self.write()?;
        let id = table.next_id;
        table.next_id += 1;
        table.rows.push(MatchRecord {
            id,
            round,
            team1,
            team2,
            winner,
            lobby_id: None,
        });
        Ok(id)
    }

    fn set_winner_if_unset(&self, id: MatchId, winner: TeamName) -> Result<bool> {
        let mut table = self.write()?;
        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| OrchestratorError::NotFound {
                what: format!("match {}", id),
            })?;

        if row.winner.is_some() {
            return Ok(false);
        }
        row.winner = Some(winner);
        Ok(true)
    }

    fn set_lobby_id(&self, id: MatchId, lobby_id: LobbyId) -> Result<()> {
        let mut table = self.write()?;
        let row = table
            .rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or_else(|| OrchestratorError::NotFound {
                what: format!("match {}", id),
            })?;
        row.lobby_id = Some(lobby_id);
        Ok(())
    }

    fn find_by_lobby(&self, lobby_id: &str) -> Result<Option<MatchRecord>> {
        let table = self.read()?;
        Ok(table
            .rows
            .iter()
            .find(|row| row.lobby_id.as_deref() == Some(lobby_id))
            .cloned())
    }

    fn matches_in_round(&self, round: u32) -> Result<Vec<MatchRecord>> {
        let table = self.read()?;
        let mut rows: Vec<MatchRecord> = table
            .rows
            .iter()
            .filter(|row| row.round == round)
            .cloned()
            .collect();
        rows.sort_by_key(|row| row.id);
        Ok(rows)
    }

    fn unresolved_in_round(&self, round: u32) -> Result<usize> {
        let table = self.read()?;
        Ok(table
            .rows
            .iter()
            .filter(|row| row.round == round && row.winner.is_none())
            .count())
    }

    fn all_matches(&self) -> Result<Vec<MatchRecord>> {
        let table = self.read()?;
        let mut rows = table.rows.clone();
        rows.sort_by_key(|row| (row.round, row.id));
        Ok(rows)
    }

    fn clear(&self) -> Result<()> {
        let mut table = self.write()?;
        table.rows.clear();
        table.next_id = 1;
        Ok(())
    }
}
