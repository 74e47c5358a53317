//! Lobby record persistence interface and implementations
//!
//! Allocated lobbies are persisted as typed records keyed by owner so the
//! allocator can reject duplicate requests and admins can close records
//! without touching the remote lobby.

use crate::error::{OrchestratorError, Result};
use crate::types::{LobbyRecord, LobbyStatus};
use crate::utils::current_timestamp;
use std::sync::RwLock;
use uuid::Uuid;

/// Trait for lobby record storage operations
pub trait LobbyStore: Send + Sync {
    /// Persist a new lobby record
    ///
    /// Fails with `LobbyAlreadyActive` when the owner already holds an
    /// active record. The check runs under the store's write lock, so two
    /// racing inserts for one owner cannot both land.
    fn insert(&self, record: LobbyRecord) -> Result<()>;

    /// Most recent active record for an owner, if any
    fn find_active_by_owner(&self, owner: &str) -> Result<Option<LobbyRecord>>;

    /// Mark an owner's active record closed; returns the record id if found
    fn mark_closed(&self, owner: &str) -> Result<Option<Uuid>>;

    /// All records, newest first (for display/audit)
    fn all_records(&self) -> Result<Vec<LobbyRecord>>;
}

/// In-memory lobby store implementation
#[derive(Debug, Default)]
pub struct InMemoryLobbyStore {
    records: RwLock<Vec<LobbyRecord>>,
}

impl InMemoryLobbyStore {
    /// Create a new empty lobby store
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<LobbyRecord>>> {
        self.records.write().map_err(|_| {
            OrchestratorError::InternalError {
                message: "Failed to acquire lobby records write lock".to_string(),
            }
            .into()
        })
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<LobbyRecord>>> {
        self.records.read().map_err(|_| {
            OrchestratorError::InternalError {
                message: "Failed to acquire lobby records read lock".to_string(),
            }
            .into()
        })
    }
}

impl LobbyStore for InMemoryLobbyStore {
    fn insert(&self, record: LobbyRecord) -> Result<()> {
        let mut records = self.write()?;
        if records
            .iter()
            .any(|r| r.owner == record.owner && r.status == LobbyStatus::Active)
        {
            return Err(OrchestratorError::LobbyAlreadyActive {
                owner: record.owner,
            }
            .into());
        }
        records.push(record);
        Ok(())
    }

    fn find_active_by_owner(&self, owner: &str) -> Result<Option<LobbyRecord>> {
        let records = self.read()?;
        Ok(records
            .iter()
            .filter(|r| r.owner == owner && r.status == LobbyStatus::Active)
            .max_by_key(|r| r.created_at)
            .cloned())
    }

    fn mark_closed(&self, owner: &str) -> Result<Option<Uuid>> {
        let mut records = self.write()?;
        let latest = records
            .iter_mut()
            .filter(|r| r.owner == owner && r.status == LobbyStatus::Active)
            .max_by_key(|r| r.created_at);

        Ok(latest.map(|record| {
            record.status = LobbyStatus::Closed;
            record.closed_at = Some(current_timestamp());
            record.id
        }))
    }

    fn all_records(&self) -> Result<Vec<LobbyRecord>> {
        let records = self.read()?;
        let mut out = records.clone();
        out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(out)
    }
}
