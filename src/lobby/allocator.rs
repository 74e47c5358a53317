//! Lobby allocation over the session pool
//!
//! The allocator is the single entry point for "give me a lobby": it
//! enforces the one-active-lobby-per-owner rule, checks a session out of
//! the pool for the duration of the creation exchange, persists the
//! resulting record, and hands the session straight back. A session picked
//! again while still hosting leaves that lobby before creating the new one.

use crate::bracket::store::MatchStore;
use crate::config::LobbyDefaults;
use crate::error::{OrchestratorError, Result};
use crate::lobby::store::LobbyStore;
use crate::metrics::MetricsCollector;
use crate::notify::Notifier;
use crate::session::pool::SessionPool;
use crate::types::{CreateLobbyOptions, LobbyRecord, LobbyStatus, MatchId, NotifyEvent};
use crate::utils::{current_timestamp, generate_pass_key};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Allocates remote lobbies on pooled sessions
pub struct LobbyAllocator {
    pool: Arc<SessionPool>,
    store: Arc<dyn LobbyStore>,
    matches: Arc<dyn MatchStore>,
    notifier: Arc<dyn Notifier>,
    defaults: LobbyDefaults,
    metrics: Arc<MetricsCollector>,
}

/// Reason label applied to the allocation-failure counter
fn failure_reason(err: &anyhow::Error) -> &'static str {
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::LobbyAlreadyActive { .. }) => "already_active",
        Some(OrchestratorError::SessionPoolExhausted) => "exhausted",
        Some(OrchestratorError::OperationTimeout { .. }) => "timeout",
        Some(OrchestratorError::ProtocolRejection { .. }) => "rejected",
        Some(OrchestratorError::SessionNotReady { .. }) => "not_ready",
        _ => "internal",
    }
}

impl LobbyAllocator {
    pub fn new(
        pool: Arc<SessionPool>,
        store: Arc<dyn LobbyStore>,
        matches: Arc<dyn MatchStore>,
        notifier: Arc<dyn Notifier>,
        defaults: LobbyDefaults,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(pool, store, matches, notifier, defaults, metrics)
    }

    /// Create an allocator that reports into the given collector
    pub fn with_metrics(
        pool: Arc<SessionPool>,
        store: Arc<dyn LobbyStore>,
        matches: Arc<dyn MatchStore>,
        notifier: Arc<dyn Notifier>,
        defaults: LobbyDefaults,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            pool,
            store,
            matches,
            notifier,
            defaults,
            metrics,
        }
    }

    /// Allocate a lobby for `owner`, optionally linked to a bracket match
    ///
    /// Fails with `LobbyAlreadyActive` before touching the pool when the
    /// owner already holds an active record, and with
    /// `SessionPoolExhausted` before any record is written when no session
    /// is free. The checked-out session is returned on every path.
    pub async fn allocate(
        &self,
        owner: &str,
        game_name: &str,
        match_id: Option<MatchId>,
    ) -> Result<LobbyRecord> {
        if let Some(existing) = self.store.find_active_by_owner(owner)? {
            warn!(
                "Owner '{}' already holds active lobby {}",
                owner, existing.lobby_id
            );
            self.metrics.record_allocation_failure("already_active");
            return Err(OrchestratorError::LobbyAlreadyActive {
                owner: owner.to_string(),
            }
            .into());
        }

        let session = match self.pool.checkout() {
            Ok(session) => session,
            Err(e) => {
                self.metrics.record_allocation_failure(failure_reason(&e));
                return Err(e);
            }
        };
        let pass_key = generate_pass_key(self.defaults.pass_key_length);
        let options = CreateLobbyOptions {
            game_name: game_name.to_string(),
            pass_key: pass_key.clone(),
            server_region: self.defaults.server_region,
            game_mode: self.defaults.game_mode,
            allow_spectating: self.defaults.allow_spectating,
        };

        let details = match session.create_lobby(options).await {
            Ok(details) => details,
            Err(e) => {
                self.metrics.record_allocation_failure(failure_reason(&e));
                self.pool.checkin(session.account_tag());
                return Err(e);
            }
        };

        let record = LobbyRecord {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            lobby_id: details.lobby_id.clone(),
            pass_key,
            server_region: self.defaults.server_region,
            game_mode: self.defaults.game_mode,
            match_id,
            status: LobbyStatus::Active,
            created_at: current_timestamp(),
            closed_at: None,
        };

        if let Err(e) = self.store.insert(record.clone()) {
            // Lost the insert race (or the store failed); the fresh lobby
            // has no record, so tear it down before freeing the session
            session.destroy_lobby().await;
            self.metrics.record_allocation_failure(failure_reason(&e));
            self.pool.checkin(session.account_tag());
            return Err(e);
        }

        if let Some(match_id) = match_id {
            // Linkage routes completion events back to the bracket; a
            // failure here leaves the lobby usable but unrouted
            if let Err(e) = self.matches.set_lobby_id(match_id, details.lobby_id.clone()) {
                warn!(
                    "Failed to link lobby {} to match #{}: {}",
                    details.lobby_id, match_id, e
                );
            }
        }

        info!(
            "Allocated lobby {} for '{}' on session '{}' (match: {:?})",
            details.lobby_id,
            owner,
            session.account_tag(),
            match_id
        );

        // Fire-and-forget: a failing sink never affects the allocation
        if let Err(e) = self
            .notifier
            .notify(NotifyEvent::LobbyCreated {
                owner: owner.to_string(),
                lobby_id: details.lobby_id.clone(),
                pass_key: record.pass_key.clone(),
                match_id,
            })
            .await
        {
            warn!("Lobby-created notification failed: {}", e);
        }

        self.pool.checkin(session.account_tag());
        Ok(record)
    }

    /// Close the owner's active lobby record
    ///
    /// Returns the closed record id, or None when the owner has nothing
    /// active. Only the record is touched; the remote lobby is torn down
    /// by its session, typically via the pool sweep.
    pub fn close(&self, owner: &str) -> Result<Option<Uuid>> {
        let closed = self.store.mark_closed(owner)?;
        if let Some(id) = closed {
            info!("Closed lobby record {} for '{}'", id, owner);
        }
        Ok(closed)
    }

    /// Tear down the owner's remote lobby and close its record
    ///
    /// Finds the session still hosting the record's lobby and destroys it
    /// there before closing the record. Used once a match has been decided
    /// so the hosting session is clean for the next round.
    pub async fn release(&self, owner: &str) -> Result<Option<Uuid>> {
        let Some(record) = self.store.find_active_by_owner(owner)? else {
            return Ok(None);
        };

        for session in self.pool.sessions() {
            let hosted = session
                .current_lobby()
                .map(|details| details.lobby_id == record.lobby_id)
                .unwrap_or(false);
            if hosted {
                session.destroy_lobby().await;
                break;
            }
        }

        self.close(owner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bracket::store::InMemoryMatchStore;
    use crate::config::SessionSettings;
    use crate::lobby::store::InMemoryLobbyStore;
    use crate::notify::RecordingNotifier;
    use crate::session::client::SimulatedClientFactory;
    use crate::types::Credentials;
    use tokio::sync::mpsc;

    fn fast_settings(tags: &[&str]) -> SessionSettings {
        SessionSettings {
            accounts: tags
                .iter()
                .map(|tag| Credentials {
                    account_tag: tag.to_string(),
                    username: tag.to_string(),
                    password: "secret".to_string(),
                })
                .collect(),
            ready_timeout_seconds: 1,
            create_ack_timeout_seconds: 1,
            leave_settle_ms: 1,
            teardown_settle_ms: 1,
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 5,
            max_reconnect_attempts: 2,
            poll_interval_seconds: 1,
            start_threshold: 10,
            launch_countdown_seconds: 0,
        }
    }

    struct Fixture {
        allocator: LobbyAllocator,
        pool: Arc<SessionPool>,
        store: Arc<InMemoryLobbyStore>,
        matches: Arc<InMemoryMatchStore>,
        notifier: Arc<RecordingNotifier>,
        factory: SimulatedClientFactory,
        metrics: Arc<MetricsCollector>,
    }

    async fn fixture(tags: &[&str]) -> Fixture {
        let factory = SimulatedClientFactory::new();
        let settings = fast_settings(tags);
        let (tx, _rx) = mpsc::unbounded_channel();
        let pool = Arc::new(SessionPool::new(&factory, &settings, tx));
        pool.connect_all().await;

        let store = Arc::new(InMemoryLobbyStore::new());
        let matches = Arc::new(InMemoryMatchStore::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let metrics = Arc::new(MetricsCollector::default());
        let allocator = LobbyAllocator::with_metrics(
            pool.clone(),
            store.clone(),
            matches.clone(),
            notifier.clone(),
            LobbyDefaults::default(),
            metrics.clone(),
        );
        Fixture {
            allocator,
            pool,
            store,
            matches,
            notifier,
            factory,
            metrics,
        }
    }

    fn failures_with_reason(fx: &Fixture, reason: &str) -> u64 {
        fx.metrics
            .lobby()
            .allocation_failures_total
            .with_label_values(&[reason])
            .get()
    }

    #[tokio::test]
    async fn test_allocate_persists_and_frees_session() {
        let fx = fixture(&["host1"]).await;

        let record = fx
            .allocator
            .allocate("alice", "Alpha vs Beta", None)
            .await
            .unwrap();
        assert_eq!(record.owner, "alice");
        assert_eq!(record.status, LobbyStatus::Active);
        assert_eq!(
            record.pass_key.len(),
            LobbyDefaults::default().pass_key_length
        );

        let stored = fx.store.find_active_by_owner("alice").unwrap().unwrap();
        assert_eq!(stored.lobby_id, record.lobby_id);

        // Session goes back to the pool while the lobby stays hosted
        assert_eq!(fx.pool.busy_count(), 0);
        assert_eq!(fx.notifier.count_events_of_kind("LobbyCreated"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_owner_rejected_before_pool() {
        let fx = fixture(&["host1", "host2"]).await;
        fx.allocator
            .allocate("alice", "Alpha vs Beta", None)
            .await
            .unwrap();

        let err = fx
            .allocator
            .allocate("alice", "Alpha vs Gamma", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::LobbyAlreadyActive { .. })
        ));
        // Only the first allocation reached a session
        assert_eq!(fx.notifier.count_events_of_kind("LobbyCreated"), 1);
    }

    #[tokio::test]
    async fn test_exhausted_pool_leaves_no_record() {
        let fx = fixture(&["host1"]).await;

        // Hold the only session so the allocator finds nothing free
        let held = fx.pool.checkout().unwrap();
        let err = fx
            .allocator
            .allocate("bob", "Gamma vs Delta", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::SessionPoolExhausted)
        ));
        assert!(fx.store.find_active_by_owner("bob").unwrap().is_none());
        assert_eq!(failures_with_reason(&fx, "exhausted"), 1);
        fx.pool.checkin(held.account_tag());
    }

    #[tokio::test]
    async fn test_creation_failure_returns_session() {
        let fx = fixture(&["host1"]).await;
        fx.factory.clients()[0].refuse_lobby_creation(true);

        let err = fx
            .allocator
            .allocate("alice", "Alpha vs Beta", None)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::ProtocolRejection { .. })
        ));
        assert!(fx.store.find_active_by_owner("alice").unwrap().is_none());
        assert_eq!(fx.pool.busy_count(), 0);
        assert_eq!(failures_with_reason(&fx, "rejected"), 1);
    }

    #[tokio::test]
    async fn test_allocate_links_match_row() {
        let fx = fixture(&["host1"]).await;
        let match_id = fx
            .matches
            .insert_match(1, "Alpha".to_string(), Some("Beta".to_string()), None)
            .unwrap();

        let record = fx
            .allocator
            .allocate("bracket", "Alpha vs Beta", Some(match_id))
            .await
            .unwrap();

        let linked = fx.matches.find_by_lobby(&record.lobby_id).unwrap().unwrap();
        assert_eq!(linked.id, match_id);
    }

    #[tokio::test]
    async fn test_racing_same_owner_allocations_keep_one_record() {
        let fx = fixture(&["host1", "host2"]).await;

        let (first, second) = futures::future::join(
            fx.allocator.allocate("alice", "Alpha vs Beta", None),
            fx.allocator.allocate("alice", "Alpha vs Gamma", None),
        )
        .await;

        // Exactly one wins, whether the loser hit the early guard or the
        // store's uniqueness check
        assert!(first.is_ok() != second.is_ok());
        let active: Vec<_> = fx
            .store
            .all_records()
            .unwrap()
            .into_iter()
            .filter(|r| r.owner == "alice" && r.status == LobbyStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);

        // The losing allocation left no orphan lobby behind
        let hosted = fx
            .factory
            .clients()
            .iter()
            .filter(|client| client.hosted_lobby().is_some())
            .count();
        assert_eq!(hosted, 1);
        assert_eq!(fx.pool.busy_count(), 0);
    }

    #[tokio::test]
    async fn test_close_marks_record_closed() {
        let fx = fixture(&["host1"]).await;
        fx.allocator
            .allocate("alice", "Alpha vs Beta", None)
            .await
            .unwrap();

        let closed = fx.allocator.close("alice").unwrap();
        assert!(closed.is_some());
        assert!(fx.store.find_active_by_owner("alice").unwrap().is_none());
        // A fresh allocation for the same owner is allowed again
        fx.allocator
            .allocate("alice", "Alpha vs Gamma", None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_release_tears_down_hosting_session() {
        let fx = fixture(&["host1"]).await;
        fx.allocator
            .allocate("alice", "Alpha vs Beta", None)
            .await
            .unwrap();
        let hosting = fx.pool.sessions()[0].clone();
        assert!(hosting.current_lobby().is_some());

        let released = fx.allocator.release("alice").await.unwrap();
        assert!(released.is_some());
        assert!(hosting.current_lobby().is_none());
        assert!(fx.store.find_active_by_owner("alice").unwrap().is_none());

        // Releasing again is a clean no-op
        assert!(fx.allocator.release("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_close_without_active_lobby_is_none() {
        let fx = fixture(&["host1"]).await;
        assert!(fx.allocator.close("nobody").unwrap().is_none());
    }
}
