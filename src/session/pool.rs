//! Fixed-size session pool with fair checkout
//!
//! The pool owns every configured session and hands them out one at a
//! time. Checkout scans round-robin from just past the previously chosen
//! session so repeated allocations spread across the pool instead of
//! hammering the first healthy account.

use crate::config::SessionSettings;
use crate::error::{OrchestratorError, Result};
use crate::metrics::MetricsCollector;
use crate::session::client::SessionClientFactory;
use crate::session::instance::Session;
use crate::types::{AccountTag, ConnectionState, MatchOutcome};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Debug, Default)]
struct PoolState {
    busy: HashSet<AccountTag>,
    /// Next index the checkout scan starts from
    cursor: usize,
}

/// Pool of host-account sessions
pub struct SessionPool {
    sessions: Vec<Arc<Session>>,
    state: Mutex<PoolState>,
}

impl SessionPool {
    /// Build a pool with one session per configured account
    pub fn new(
        factory: &dyn SessionClientFactory,
        settings: &SessionSettings,
        completions: mpsc::UnboundedSender<MatchOutcome>,
    ) -> Self {
        let metrics = Arc::new(MetricsCollector::new().unwrap_or_else(|_| {
            warn!("Failed to create metrics collector, using default");
            MetricsCollector::default()
        }));
        Self::with_metrics(factory, settings, completions, metrics)
    }

    /// Build a pool whose sessions report into the given collector
    pub fn with_metrics(
        factory: &dyn SessionClientFactory,
        settings: &SessionSettings,
        completions: mpsc::UnboundedSender<MatchOutcome>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let sessions = settings
            .accounts
            .iter()
            .map(|credentials| {
                let client = factory.make_client(credentials);
                Session::new(
                    credentials.clone(),
                    client,
                    settings.clone(),
                    completions.clone(),
                    metrics.clone(),
                )
            })
            .collect();
        Self::from_sessions(sessions)
    }

    /// Build a pool from prebuilt sessions
    pub fn from_sessions(sessions: Vec<Arc<Session>>) -> Self {
        Self {
            sessions,
            state: Mutex::new(PoolState::default()),
        }
    }

    /// Number of sessions in the pool
    pub fn size(&self) -> usize {
        self.sessions.len()
    }

    /// Number of sessions currently checked out
    pub fn busy_count(&self) -> usize {
        self.state.lock().map(|s| s.busy.len()).unwrap_or(0)
    }

    /// Number of sessions reporting ready
    pub fn ready_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_ready()).count()
    }

    /// All sessions, in configuration order
    pub fn sessions(&self) -> &[Arc<Session>] {
        &self.sessions
    }

    /// Connect every session, returning how many reached ready
    ///
    /// A session that fails to connect is left in its terminal state and
    /// skipped by checkout; one bad account never blocks the rest.
    pub async fn connect_all(&self) -> usize {
        let mut ready = 0;
        for session in &self.sessions {
            match session.connect().await {
                Ok(()) => {
                    ready += 1;
                }
                Err(e) => {
                    warn!(
                        "Session '{}' failed to connect and is excluded from the pool: {}",
                        session.account_tag(),
                        e
                    );
                }
            }
        }
        info!("Session pool connected: {}/{} ready", ready, self.sessions.len());
        ready
    }

    /// Check out the next free, ready session
    ///
    /// The scan resumes where the previous one stopped and wraps around
    /// once. The cursor moves even when the scan fails so a later retry
    /// does not restart from the same position.
    pub fn checkout(&self) -> Result<Arc<Session>> {
        let total = self.sessions.len();
        if total == 0 {
            return Err(OrchestratorError::SessionPoolExhausted.into());
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| OrchestratorError::InternalError {
                message: "Session pool lock poisoned".to_string(),
            })?;

        for offset in 0..total {
            let index = (state.cursor + offset) % total;
            let session = &self.sessions[index];
            if state.busy.contains(session.account_tag()) {
                continue;
            }
            if session.connection_state() != ConnectionState::Ready {
                continue;
            }

            state.busy.insert(session.account_tag().to_string());
            state.cursor = (index + 1) % total;
            info!("Checked out session '{}'", session.account_tag());
            return Ok(Arc::clone(session));
        }

        state.cursor = (state.cursor + 1) % total;
        Err(OrchestratorError::SessionPoolExhausted.into())
    }

    /// Return a session to the pool; unknown or free tags are a no-op
    pub fn checkin(&self, account_tag: &str) {
        if let Ok(mut state) = self.state.lock() {
            if state.busy.remove(account_tag) {
                info!("Checked in session '{}'", account_tag);
            }
        }
    }

    /// Tear down every hosted lobby and free all checkouts
    ///
    /// Best-effort sweep used on reset and shutdown; individual teardown
    /// failures are logged by the sessions and never interrupt the sweep.
    pub async fn destroy_all_lobbies(&self) {
        info!("Destroying all pool lobbies");
        for session in &self.sessions {
            session.destroy_lobby().await;
        }
        if let Ok(mut state) = self.state.lock() {
            state.busy.clear();
        }
    }

    /// Disconnect every session and stop their background tasks
    pub async fn shutdown_all(&self) {
        for session in &self.sessions {
            session.shutdown().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::client::SimulatedSessionClient;
    use crate::types::Credentials;

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            accounts: Vec::new(),
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

    fn session_for(tag: &str) -> (Arc<Session>, Arc<SimulatedSessionClient>) {
        let client = Arc::new(SimulatedSessionClient::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let credentials = Credentials {
            account_tag: tag.to_string(),
            username: tag.to_string(),
            password: "secret".to_string(),
        };
        let session = Session::new(
            credentials,
            client.clone(),
            fast_settings(),
            tx,
            Arc::new(MetricsCollector::default()),
        );
        (session, client)
    }

    fn lobby_options() -> crate::types::CreateLobbyOptions {
        crate::types::CreateLobbyOptions {
            game_name: "Alpha vs Beta".to_string(),
            pass_key: "cup1234".to_string(),
            server_region: 3,
            game_mode: 2,
            allow_spectating: true,
        }
    }

    async fn connected_pool(tags: &[&str]) -> SessionPool {
        let mut sessions = Vec::new();
        for tag in tags {
            let (session, _client) = session_for(tag);
            sessions.push(session);
        }
        let pool = SessionPool::from_sessions(sessions);
        assert_eq!(pool.connect_all().await, tags.len());
        pool
    }

    #[tokio::test]
    async fn test_checkout_rotates_across_sessions() {
        let pool = connected_pool(&["host1", "host2", "host3"]).await;

        let first = pool.checkout().unwrap();
        assert_eq!(first.account_tag(), "host1");
        pool.checkin("host1");

        // Scan resumes past the previous pick even after checkin
        let second = pool.checkout().unwrap();
        assert_eq!(second.account_tag(), "host2");
        pool.checkin("host2");

        let third = pool.checkout().unwrap();
        assert_eq!(third.account_tag(), "host3");
        pool.checkin("host3");

        let wrapped = pool.checkout().unwrap();
        assert_eq!(wrapped.account_tag(), "host1");
    }

    #[tokio::test]
    async fn test_busy_sessions_are_skipped() {
        let pool = connected_pool(&["host1", "host2"]).await;

        let first = pool.checkout().unwrap();
        let second = pool.checkout().unwrap();
        assert_ne!(first.account_tag(), second.account_tag());
        assert_eq!(pool.busy_count(), 2);

        let err = pool.checkout().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::SessionPoolExhausted)
        ));
    }

    #[tokio::test]
    async fn test_unready_sessions_are_skipped() {
        let (healthy, _) = session_for("host1");
        let (broken, broken_client) = session_for("host2");
        broken_client.fail_connect(true);

        let pool = SessionPool::from_sessions(vec![broken, healthy]);
        assert_eq!(pool.connect_all().await, 1);

        let picked = pool.checkout().unwrap();
        assert_eq!(picked.account_tag(), "host1");
    }

    #[tokio::test]
    async fn test_checkin_is_idempotent() {
        let pool = connected_pool(&["host1"]).await;
        let session = pool.checkout().unwrap();
        assert_eq!(pool.busy_count(), 1);

        pool.checkin(session.account_tag());
        pool.checkin(session.account_tag());
        pool.checkin("no-such-session");
        assert_eq!(pool.busy_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_pool_is_exhausted() {
        let pool = SessionPool::from_sessions(Vec::new());
        let err = pool.checkout().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::SessionPoolExhausted)
        ));
    }

    #[tokio::test]
    async fn test_destroy_all_frees_checkouts() {
        let pool = connected_pool(&["host1", "host2"]).await;
        let _a = pool.checkout().unwrap();
        let _b = pool.checkout().unwrap();
        assert_eq!(pool.busy_count(), 2);

        pool.destroy_all_lobbies().await;
        assert_eq!(pool.busy_count(), 0);
        assert!(pool.checkout().is_ok());
    }

    #[tokio::test]
    async fn test_destroy_all_survives_failing_teardown() {
        let (flaky, flaky_client) = session_for("host1");
        let (healthy, healthy_client) = session_for("host2");
        let pool = SessionPool::from_sessions(vec![flaky, healthy]);
        assert_eq!(pool.connect_all().await, 2);

        for session in pool.sessions() {
            session.create_lobby(lobby_options()).await.unwrap();
        }
        let _a = pool.checkout().unwrap();
        let _b = pool.checkout().unwrap();
        flaky_client.refuse_lobby_destruction(true);

        pool.destroy_all_lobbies().await;

        // One refused teardown never stops the sweep: every session ends
        // idle, checkouts are freed, and the healthy lobby is gone remotely
        assert!(pool
            .sessions()
            .iter()
            .all(|session| session.current_lobby().is_none()));
        assert!(healthy_client.hosted_lobby().is_none());
        assert!(flaky_client.hosted_lobby().is_some());
        assert_eq!(pool.busy_count(), 0);
        assert!(pool.checkout().is_ok());
    }
}
