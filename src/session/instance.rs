//! Session state machine and lobby lifecycle
//!
//! A `Session` owns one authenticated connection to the remote game
//! service. It runs a connection state machine with bounded reconnection,
//! a per-lobby state machine, a timer-driven membership poller, and the
//! one-shot match start sequence. One session's fault or reconnect never
//! blocks another's: every session drives its own event loop task.

use crate::config::SessionSettings;
use crate::error::{OrchestratorError, Result};
use crate::metrics::MetricsCollector;
use crate::session::client::SessionClient;
use crate::types::{
    AccountTag, ClientEvent, ConnectionState, CreateLobbyOptions, Credentials, LobbyDetails,
    LobbyPhase, LobbySnapshot, MatchOutcome,
};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, Duration, Instant};
use tracing::{debug, error, info, warn};

/// Poll step while waiting for the coordinator to report ready
const READY_POLL_STEP: Duration = Duration::from_millis(200);

/// Mutable session state, touched only from this session's own handling
#[derive(Debug)]
struct SessionState {
    connection: ConnectionState,
    lobby_phase: LobbyPhase,
    current_lobby: Option<LobbyDetails>,
    reconnect_attempts: u32,
    reconnecting: bool,
    start_triggered: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            connection: ConnectionState::Disconnected,
            lobby_phase: LobbyPhase::Idle,
            current_lobby: None,
            reconnect_attempts: 0,
            reconnecting: false,
            start_triggered: false,
        }
    }
}

/// Background task handles owned by a session
#[derive(Default)]
struct SessionTasks {
    event_loop: Option<JoinHandle<()>>,
    poller: Option<JoinHandle<()>>,
}

/// One pooled host account and its remote connection
pub struct Session {
    account_tag: AccountTag,
    credentials: Credentials,
    client: Arc<dyn SessionClient>,
    settings: SessionSettings,
    state: RwLock<SessionState>,
    tasks: Mutex<SessionTasks>,
    completions: mpsc::UnboundedSender<MatchOutcome>,
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("account_tag", &self.account_tag)
            .field("connection", &self.connection_state())
            .field("lobby_phase", &self.lobby_phase())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create a new session around a client
    ///
    /// Match-completion events observed by this session are forwarded on
    /// `completions` for the bracket engine to consume.
    pub fn new(
        credentials: Credentials,
        client: Arc<dyn SessionClient>,
        settings: SessionSettings,
        completions: mpsc::UnboundedSender<MatchOutcome>,
        metrics: Arc<MetricsCollector>,
    ) -> Arc<Self> {
        Arc::new(Self {
            account_tag: credentials.account_tag.clone(),
            credentials,
            client,
            settings,
            state: RwLock::new(SessionState::new()),
            tasks: Mutex::new(SessionTasks::default()),
            completions,
            metrics,
        })
    }

    /// Tag identifying this session's host account
    pub fn account_tag(&self) -> &str {
        &self.account_tag
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        self.state
            .read()
            .map(|s| s.connection)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Current lobby lifecycle phase
    pub fn lobby_phase(&self) -> LobbyPhase {
        self.state
            .read()
            .map(|s| s.lobby_phase)
            .unwrap_or(LobbyPhase::Idle)
    }

    /// Details of the hosted lobby, if any
    pub fn current_lobby(&self) -> Option<LobbyDetails> {
        self.state
            .read()
            .ok()
            .and_then(|s| s.current_lobby.clone())
    }

    /// Whether the remote coordinator reports this session ready
    pub fn is_ready(&self) -> bool {
        self.connection_state() == ConnectionState::Ready
    }

    /// Connect and wait until the session is ready to host
    ///
    /// Bad credentials fail terminally; transport faults are retried with
    /// capped linear backoff up to the configured ceiling, after which the
    /// session goes `Fatal` and the failure is surfaced.
    pub async fn connect(self: &Arc<Self>) -> Result<()> {
        self.spawn_event_loop();
        self.connect_with_backoff().await?;
        self.wait_until_ready(self.settings.ready_timeout()).await
    }

    /// Create a lobby on this session, bounded by the ack timeout
    ///
    /// Requires readiness (waiting a bounded interval for it), leaves any
    /// prior lobby first, and resolves once the remote acknowledges. A
    /// timed-out request is abandoned: the in-flight exchange is dropped
    /// and a late acknowledgment is ignored.
    pub async fn create_lobby(self: &Arc<Self>, options: CreateLobbyOptions) -> Result<LobbyDetails> {
        if !self.is_ready() {
            warn!(
                "[{}] Not ready yet - waiting up to {:?} before lobby creation",
                self.account_tag,
                self.settings.ready_timeout()
            );
            self.wait_until_ready(self.settings.ready_timeout())
                .await
                .map_err(|_| OrchestratorError::SessionNotReady {
                    account: self.account_tag.clone(),
                })?;
        }

        self.with_state_mut(|s| s.lobby_phase = LobbyPhase::Creating)?;

        // Leave whatever lobby a previous allocation may have left behind
        if let Err(e) = self.client.leave_lobby().await {
            debug!("[{}] No previous lobby to leave: {}", self.account_tag, e);
        }
        sleep(self.settings.leave_settle()).await;

        info!(
            "[{}] Creating lobby '{}' (region {}, mode {})",
            self.account_tag, options.game_name, options.server_region, options.game_mode
        );

        let ack = timeout(
            self.settings.create_ack_timeout(),
            self.client.create_lobby(&options),
        )
        .await;

        let remote = match ack {
            Err(_) => {
                self.with_state_mut(|s| s.lobby_phase = LobbyPhase::Idle)?;
                return Err(OrchestratorError::OperationTimeout {
                    operation: format!("create_lobby[{}]", self.account_tag),
                    seconds: self.settings.create_ack_timeout_seconds,
                }
                .into());
            }
            Ok(Err(e)) => {
                self.with_state_mut(|s| s.lobby_phase = LobbyPhase::Idle)?;
                error!("[{}] Lobby creation rejected: {}", self.account_tag, e);
                return Err(e);
            }
            Ok(Ok(remote)) => remote,
        };

        let details = LobbyDetails {
            lobby_id: remote.lobby_id,
            pass_key: remote.pass_key,
            member_count: 0,
        };

        self.with_state_mut(|s| {
            s.current_lobby = Some(details.clone());
            s.lobby_phase = LobbyPhase::Active;
            // One-shot start guard resets with every new lobby
            s.start_triggered = false;
        })?;

        info!("[{}] Lobby created: {}", self.account_tag, details.lobby_id);

        self.spawn_poller();
        if let Err(e) = self.client.request_member_list().await {
            warn!(
                "[{}] Initial member list request failed: {}",
                self.account_tag, e
            );
        }

        Ok(details)
    }

    /// Tear down the hosted lobby
    ///
    /// No-op when already idle; otherwise issues leave+destroy, waits a
    /// settle interval, and clears lobby state. Never raises - teardown
    /// paths must always complete, so failures are only logged. Idempotent.
    pub async fn destroy_lobby(&self) {
        let lobby = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            if state.lobby_phase == LobbyPhase::Idle && state.current_lobby.is_none() {
                None
            } else {
                state.lobby_phase = LobbyPhase::Destroying;
                Some(state.current_lobby.clone())
            }
        };

        let Some(lobby) = lobby else {
            info!("[{}] No active lobby to destroy", self.account_tag);
            return;
        };

        if let Some(details) = &lobby {
            info!(
                "[{}] Leaving and destroying lobby {}",
                self.account_tag, details.lobby_id
            );
        }

        self.abort_poller();

        if let Err(e) = self.client.leave_lobby().await {
            warn!("[{}] Failed to leave lobby: {}", self.account_tag, e);
        }
        if let Err(e) = self.client.destroy_lobby().await {
            warn!("[{}] Failed to destroy lobby: {}", self.account_tag, e);
        }

        sleep(self.settings.teardown_settle()).await;

        if let Ok(mut state) = self.state.write() {
            state.current_lobby = None;
            state.lobby_phase = LobbyPhase::Idle;
            state.start_triggered = false;
        }

        info!("[{}] Lobby teardown complete", self.account_tag);
    }

    /// Disconnect and stop all background tasks
    pub async fn shutdown(&self) {
        self.abort_poller();
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(handle) = tasks.event_loop.take() {
                handle.abort();
            }
        }
        self.client.disconnect().await;
        if let Ok(mut state) = self.state.write() {
            state.connection = ConnectionState::Disconnected;
        }
        info!("[{}] Session shut down", self.account_tag);
    }

    // ---- internal machinery ----

    fn with_state_mut<F: FnOnce(&mut SessionState)>(&self, f: F) -> Result<()> {
        let mut state = self
            .state
            .write()
            .map_err(|_| OrchestratorError::InternalError {
                message: format!("Session state lock poisoned for '{}'", self.account_tag),
            })?;
        f(&mut state);
        Ok(())
    }

    /// Transport-level connect with capped linear backoff
    async fn connect_with_backoff(&self) -> Result<()> {
        loop {
            self.with_state_mut(|s| s.connection = ConnectionState::Connecting)?;
            info!("[{}] Connecting to remote service...", self.account_tag);

            match self.client.connect(&self.credentials).await {
                Ok(()) => {
                    self.with_state_mut(|s| {
                        if s.connection == ConnectionState::Connecting {
                            s.connection = ConnectionState::Connected;
                        }
                    })?;
                    return Ok(());
                }
                Err(e) => {
                    if matches!(
                        e.downcast_ref::<OrchestratorError>(),
                        Some(OrchestratorError::AuthRejected { .. })
                    ) {
                        error!("[{}] Authentication rejected", self.account_tag);
                        self.metrics.record_auth_failure();
                        self.with_state_mut(|s| s.connection = ConnectionState::AuthFailed)?;
                        return Err(e);
                    }

                    let attempts = {
                        let mut state = self.state.write().map_err(|_| {
                            OrchestratorError::InternalError {
                                message: format!(
                                    "Session state lock poisoned for '{}'",
                                    self.account_tag
                                ),
                            }
                        })?;
                        state.reconnect_attempts += 1;
                        state.connection = ConnectionState::Disconnected;
                        state.reconnect_attempts
                    };
                    self.metrics.record_reconnect_attempt();

                    if attempts >= self.settings.max_reconnect_attempts {
                        error!(
                            "[{}] Max reconnect attempts reached ({})",
                            self.account_tag, attempts
                        );
                        self.with_state_mut(|s| s.connection = ConnectionState::Fatal)?;
                        return Err(OrchestratorError::ReconnectCeiling {
                            account: self.account_tag.clone(),
                            attempts,
                        }
                        .into());
                    }

                    let delay = self.settings.reconnect_delay(attempts);
                    warn!(
                        "[{}] Connect failed ({}); retrying in {:?} (attempt {}/{})",
                        self.account_tag, e, delay, attempts, self.settings.max_reconnect_attempts
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    /// Wait until the coordinator reports ready, bounded by `limit`
    async fn wait_until_ready(&self, limit: Duration) -> Result<()> {
        let deadline = Instant::now() + limit;
        let started = Instant::now();
        loop {
            match self.connection_state() {
                ConnectionState::Ready => {
                    debug!(
                        "[{}] Ready after {:.1}s",
                        self.account_tag,
                        started.elapsed().as_secs_f64()
                    );
                    return Ok(());
                }
                ConnectionState::AuthFailed | ConnectionState::Fatal => {
                    return Err(OrchestratorError::SessionNotReady {
                        account: self.account_tag.clone(),
                    }
                    .into());
                }
                _ => {}
            }
            if Instant::now() >= deadline {
                return Err(OrchestratorError::OperationTimeout {
                    operation: format!("wait_ready[{}]", self.account_tag),
                    seconds: limit.as_secs(),
                }
                .into());
            }
            sleep(READY_POLL_STEP).await;
        }
    }

    fn spawn_event_loop(self: &Arc<Self>) {
        let Ok(mut tasks) = self.tasks.lock() else {
            return;
        };
        if tasks.event_loop.is_some() {
            return;
        }

        let mut events = self.client.subscribe();
        let session = Arc::clone(self);
        tasks.event_loop = Some(tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => session.handle_client_event(event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(
                            "[{}] Event stream lagged - {} events dropped",
                            session.account_tag, skipped
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("[{}] Event loop finished", session.account_tag);
        }));
    }

    async fn handle_client_event(self: &Arc<Self>, event: ClientEvent) {
        match event {
            ClientEvent::Ready => {
                info!("[{}] Coordinator ready", self.account_tag);
                let _ = self.with_state_mut(|s| {
                    s.connection = ConnectionState::Ready;
                    s.reconnect_attempts = 0;
                });
            }
            ClientEvent::Unready => {
                warn!("[{}] Coordinator unready", self.account_tag);
                let _ = self.with_state_mut(|s| {
                    if s.connection == ConnectionState::Ready {
                        s.connection = ConnectionState::Connected;
                    }
                });
            }
            ClientEvent::Disconnected { message } => {
                warn!("[{}] Disconnected: {}", self.account_tag, message);
                self.on_transport_fault();
            }
            ClientEvent::LobbyUpdated => {
                // Ask for a fresh snapshot so the poller sees real members
                if self.current_lobby().is_some() {
                    if let Err(e) = self.client.request_member_list().await {
                        debug!(
                            "[{}] Member list request after update failed: {}",
                            self.account_tag, e
                        );
                    }
                }
            }
            ClientEvent::MemberList(snapshot) => self.handle_member_snapshot(snapshot),
            ClientEvent::MatchCompleted(outcome) => {
                info!(
                    "[{}] Match completed in lobby {}",
                    self.account_tag, outcome.lobby_id
                );
                if self.completions.send(outcome).is_err() {
                    warn!(
                        "[{}] Completion channel closed - match outcome dropped",
                        self.account_tag
                    );
                }
            }
        }
    }

    /// React to a transport fault by scheduling one reconnect task
    fn on_transport_fault(self: &Arc<Self>) {
        let should_reconnect = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            if matches!(
                state.connection,
                ConnectionState::AuthFailed | ConnectionState::Fatal
            ) || state.reconnecting
            {
                false
            } else {
                state.connection = ConnectionState::Disconnected;
                state.reconnecting = true;
                true
            }
        };

        if !should_reconnect {
            return;
        }

        let session = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = session.connect_with_backoff().await {
                error!(
                    "[{}] Reconnect abandoned - manual recovery required: {}",
                    session.account_tag, e
                );
            }
            let _ = session.with_state_mut(|s| s.reconnecting = false);
        });
    }

    /// One-shot start gate: the first snapshot crossing the human threshold
    /// for the current lobby triggers the start sequence exactly once.
    fn handle_member_snapshot(self: &Arc<Self>, snapshot: LobbySnapshot) {
        let triggered = {
            let Ok(mut state) = self.state.write() else {
                return;
            };
            let Some(lobby) = state.current_lobby.as_mut() else {
                debug!(
                    "[{}] Snapshot for {} but no hosted lobby",
                    self.account_tag, snapshot.lobby_id
                );
                return;
            };
            if lobby.lobby_id != snapshot.lobby_id {
                return;
            }
            lobby.member_count = snapshot.total_members;

            info!(
                "[{}] Snapshot lobby {} - total: {}, humans: {}",
                self.account_tag,
                snapshot.lobby_id,
                snapshot.total_members,
                snapshot.human_members
            );

            if !state.start_triggered && snapshot.human_members >= self.settings.start_threshold {
                state.start_triggered = true;
                true
            } else {
                false
            }
        };

        if triggered {
            let session = Arc::clone(self);
            tokio::spawn(async move {
                session.run_start_sequence().await;
            });
        }
    }

    /// Side draw, optional swap, announcement, delayed launch
    async fn run_start_sequence(&self) {
        let home_first_pick = rand::random::<bool>();
        let side = if home_first_pick { "Home" } else { "Away" };
        info!("[{}] Side draw result: {}", self.account_tag, side);

        if let Err(e) = self
            .client
            .send_chat(&format!("Side draw: {} gets first pick!", side))
            .await
        {
            warn!("[{}] Failed to announce side draw: {}", self.account_tag, e);
        }

        if !home_first_pick {
            match self.client.flip_teams().await {
                Ok(()) => {
                    let _ = self.client.send_chat("Teams have been swapped!").await;
                }
                Err(e) => warn!("[{}] Failed to flip teams: {}", self.account_tag, e),
            }
        }

        let countdown = self.settings.launch_countdown();
        if let Err(e) = self
            .client
            .send_chat(&format!(
                "Game launches in {} seconds... GL HF!",
                countdown.as_secs()
            ))
            .await
        {
            warn!("[{}] Failed to announce launch: {}", self.account_tag, e);
        }

        sleep(countdown).await;

        if self.current_lobby().is_none() {
            // Lobby was torn down during the countdown
            return;
        }
        match self.client.launch_game().await {
            Ok(()) => info!("[{}] Launch command issued", self.account_tag),
            Err(e) => error!("[{}] Failed to launch game: {}", self.account_tag, e),
        }
    }

    fn spawn_poller(self: &Arc<Self>) {
        self.abort_poller();

        let session = Arc::clone(self);
        let poll_interval = self.settings.poll_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(poll_interval);
            // First tick fires immediately; the create path already asked
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if session.lobby_phase() != LobbyPhase::Active {
                    break;
                }
                if let Err(e) = session.client.request_member_list().await {
                    debug!("[{}] Member poll failed: {}", session.account_tag, e);
                }
            }
            debug!("[{}] Membership poller stopped", session.account_tag);
        });

        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.poller = Some(handle);
        }
    }

    fn abort_poller(&self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(handle) = tasks.poller.take() {
                handle.abort();
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            if let Some(handle) = tasks.event_loop.take() {
                handle.abort();
            }
            if let Some(handle) = tasks.poller.take() {
                handle.abort();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::client::{MockSessionClient, SimulatedSessionClient};
    use tokio::sync::broadcast;

    fn credentials(tag: &str) -> Credentials {
        Credentials {
            account_tag: tag.to_string(),
            username: tag.to_string(),
            password: "secret".to_string(),
        }
    }

    fn fast_settings() -> SessionSettings {
        SessionSettings {
            accounts: Vec::new(),
            ready_timeout_seconds: 1,
            create_ack_timeout_seconds: 1,
            leave_settle_ms: 1,
            teardown_settle_ms: 1,
            reconnect_base_delay_ms: 1,
            reconnect_max_delay_ms: 5,
            max_reconnect_attempts: 3,
            poll_interval_seconds: 1,
            start_threshold: 2,
            launch_countdown_seconds: 0,
        }
    }

    fn lobby_options() -> CreateLobbyOptions {
        CreateLobbyOptions {
            game_name: "Alpha vs Beta".to_string(),
            pass_key: "cup1234".to_string(),
            server_region: 3,
            game_mode: 2,
            allow_spectating: true,
        }
    }

    fn simulated_session() -> (Arc<Session>, Arc<SimulatedSessionClient>) {
        let client = Arc::new(SimulatedSessionClient::new());
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(
            credentials("host1"),
            client.clone(),
            fast_settings(),
            tx,
            Arc::new(MetricsCollector::default()),
        );
        (session, client)
    }

    #[tokio::test]
    async fn test_connect_reaches_ready() {
        let (session, _client) = simulated_session();
        session.connect().await.unwrap();
        assert_eq!(session.connection_state(), ConnectionState::Ready);
    }

    #[tokio::test]
    async fn test_auth_failure_is_terminal() {
        let mut mock = MockSessionClient::new();
        mock.expect_subscribe()
            .returning(|| broadcast::channel(8).1);
        mock.expect_connect().returning(|creds| {
            Err(OrchestratorError::AuthRejected {
                account: creds.account_tag.clone(),
            }
            .into())
        });

        let metrics = Arc::new(MetricsCollector::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(
            credentials("host1"),
            Arc::new(mock),
            fast_settings(),
            tx,
            metrics.clone(),
        );

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::AuthRejected { .. })
        ));
        assert_eq!(session.connection_state(), ConnectionState::AuthFailed);
        assert_eq!(metrics.session().auth_failures_total.get(), 1);
    }

    #[tokio::test]
    async fn test_transport_faults_hit_reconnect_ceiling() {
        let mut mock = MockSessionClient::new();
        mock.expect_subscribe()
            .returning(|| broadcast::channel(8).1);
        mock.expect_connect().times(3).returning(|creds| {
            Err(OrchestratorError::TransportFailure {
                account: creds.account_tag.clone(),
                message: "socket reset".to_string(),
            }
            .into())
        });

        let metrics = Arc::new(MetricsCollector::default());
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(
            credentials("host1"),
            Arc::new(mock),
            fast_settings(),
            tx,
            metrics.clone(),
        );

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::ReconnectCeiling { attempts: 3, .. })
        ));
        assert_eq!(session.connection_state(), ConnectionState::Fatal);
        // One count per failed connect, ceiling attempt included
        assert_eq!(metrics.session().reconnects_total.get(), 3);
    }

    #[tokio::test]
    async fn test_create_lobby_success() {
        let (session, client) = simulated_session();
        session.connect().await.unwrap();

        let details = session.create_lobby(lobby_options()).await.unwrap();
        assert_eq!(session.lobby_phase(), LobbyPhase::Active);
        assert_eq!(details.pass_key, "cup1234");
        assert_eq!(
            client.hosted_lobby().unwrap().lobby_id,
            details.lobby_id
        );
    }

    #[tokio::test]
    async fn test_create_lobby_timeout_is_distinct() {
        let (session, client) = simulated_session();
        session.connect().await.unwrap();
        client.stall_lobby_creation(true);

        let err = session.create_lobby(lobby_options()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::OperationTimeout { .. })
        ));
        // Abandoned request leaves the session idle and reusable
        assert_eq!(session.lobby_phase(), LobbyPhase::Idle);
    }

    #[tokio::test]
    async fn test_create_lobby_protocol_rejection() {
        let (session, client) = simulated_session();
        session.connect().await.unwrap();
        client.refuse_lobby_creation(true);

        let err = session.create_lobby(lobby_options()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<OrchestratorError>(),
            Some(OrchestratorError::ProtocolRejection { .. })
        ));
        assert_eq!(session.lobby_phase(), LobbyPhase::Idle);
    }

    #[tokio::test]
    async fn test_destroy_lobby_is_idempotent() {
        let (session, _client) = simulated_session();
        session.connect().await.unwrap();
        session.create_lobby(lobby_options()).await.unwrap();

        session.destroy_lobby().await;
        assert_eq!(session.lobby_phase(), LobbyPhase::Idle);
        assert!(session.current_lobby().is_none());

        // Second teardown is a quiet no-op
        session.destroy_lobby().await;
        assert_eq!(session.lobby_phase(), LobbyPhase::Idle);
    }

    #[tokio::test]
    async fn test_start_sequence_fires_once_per_lobby() {
        let (session, client) = simulated_session();
        session.connect().await.unwrap();
        session.create_lobby(lobby_options()).await.unwrap();

        client.set_human_members(2);
        client.request_member_list().await.unwrap();
        // Duplicate threshold crossings must not restart the sequence
        client.request_member_list().await.unwrap();
        client.request_member_list().await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(client.was_launched());
        let launch_announcements = client
            .chat_log()
            .iter()
            .filter(|line| line.contains("GL HF"))
            .count();
        assert_eq!(launch_announcements, 1);
    }

    #[tokio::test]
    async fn test_start_guard_resets_on_new_lobby() {
        let (session, client) = simulated_session();
        session.connect().await.unwrap();
        session.create_lobby(lobby_options()).await.unwrap();

        client.set_human_members(2);
        client.request_member_list().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.was_launched());

        session.destroy_lobby().await;
        session.create_lobby(lobby_options()).await.unwrap();
        // New lobby, fresh guard: the sequence may fire again
        client.request_member_list().await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(client.was_launched());
    }

    #[tokio::test]
    async fn test_match_completion_forwarded() {
        let client = Arc::new(SimulatedSessionClient::new());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(
            credentials("host1"),
            client.clone(),
            fast_settings(),
            tx,
            Arc::new(MetricsCollector::default()),
        );

        session.connect().await.unwrap();
        session.create_lobby(lobby_options()).await.unwrap();
        client.complete_match(true);

        let outcome = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(outcome.home_side_won);
        assert_eq!(
            outcome.lobby_id,
            session.current_lobby().unwrap().lobby_id
        );
    }

    #[tokio::test]
    async fn test_debug_output_names_account_and_state() {
        let (session, _client) = simulated_session();
        session.connect().await.unwrap();

        let rendered = format!("{:?}", session);
        assert!(rendered.contains("host1"));
        assert!(rendered.contains("Ready"));
    }

    #[tokio::test]
    async fn test_disconnect_event_flips_readiness() {
        let (session, client) = simulated_session();
        session.connect().await.unwrap();
        assert!(session.is_ready());

        client.emit(ClientEvent::Unready);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!session.is_ready());
    }
}
