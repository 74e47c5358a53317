//! Session client capability trait and backends
//!
//! The low-level wire protocol to the game service is consumed here, not
//! reimplemented: a `SessionClient` can authenticate, manage one lobby,
//! and emit membership/match events. The orchestration core is written
//! against this trait; a simulated backend is provided for local
//! development and integration tests.

use crate::error::{OrchestratorError, Result};
use crate::types::{
    ClientEvent, CreateLobbyOptions, Credentials, LobbySnapshot, MatchOutcome, RemoteLobby,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the per-client event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// One authenticated connection to the remote game service
///
/// `connect` fails with `AuthRejected` on bad credentials and
/// `TransportFailure` on network faults. `create_lobby` resolves on remote
/// acknowledgment, fails with `ProtocolRejection` on explicit refusal, and
/// may hang indefinitely; callers bound it with a timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// Authenticate and bring up the remote link
    async fn connect(&self, credentials: &Credentials) -> Result<()>;

    /// Drop the remote link
    async fn disconnect(&self);

    /// Leave the currently hosted lobby, if any
    async fn leave_lobby(&self) -> Result<()>;

    /// Request creation of a new lobby
    async fn create_lobby(&self, options: &CreateLobbyOptions) -> Result<RemoteLobby>;

    /// Request destruction of the currently hosted lobby
    async fn destroy_lobby(&self) -> Result<()>;

    /// Swap the two sides of the hosted lobby
    async fn flip_teams(&self) -> Result<()>;

    /// Send a chat message into the hosted lobby
    async fn send_chat(&self, text: &str) -> Result<()>;

    /// Issue the launch command for the hosted lobby
    async fn launch_game(&self) -> Result<()>;

    /// Ask the remote service for a fresh membership snapshot
    ///
    /// The snapshot arrives asynchronously as a `MemberList` event.
    async fn request_member_list(&self) -> Result<()>;

    /// Subscribe to this client's event stream
    fn subscribe(&self) -> broadcast::Receiver<ClientEvent>;
}

/// Factory producing one client per pooled account
pub trait SessionClientFactory: Send + Sync {
    fn make_client(&self, credentials: &Credentials) -> Arc<dyn SessionClient>;
}

/// In-process backend for local development and integration tests
///
/// Acknowledges lobby creation with generated ids, reports ready right
/// after connect, and lets callers inject membership snapshots and match
/// outcomes. Knobs exist to refuse or stall lobby creation so failure
/// paths can be exercised end to end.
#[derive(Debug)]
pub struct SimulatedSessionClient {
    events: broadcast::Sender<ClientEvent>,
    lobby: Mutex<Option<RemoteLobby>>,
    human_members: AtomicUsize,
    refuse_creation: AtomicBool,
    stall_creation: AtomicBool,
    refuse_destruction: AtomicBool,
    fail_connect: AtomicBool,
    teams_flipped: AtomicBool,
    chat_log: Mutex<Vec<String>>,
    launched: AtomicBool,
}

/// Lobby ids must be unique across every simulated client in a process,
/// since outcome routing keys on them
static LOBBY_SEQUENCE: AtomicUsize = AtomicUsize::new(0);

impl Default for SimulatedSessionClient {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedSessionClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            lobby: Mutex::new(None),
            human_members: AtomicUsize::new(0),
            refuse_creation: AtomicBool::new(false),
            stall_creation: AtomicBool::new(false),
            refuse_destruction: AtomicBool::new(false),
            fail_connect: AtomicBool::new(false),
            teams_flipped: AtomicBool::new(false),
            chat_log: Mutex::new(Vec::new()),
            launched: AtomicBool::new(false),
        }
    }

    /// Inject a raw event into the stream (for testing)
    pub fn emit(&self, event: ClientEvent) {
        let _ = self.events.send(event);
    }

    /// Set the human member count reported by future snapshots
    pub fn set_human_members(&self, count: usize) {
        self.human_members.store(count, Ordering::SeqCst);
    }

    /// Emit a match-completion event for the hosted lobby
    pub fn complete_match(&self, home_side_won: bool) {
        let lobby_id = self
            .lobby
            .lock()
            .ok()
            .and_then(|lobby| lobby.as_ref().map(|l| l.lobby_id.clone()));
        if let Some(lobby_id) = lobby_id {
            self.emit(ClientEvent::MatchCompleted(MatchOutcome {
                lobby_id,
                home_side_won,
            }));
        }
    }

    /// Make the next `create_lobby` calls fail with a protocol rejection
    pub fn refuse_lobby_creation(&self, refuse: bool) {
        self.refuse_creation.store(refuse, Ordering::SeqCst);
    }

    /// Make `create_lobby` hang until the caller's deadline fires
    pub fn stall_lobby_creation(&self, stall: bool) {
        self.stall_creation.store(stall, Ordering::SeqCst);
    }

    /// Make `destroy_lobby` fail with a protocol rejection
    pub fn refuse_lobby_destruction(&self, refuse: bool) {
        self.refuse_destruction.store(refuse, Ordering::SeqCst);
    }

    /// Make `connect` fail with a transport fault
    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    /// Remote lobby currently hosted, if any (for testing)
    pub fn hosted_lobby(&self) -> Option<RemoteLobby> {
        self.lobby.lock().ok().and_then(|lobby| lobby.clone())
    }

    /// Chat messages sent so far (for testing)
    pub fn chat_log(&self) -> Vec<String> {
        self.chat_log
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Whether the launch command was issued (for testing)
    pub fn was_launched(&self) -> bool {
        self.launched.load(Ordering::SeqCst)
    }

    /// Whether the sides were swapped (for testing)
    pub fn teams_flipped(&self) -> bool {
        self.teams_flipped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionClient for SimulatedSessionClient {
    async fn connect(&self, credentials: &Credentials) -> Result<()> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(OrchestratorError::TransportFailure {
                account: credentials.account_tag.clone(),
                message: "simulated connect failure".to_string(),
            }
            .into());
        }
        debug!(
            "Simulated backend connected for account '{}'",
            credentials.account_tag
        );
        self.emit(ClientEvent::Ready);
        Ok(())
    }

    async fn disconnect(&self) {
        self.emit(ClientEvent::Unready);
    }

    async fn leave_lobby(&self) -> Result<()> {
        Ok(())
    }

    async fn create_lobby(&self, options: &CreateLobbyOptions) -> Result<RemoteLobby> {
        if self.stall_creation.load(Ordering::SeqCst) {
            // Remote never acknowledges; the caller's deadline abandons us
            std::future::pending::<()>().await;
        }
        if self.refuse_creation.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ProtocolRejection {
                message: "simulated lobby refusal".to_string(),
            }
            .into());
        }

        let seq = LOBBY_SEQUENCE.fetch_add(1, Ordering::SeqCst) + 1;
        let remote = RemoteLobby {
            lobby_id: format!("sim-lobby-{}", seq),
            pass_key: options.pass_key.clone(),
        };

        if let Ok(mut lobby) = self.lobby.lock() {
            *lobby = Some(remote.clone());
        }
        self.teams_flipped.store(false, Ordering::SeqCst);
        self.launched.store(false, Ordering::SeqCst);
        self.emit(ClientEvent::LobbyUpdated);
        Ok(remote)
    }

    async fn destroy_lobby(&self) -> Result<()> {
        if self.refuse_destruction.load(Ordering::SeqCst) {
            return Err(OrchestratorError::ProtocolRejection {
                message: "simulated destroy refusal".to_string(),
            }
            .into());
        }
        if let Ok(mut lobby) = self.lobby.lock() {
            *lobby = None;
        }
        Ok(())
    }

    async fn flip_teams(&self) -> Result<()> {
        self.teams_flipped.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn send_chat(&self, text: &str) -> Result<()> {
        if let Ok(mut log) = self.chat_log.lock() {
            log.push(text.to_string());
        }
        Ok(())
    }

    async fn launch_game(&self) -> Result<()> {
        self.launched.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn request_member_list(&self) -> Result<()> {
        let lobby_id = self
            .lobby
            .lock()
            .ok()
            .and_then(|lobby| lobby.as_ref().map(|l| l.lobby_id.clone()));
        if let Some(lobby_id) = lobby_id {
            let humans = self.human_members.load(Ordering::SeqCst);
            self.emit(ClientEvent::MemberList(LobbySnapshot {
                lobby_id,
                // Host slot counts as the one non-human member
                total_members: humans + 1,
                human_members: humans,
            }));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }
}

/// Factory handing out simulated clients
#[derive(Debug, Default)]
pub struct SimulatedClientFactory {
    made: Mutex<Vec<Arc<SimulatedSessionClient>>>,
}

impl SimulatedClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients handed out so far, in creation order (for testing)
    pub fn clients(&self) -> Vec<Arc<SimulatedSessionClient>> {
        self.made.lock().map(|made| made.clone()).unwrap_or_default()
    }
}

impl SessionClientFactory for SimulatedClientFactory {
    fn make_client(&self, _credentials: &Credentials) -> Arc<dyn SessionClient> {
        let client = Arc::new(SimulatedSessionClient::new());
        if let Ok(mut made) = self.made.lock() {
            made.push(client.clone());
        }
        client
    }
}
