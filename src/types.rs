//! Common types used throughout the orchestration service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag identifying one pooled host account, used in logs and busy tracking
pub type AccountTag = String;

/// Remote lobby identifier as issued by the game service
pub type LobbyId = String;

/// Team name as registered for the tournament
pub type TeamName = String;

/// Identifier of a match row in the bracket
pub type MatchId = i64;

/// Credentials for one host account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub account_tag: AccountTag,
    pub username: String,
    pub password: String,
}

/// Connection state of a session's remote link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    /// Transport is up but the game coordinator has not reported ready
    Connected,
    Ready,
    /// Credentials were rejected; excluded until manual recovery
    AuthFailed,
    /// Reconnect ceiling exceeded; excluded until manual recovery
    Fatal,
}

/// Lifecycle state of the lobby a session hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyPhase {
    Idle,
    Creating,
    Active,
    Destroying,
}

/// Tournament phase, owned by the bracket engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TournamentPhase {
    Idle,
    Registration,
    Running,
}

impl std::fmt::Display for TournamentPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TournamentPhase::Idle => write!(f, "Idle"),
            TournamentPhase::Registration => write!(f, "Registration"),
            TournamentPhase::Running => write!(f, "Running"),
        }
    }
}

/// Options for creating a remote lobby
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLobbyOptions {
    pub game_name: String,
    pub pass_key: String,
    pub server_region: u32,
    pub game_mode: u32,
    pub allow_spectating: bool,
}

/// Acknowledgment payload returned by the remote service on lobby creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteLobby {
    pub lobby_id: LobbyId,
    pub pass_key: String,
}

/// Details of the lobby a session currently hosts
///
/// Owned by the creating session; cleared on teardown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyDetails {
    pub lobby_id: LobbyId,
    pub pass_key: String,
    pub member_count: usize,
}

/// Transient membership view of a hosted lobby
///
/// Superseded by each poll; never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbySnapshot {
    pub lobby_id: LobbyId,
    pub total_members: usize,
    pub human_members: usize,
}

/// Match-completion signal carried by the session event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub lobby_id: LobbyId,
    /// True when the first-listed (home) side won
    pub home_side_won: bool,
}

/// One match row in the bracket
///
/// Seeded when a round begins; the winner is set exactly once and the row
/// is retained for the life of the tournament.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub round: u32,
    pub team1: TeamName,
    pub team2: Option<TeamName>,
    pub winner: Option<TeamName>,
    pub lobby_id: Option<LobbyId>,
}

impl MatchRecord {
    /// A BYE pairs one team against nobody; it auto-resolves without a lobby
    pub fn is_bye(&self) -> bool {
        self.team2.is_none()
    }
}

/// Status of a persisted lobby record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LobbyStatus {
    Active,
    Closed,
    Error,
}

/// Persisted record of an allocated lobby, keyed by owner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyRecord {
    pub id: Uuid,
    pub owner: String,
    pub lobby_id: LobbyId,
    pub pass_key: String,
    pub server_region: u32,
    pub game_mode: u32,
    pub match_id: Option<MatchId>,
    pub status: LobbyStatus,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Events emitted by a session client's remote link
#[derive(Debug, Clone)]
pub enum ClientEvent {
    Ready,
    Unready,
    Disconnected { message: String },
    /// The hosted lobby changed; callers should request a fresh member list
    LobbyUpdated,
    MemberList(LobbySnapshot),
    MatchCompleted(MatchOutcome),
}

/// Fire-and-forget notifications for the presentation sink
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NotifyEvent {
    LobbyCreated {
        owner: String,
        lobby_id: LobbyId,
        pass_key: String,
        match_id: Option<MatchId>,
    },
    RoundStarted {
        round: u32,
        matches: Vec<MatchRecord>,
    },
    RoundAdvanced {
        round: u32,
        matches: Vec<MatchRecord>,
    },
    MatchDecided {
        match_id: MatchId,
        winner: TeamName,
    },
    ChampionDecided {
        team: TeamName,
    },
    TournamentReset,
}

impl NotifyEvent {
    /// Short event name, used by recording sinks and logs
    pub fn kind(&self) -> &'static str {
        match self {
            NotifyEvent::LobbyCreated { .. } => "LobbyCreated",
            NotifyEvent::RoundStarted { .. } => "RoundStarted",
            NotifyEvent::RoundAdvanced { .. } => "RoundAdvanced",
            NotifyEvent::MatchDecided { .. } => "MatchDecided",
            NotifyEvent::ChampionDecided { .. } => "ChampionDecided",
            NotifyEvent::TournamentReset => "TournamentReset",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bye_detection() {
        let real = MatchRecord {
            id: 1,
            round: 1,
            team1: "Alpha".to_string(),
            team2: Some("Beta".to_string()),
            winner: None,
            lobby_id: None,
        };
        let bye = MatchRecord {
            id: 2,
            round: 1,
            team1: "Gamma".to_string(),
            team2: None,
            winner: Some("Gamma".to_string()),
            lobby_id: None,
        };
        assert!(!real.is_bye());
        assert!(bye.is_bye());
    }

    #[test]
    fn test_notify_event_kind() {
        let event = NotifyEvent::ChampionDecided {
            team: "Alpha".to_string(),
        };
        assert_eq!(event.kind(), "ChampionDecided");
    }
}
