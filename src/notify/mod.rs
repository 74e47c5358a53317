//! Presentation sink for tournament notifications
//!
//! Notifications are fire-and-forget: a failing sink is logged and never
//! affects bracket or pool state.

use crate::error::Result;
use crate::types::NotifyEvent;
use async_trait::async_trait;
use tracing::info;

/// Trait for delivering tournament notifications
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one notification event
    async fn notify(&self, event: NotifyEvent) -> Result<()>;
}

/// Notifier that writes events to the service log
///
/// Used when no chat-platform sink is wired in.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<()> {
        match &event {
            NotifyEvent::LobbyCreated {
                owner,
                lobby_id,
                match_id,
                ..
            } => info!(
                "Lobby created - owner: '{}', lobby: {}, match: {:?}",
                owner, lobby_id, match_id
            ),
            NotifyEvent::RoundStarted { round, matches } => {
                info!("Round {} started with {} matches", round, matches.len())
            }
            NotifyEvent::RoundAdvanced { round, matches } => {
                info!("Advanced to round {} with {} matches", round, matches.len())
            }
            NotifyEvent::MatchDecided { match_id, winner } => {
                info!("Match #{} decided - winner: {}", match_id, winner)
            }
            NotifyEvent::ChampionDecided { team } => {
                info!("Tournament concluded - champion: {}", team)
            }
            NotifyEvent::TournamentReset => info!("Tournament reset"),
        }
        Ok(())
    }
}

/// Recording notifier for tests
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: std::sync::Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded events (for testing)
    pub fn recorded_events(&self) -> Vec<NotifyEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Number of recorded events with the given kind (for testing)
    pub fn count_events_of_kind(&self, kind: &str) -> usize {
        self.recorded_events()
            .iter()
            .filter(|event| event.kind() == kind)
            .count()
    }

    /// Clear recorded events (for testing)
    pub fn clear_events(&self) {
        if let Ok(mut events) = self.events.lock() {
            events.clear();
        }
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<()> {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_recording_notifier_counts_kinds() {
        let notifier = RecordingNotifier::new();
        notifier
            .notify(NotifyEvent::ChampionDecided {
                team: "Alpha".to_string(),
            })
            .await
            .unwrap();
        notifier.notify(NotifyEvent::TournamentReset).await.unwrap();

        assert_eq!(notifier.count_events_of_kind("ChampionDecided"), 1);
        assert_eq!(notifier.count_events_of_kind("TournamentReset"), 1);
        assert_eq!(notifier.count_events_of_kind("RoundStarted"), 0);

        notifier.clear_events();
        assert!(notifier.recorded_events().is_empty());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_all_events() {
        let notifier = LogNotifier::new();
        notifier
            .notify(NotifyEvent::MatchDecided {
                match_id: 1,
                winner: "Alpha".to_string(),
            })
            .await
            .unwrap();
    }
}
