//! Single-elimination bracket engine
//!
//! Owns the tournament phase machine and round progression. Completion
//! events arrive on a single pump task, so progression for one round runs
//! at most once per event; the atomic winner write makes duplicate events
//! harmless even so.

use crate::bracket::store::MatchStore;
use crate::error::{OrchestratorError, Result};
use crate::lobby::allocator::LobbyAllocator;
use crate::notify::Notifier;
use crate::types::{MatchOutcome, MatchRecord, NotifyEvent, TeamName, TournamentPhase};
use crate::utils::match_title;
use rand::seq::SliceRandom;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

#[derive(Debug)]
struct EngineState {
    phase: TournamentPhase,
    roster: Vec<TeamName>,
    current_round: u32,
}

/// Tournament phase machine and round progression
pub struct BracketEngine {
    matches: Arc<dyn MatchStore>,
    allocator: Arc<LobbyAllocator>,
    notifier: Arc<dyn Notifier>,
    state: RwLock<EngineState>,
}

impl BracketEngine {
    pub fn new(
        matches: Arc<dyn MatchStore>,
        allocator: Arc<LobbyAllocator>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            matches,
            allocator,
            notifier,
            state: RwLock::new(EngineState {
                phase: TournamentPhase::Idle,
                roster: Vec::new(),
                current_round: 0,
            }),
        }
    }

    /// Current tournament phase
    pub fn phase(&self) -> TournamentPhase {
        self.state
            .read()
            .map(|s| s.phase)
            .unwrap_or(TournamentPhase::Idle)
    }

    /// Teams registered so far, in registration order
    pub fn registered_teams(&self) -> Vec<TeamName> {
        self.state
            .read()
            .map(|s| s.roster.clone())
            .unwrap_or_default()
    }

    /// All match rows, ordered by round then seed
    pub fn bracket(&self) -> Result<Vec<MatchRecord>> {
        self.matches.all_matches()
    }

    /// Open team registration; valid only from Idle
    ///
    /// Opening discards any roster left over from a previous tournament.
    pub fn open_registration(&self) -> Result<()> {
        let mut state = self.write_state()?;
        if state.phase != TournamentPhase::Idle {
            return Err(self.bad_transition(state.phase, TournamentPhase::Registration));
        }
        state.phase = TournamentPhase::Registration;
        state.roster.clear();
        info!("Team registration opened");
        Ok(())
    }

    /// Register a team; valid only while registration is open
    pub fn register_team(&self, team: &str) -> Result<()> {
        let mut state = self.write_state()?;
        if state.phase != TournamentPhase::Registration {
            return Err(self.bad_transition(state.phase, TournamentPhase::Registration));
        }
        if state.roster.iter().any(|t| t == team) {
            return Err(OrchestratorError::ConfigurationError {
                message: format!("Team '{}' is already registered", team),
            }
            .into());
        }
        state.roster.push(team.to_string());
        info!("Team '{}' registered ({} total)", team, state.roster.len());
        Ok(())
    }

    /// Close registration, returning to Idle with the roster retained
    pub fn close_registration(&self) -> Result<()> {
        let mut state = self.write_state()?;
        if state.phase != TournamentPhase::Registration {
            return Err(self.bad_transition(state.phase, TournamentPhase::Idle));
        }
        state.phase = TournamentPhase::Idle;
        info!("Team registration closed with {} teams", state.roster.len());
        Ok(())
    }

    /// Seed round one from the given teams and enter Running
    ///
    /// Rows left over from a previous tournament are discarded first. The
    /// seeding is shuffled, consecutive teams are paired, and an odd
    /// leftover gets a BYE that auto-wins with no lobby. Rows are
    /// persisted before any lobby is requested; a pairing whose lobby
    /// cannot be allocated stays scheduled and is only logged.
    pub async fn start(&self, teams: Vec<TeamName>) -> Result<()> {
        {
            let state = self.read_state()?;
            if state.phase != TournamentPhase::Idle {
                return Err(self.bad_transition(state.phase, TournamentPhase::Running));
            }
        }
        if teams.len() < 2 {
            return Err(OrchestratorError::ConfigurationError {
                message: format!("A bracket needs at least two teams, got {}", teams.len()),
            }
            .into());
        }

        // Decided rows from the last bracket must never seed into this one
        self.matches.clear()?;

        let mut seeding = teams;
        seeding.shuffle(&mut rand::thread_rng());
        info!("Starting tournament with {} teams", seeding.len());

        let rows = self.seed_round(1, &seeding)?;

        {
            let mut state = self.write_state()?;
            state.phase = TournamentPhase::Running;
            state.current_round = 1;
        }

        self.allocate_round_lobbies(&rows).await;
        self.notify_quietly(NotifyEvent::RoundStarted {
            round: 1,
            matches: rows,
        })
        .await;
        Ok(())
    }

    /// Consume one match-completion signal
    ///
    /// Ignored outside Running and for unknown lobbies. The winner write
    /// is first-writer-wins: a duplicate signal neither overwrites the
    /// result nor re-runs round progression.
    pub async fn on_match_finished(&self, outcome: MatchOutcome) -> Result<()> {
        if self.phase() != TournamentPhase::Running {
            warn!(
                "Ignoring completion for lobby {} - no tournament running",
                outcome.lobby_id
            );
            return Ok(());
        }

        let Some(row) = self.matches.find_by_lobby(&outcome.lobby_id)? else {
            warn!(
                "Ignoring completion for unknown lobby {}",
                outcome.lobby_id
            );
            return Ok(());
        };

        let Some(team2) = row.team2.clone() else {
            warn!("Ignoring completion for BYE match #{}", row.id);
            return Ok(());
        };
        let winner = if outcome.home_side_won {
            row.team1.clone()
        } else {
            team2
        };

        if !self.matches.set_winner_if_unset(row.id, winner.clone())? {
            debug!(
                "Duplicate completion for match #{} ignored (winner already set)",
                row.id
            );
            return Ok(());
        }

        info!("Match #{} decided - winner: '{}'", row.id, winner);
        self.notify_quietly(NotifyEvent::MatchDecided {
            match_id: row.id,
            winner,
        })
        .await;

        // Free the hosting session before the next round asks for lobbies
        if let Err(e) = self.allocator.release(&format!("match-{}", row.id)).await {
            warn!("Failed to release lobby for match #{}: {}", row.id, e);
        }

        self.advance_if_round_complete(row.round).await
    }

    /// Admin reset: clear the bracket and return to Idle from any phase
    pub async fn reset(&self) -> Result<()> {
        self.matches.clear()?;
        {
            let mut state = self.write_state()?;
            state.phase = TournamentPhase::Idle;
            state.roster.clear();
            state.current_round = 0;
        }
        info!("Tournament reset");
        self.notify_quietly(NotifyEvent::TournamentReset).await;
        Ok(())
    }

    // ---- progression internals ----

    async fn advance_if_round_complete(&self, round: u32) -> Result<()> {
        if self.matches.unresolved_in_round(round)? > 0 {
            return Ok(());
        }
        // A racing event may already have seeded the next round
        if !self.matches.matches_in_round(round + 1)?.is_empty() {
            return Ok(());
        }

        // Winners in ascending match-id order; seeding is never re-ranked
        let winners: Vec<TeamName> = self
            .matches
            .matches_in_round(round)?
            .into_iter()
            .filter_map(|row| row.winner)
            .collect();

        if winners.len() < 2 {
            let champion = winners.into_iter().next().unwrap_or_default();
            info!("Tournament concluded - champion: '{}'", champion);
            {
                let mut state = self.write_state()?;
                state.phase = TournamentPhase::Idle;
                state.current_round = 0;
            }
            self.notify_quietly(NotifyEvent::ChampionDecided { team: champion })
                .await;
            return Ok(());
        }

        let next_round = round + 1;
        info!(
            "Round {} complete - advancing {} winners to round {}",
            round,
            winners.len(),
            next_round
        );

        let rows = self.seed_round(next_round, &winners)?;
        {
            let mut state = self.write_state()?;
            state.current_round = next_round;
        }

        self.allocate_round_lobbies(&rows).await;
        self.notify_quietly(NotifyEvent::RoundAdvanced {
            round: next_round,
            matches: rows,
        })
        .await;
        Ok(())
    }

    /// Persist one round's rows: consecutive pairs, odd leftover is a BYE
    fn seed_round(&self, round: u32, teams: &[TeamName]) -> Result<Vec<MatchRecord>> {
        for pair in teams.chunks(2) {
            match pair {
                [team1, team2] => {
                    self.matches
                        .insert_match(round, team1.clone(), Some(team2.clone()), None)?;
                }
                [leftover] => {
                    // BYE auto-wins at seeding time and never gets a lobby
                    info!("Team '{}' receives a round-{} BYE", leftover, round);
                    self.matches.insert_match(
                        round,
                        leftover.clone(),
                        None,
                        Some(leftover.clone()),
                    )?;
                }
                _ => unreachable!("chunks(2) yields one- or two-element slices"),
            }
        }
        self.matches.matches_in_round(round)
    }

    /// Request a lobby per non-BYE row; failures are logged and skipped
    async fn allocate_round_lobbies(&self, rows: &[MatchRecord]) {
        for row in rows {
            let Some(team2) = row.team2.as_deref() else {
                continue;
            };
            let owner = format!("match-{}", row.id);
            let title = match_title(&row.team1, team2);
            if let Err(e) = self.allocator.allocate(&owner, &title, Some(row.id)).await {
                warn!(
                    "Lobby allocation for match #{} failed; match stays scheduled: {}",
                    row.id, e
                );
            }
        }
    }

    async fn notify_quietly(&self, event: NotifyEvent) {
        if let Err(e) = self.notifier.notify(event).await {
            warn!("Notification delivery failed: {}", e);
        }
    }

    fn bad_transition(&self, from: TournamentPhase, requested: TournamentPhase) -> anyhow::Error {
        OrchestratorError::InvalidPhaseTransition {
            from: from.to_string(),
            requested: requested.to_string(),
        }
        .into()
    }

    fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, EngineState>> {
        self.state.read().map_err(|_| {
            OrchestratorError::InternalError {
                message: "Bracket engine state lock poisoned".to_string(),
            }
            .into()
        })
    }

    fn write_state(&self) -> Result<std::sync::RwLockWriteGuard<'_, EngineState>> {
        self.state.write().map_err(|_| {
            OrchestratorError::InternalError {
                message: "Bracket engine state lock poisoned".to_string(),
            }
            .into()
        })
    }
}
