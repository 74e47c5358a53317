//! Main application state and service coordination
//!
//! This module contains the production AppState that wires the session
//! pool, persistence, lobby allocator, and bracket engine together, and
//! owns the background tasks: the match-completion pump and the metrics
//! refresher.

use crate::bracket::engine::BracketEngine;
use crate::bracket::store::{InMemoryMatchStore, MatchStore};
use crate::config::{validate_config, AppConfig};
use crate::error::Result;
use crate::lobby::allocator::LobbyAllocator;
use crate::lobby::store::{InMemoryLobbyStore, LobbyStore};
use crate::metrics::MetricsCollector;
use crate::notify::Notifier;
use crate::session::client::SessionClientFactory;
use crate::session::pool::SessionPool;
use crate::types::{LobbyStatus, MatchOutcome, NotifyEvent};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, Instant};
use tracing::{error, info, warn};

/// Interval between metrics gauge refreshes
const METRICS_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Notifier wrapper that feeds the metrics counters before forwarding
struct MeteredNotifier {
    inner: Arc<dyn Notifier>,
    metrics: Arc<MetricsCollector>,
}

#[async_trait]
impl Notifier for MeteredNotifier {
    async fn notify(&self, event: NotifyEvent) -> Result<()> {
        match &event {
            NotifyEvent::LobbyCreated { .. } => self.metrics.record_lobby_created(),
            NotifyEvent::RoundStarted { .. } => self.metrics.record_tournament_started(),
            NotifyEvent::RoundAdvanced { .. } => self.metrics.record_round_advanced(),
            NotifyEvent::MatchDecided { .. } => self.metrics.record_match_decided(),
            NotifyEvent::ChampionDecided { .. } => self.metrics.record_tournament_concluded(),
            NotifyEvent::TournamentReset => {}
        }
        self.inner.notify(event).await
    }
}

/// Production application state
pub struct AppState {
    config: AppConfig,
    pool: Arc<SessionPool>,
    lobby_store: Arc<dyn LobbyStore>,
    match_store: Arc<dyn MatchStore>,
    allocator: Arc<LobbyAllocator>,
    engine: Arc<BracketEngine>,
    metrics: Arc<MetricsCollector>,
    completions: Mutex<Option<mpsc::UnboundedReceiver<MatchOutcome>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
    started_at: Instant,
}

impl AppState {
    /// Wire up all components from configuration
    ///
    /// The factory decides which backend the sessions talk to; the
    /// notifier receives tournament events after metrics see them.
    pub fn new(
        config: AppConfig,
        factory: &dyn SessionClientFactory,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Arc<Self>> {
        validate_config(&config)?;

        let metrics = Arc::new(MetricsCollector::new()?);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let pool = Arc::new(SessionPool::with_metrics(
            factory,
            &config.session,
            completions_tx,
            metrics.clone(),
        ));
        let lobby_store: Arc<dyn LobbyStore> = Arc::new(InMemoryLobbyStore::new());
        let match_store: Arc<dyn MatchStore> = Arc::new(InMemoryMatchStore::new());

        let metered: Arc<dyn Notifier> = Arc::new(MeteredNotifier {
            inner: notifier,
            metrics: metrics.clone(),
        });

        let allocator = Arc::new(LobbyAllocator::with_metrics(
            pool.clone(),
            lobby_store.clone(),
            match_store.clone(),
            metered.clone(),
            config.lobby.clone(),
            metrics.clone(),
        ));
        let engine = Arc::new(BracketEngine::new(
            match_store.clone(),
            allocator.clone(),
            metered,
        ));

        Ok(Arc::new(Self {
            config,
            pool,
            lobby_store,
            match_store,
            allocator,
            engine,
            metrics,
            completions: Mutex::new(Some(completions_rx)),
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            started_at: Instant::now(),
        }))
    }

    /// Connect the pool and launch the background tasks
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        info!(
            "Starting {} with a pool of {} sessions",
            self.config.service.name,
            self.pool.size()
        );

        let ready = self.pool.connect_all().await;
        if ready == 0 && self.pool.size() > 0 {
            warn!("No session reached ready; lobby hosting is unavailable until one recovers");
        }

        self.running.store(true, Ordering::SeqCst);
        self.spawn_completion_pump();
        self.spawn_metrics_refresher();
        info!("Service started ({} sessions ready)", ready);
        Ok(())
    }

    /// Whether the service is accepting work
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Service configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Session pool
    pub fn pool(&self) -> Arc<SessionPool> {
        self.pool.clone()
    }

    /// Lobby allocator
    pub fn allocator(&self) -> Arc<LobbyAllocator> {
        self.allocator.clone()
    }

    /// Bracket engine
    pub fn engine(&self) -> Arc<BracketEngine> {
        self.engine.clone()
    }

    /// Lobby record store
    pub fn lobby_store(&self) -> Arc<dyn LobbyStore> {
        self.lobby_store.clone()
    }

    /// Match store
    pub fn match_store(&self) -> Arc<dyn MatchStore> {
        self.match_store.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> Arc<MetricsCollector> {
        self.metrics.clone()
    }

    /// Graceful shutdown: sweep lobbies, close records, stop everything
    ///
    /// Best-effort throughout; a failing step is logged and the shutdown
    /// continues.
    pub async fn shutdown(&self) {
        info!("Shutting down service");
        self.running.store(false, Ordering::SeqCst);

        // Close every active record before tearing down the remote lobbies
        match self.lobby_store.all_records() {
            Ok(records) => {
                for record in records
                    .iter()
                    .filter(|r| r.status == LobbyStatus::Active)
                {
                    if let Err(e) = self.lobby_store.mark_closed(&record.owner) {
                        warn!(
                            "Failed to close lobby record for '{}': {}",
                            record.owner, e
                        );
                    }
                    self.metrics.record_lobby_destroyed();
                }
            }
            Err(e) => warn!("Failed to enumerate lobby records during shutdown: {}", e),
        }

        self.pool.destroy_all_lobbies().await;
        self.pool.shutdown_all().await;

        if let Ok(mut tasks) = self.tasks.lock() {
            for handle in tasks.drain(..) {
                handle.abort();
            }
        }

        info!("Service shutdown complete");
    }

    /// Drain match completions into the bracket engine, one at a time
    ///
    /// A single consumer serializes progression, so two lobbies finishing
    /// together cannot both seed the next round.
    fn spawn_completion_pump(self: &Arc<Self>) {
        let Some(mut rx) = self
            .completions
            .lock()
            .ok()
            .and_then(|mut slot| slot.take())
        else {
            warn!("Completion pump already running");
            return;
        };

        let state = Arc::clone(self);
        let handle = tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                if let Err(e) = state.engine.on_match_finished(outcome).await {
                    error!("Failed to process match completion: {}", e);
                }
            }
            info!("Completion pump finished - all senders dropped");
        });
        self.push_task(handle);
    }

    fn spawn_metrics_refresher(self: &Arc<Self>) {
        let state = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(METRICS_REFRESH_INTERVAL);
            loop {
                ticker.tick().await;
                state.refresh_gauges();
            }
        });
        self.push_task(handle);
    }

    fn refresh_gauges(&self) {
        self.metrics.update_pool_gauges(
            self.pool.size(),
            self.pool.ready_count(),
            self.pool.busy_count(),
        );
        self.metrics
            .service()
            .uptime_seconds
            .set(self.started_at.elapsed().as_secs() as i64);

        if let Ok(records) = self.lobby_store.all_records() {
            let active = records
                .iter()
                .filter(|r| r.status == LobbyStatus::Active)
                .count();
            self.metrics.lobby().active_lobbies.set(active as i64);
        }

        let status = if !self.is_running() || self.pool.ready_count() == 0 {
            0
        } else if self.pool.ready_count() < self.pool.size() {
            1
        } else {
            2
        };
        self.metrics.update_health_status(status);
    }

    fn push_task(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionSettings;
    use crate::notify::RecordingNotifier;
    use crate::session::client::SimulatedClientFactory;
    use crate::types::Credentials;

    fn test_config(hosts: usize) -> AppConfig {
        let mut config = AppConfig::default();
        config.session = SessionSettings {
            accounts: (1..=hosts)
                .map(|n| Credentials {
                    account_tag: format!("host{}", n),
                    username: format!("host{}", n),
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
        };
        config
    }

    #[tokio::test]
    async fn test_startup_and_shutdown() {
        let factory = SimulatedClientFactory::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let app = AppState::new(test_config(2), &factory, notifier).unwrap();

        app.start().await.unwrap();
        assert!(app.is_running());
        assert_eq!(app.pool().ready_count(), 2);

        app.shutdown().await;
        assert!(!app.is_running());
    }

    #[tokio::test]
    async fn test_completion_pump_reaches_engine() {
        let factory = SimulatedClientFactory::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let app = AppState::new(test_config(2), &factory, notifier.clone()).unwrap();
        app.start().await.unwrap();

        app.engine()
            .start(vec!["Alpha".to_string(), "Beta".to_string()])
            .await
            .unwrap();

        // The winning signal travels client -> session -> pump -> engine
        let client = &factory.clients()[0];
        client.complete_match(true);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(notifier.count_events_of_kind("MatchDecided"), 1);
        assert_eq!(notifier.count_events_of_kind("ChampionDecided"), 1);

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_sweep_closes_records() {
        let factory = SimulatedClientFactory::new();
        let notifier = Arc::new(RecordingNotifier::new());
        let app = AppState::new(test_config(1), &factory, notifier).unwrap();
        app.start().await.unwrap();

        app.allocator()
            .allocate("alice", "Alpha vs Beta", None)
            .await
            .unwrap();
        app.shutdown().await;

        assert!(app
            .lobby_store()
            .find_active_by_owner("alice")
            .unwrap()
            .is_none());
    }
}
