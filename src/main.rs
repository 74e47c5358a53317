//! Main entry point for the Bracket Host tournament service
//!
//! This is the production entry point that initializes and runs the
//! complete orchestration service with proper error handling, logging,
//! and graceful shutdown.

use anyhow::Result;
use bracket_host::config::AppConfig;
use bracket_host::metrics::{HealthServer, HealthServerConfig};
use bracket_host::notify::LogNotifier;
use bracket_host::service::{AppState, HealthCheck};
use bracket_host::session::SimulatedClientFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};

use clap::Parser;

/// Bracket Host - Single-Elimination Tournament Orchestration Service
#[derive(Parser)]
#[command(
    name = "bracket-host",
    version,
    about = "Runs knockout tournaments over a pool of lobby-hosting game-client sessions",
    long_about = "Bracket Host maintains a pool of authenticated game-client sessions, \
                 allocates password-protected lobbies for bracket matches, and advances a \
                 single-elimination bracket as match results arrive from the remote service."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Metrics port override
    #[arg(long, value_name = "PORT", help = "Override metrics server port")]
    metrics_port: Option<u16>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Run periodic health checks
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));

    while app_state.is_running() {
        interval.tick().await;

        match HealthCheck::check(app_state.clone()).await {
            Ok(health) => {
                info!(
                    "Health check: {} - {}/{} sessions ready, phase: {}",
                    health.status,
                    health.stats.sessions_ready,
                    health.stats.pool_size,
                    health.stats.tournament_phase
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("Bracket Host Tournament Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Metrics port: {}", config.service.metrics_port);
    info!("   Pool accounts: {}", config.session.accounts.len());
    info!("   Start threshold: {} humans", config.session.start_threshold);
    info!(
        "   Region/mode defaults: {}/{}",
        config.lobby.server_region, config.lobby.game_mode
    );
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(metrics_port) = args.metrics_port {
        config.service.metrics_port = metrics_port;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    // The in-process backend stands in for the real game service; embedders
    // supply their own SessionClientFactory through the library API
    let factory = SimulatedClientFactory::new();
    let notifier = Arc::new(LogNotifier::new());

    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone(), &factory, notifier) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    // Health and metrics endpoints
    let health_server = Arc::new(
        HealthServer::new(
            HealthServerConfig {
                port: config.service.metrics_port,
                host: "0.0.0.0".to_string(),
            },
            app_state.metrics(),
        )
        .with_app_state(app_state.clone()),
    );
    let server_task = {
        let health_server = health_server.clone();
        tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server error: {}", e);
            }
        })
    };

    let health_task = {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            health_check_task(app_state).await;
        })
    };

    info!("Bracket Host is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("Shutdown signal received, beginning graceful shutdown...");
    let shutdown = tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown());
    if shutdown.await.is_err() {
        warn!("Graceful shutdown timed out; exiting anyway");
    }

    if let Err(e) = health_server.stop().await {
        warn!("Failed to stop health server cleanly: {}", e);
    }
    health_task.abort();
    server_task.abort();

    info!("Shutdown complete");
    Ok(())
}
