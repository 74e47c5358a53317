//! Main application configuration
//!
//! This module defines the primary configuration structures for the
//! bracket-host service, including environment variable loading and
//! validation.

use crate::types::Credentials;
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub service: ServiceSettings,
    pub session: SessionSettings,
    pub lobby: crate::config::lobby::LobbyDefaults,
}

/// Service-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSettings {
    /// Service name for logging and metrics
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Port for health and metrics endpoints
    pub metrics_port: u16,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,
}

/// Session pool and state-machine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Host account credentials making up the pool
    pub accounts: Vec<Credentials>,
    /// How long to wait for the remote coordinator to report ready
    pub ready_timeout_seconds: u64,
    /// Acknowledgment window for lobby creation
    pub create_ack_timeout_seconds: u64,
    /// Settle delay after leaving a prior lobby before creating a new one
    pub leave_settle_ms: u64,
    /// Settle delay after issuing leave+destroy during teardown
    pub teardown_settle_ms: u64,
    /// Base reconnect delay; grows linearly with the attempt count
    pub reconnect_base_delay_ms: u64,
    /// Cap on the reconnect delay
    pub reconnect_max_delay_ms: u64,
    /// Hard ceiling on reconnect attempts before the session goes fatal
    pub max_reconnect_attempts: u32,
    /// Membership poll interval while a lobby is active
    pub poll_interval_seconds: u64,
    /// Human-member count that triggers the start sequence
    pub start_threshold: usize,
    /// Delay between the start announcement and the launch command
    pub launch_countdown_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            service: ServiceSettings::default(),
            session: SessionSettings::default(),
            lobby: crate::config::lobby::LobbyDefaults::default(),
        }
    }
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            name: "bracket-host".to_string(),
            log_level: "info".to_string(),
            metrics_port: 8080,
            shutdown_timeout_seconds: 30,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            ready_timeout_seconds: 40,
            create_ack_timeout_seconds: 40,
            leave_settle_ms: 3000,
            teardown_settle_ms: 3000,
            reconnect_base_delay_ms: 5000,
            reconnect_max_delay_ms: 30000,
            max_reconnect_attempts: 5,
            poll_interval_seconds: 5,
            start_threshold: 10,
            launch_countdown_seconds: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables with fallback to defaults
    ///
    /// Accounts follow the `SESSION_ACCOUNTS=host1,host2` scheme with
    /// per-account `HOST1_USERNAME` / `HOST1_PASSWORD` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Service settings
        if let Ok(name) = env::var("SERVICE_NAME") {
            config.service.name = name;
        }
        if let Ok(log_level) = env::var("LOG_LEVEL") {
            config.service.log_level = log_level;
        }
        if let Ok(port) = env::var("METRICS_PORT") {
            config.service.metrics_port = port
                .parse()
                .map_err(|_| anyhow!("Invalid METRICS_PORT value: {}", port))?;
        }
        if let Ok(timeout) = env::var("SHUTDOWN_TIMEOUT_SECONDS") {
            config.service.shutdown_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid SHUTDOWN_TIMEOUT_SECONDS value: {}", timeout))?;
        }

        // Session settings
        config.session.accounts = load_accounts_from_env()?;
        if let Ok(timeout) = env::var("READY_TIMEOUT_SECONDS") {
            config.session.ready_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid READY_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(timeout) = env::var("CREATE_ACK_TIMEOUT_SECONDS") {
            config.session.create_ack_timeout_seconds = timeout
                .parse()
                .map_err(|_| anyhow!("Invalid CREATE_ACK_TIMEOUT_SECONDS value: {}", timeout))?;
        }
        if let Ok(attempts) = env::var("MAX_RECONNECT_ATTEMPTS") {
            config.session.max_reconnect_attempts = attempts
                .parse()
                .map_err(|_| anyhow!("Invalid MAX_RECONNECT_ATTEMPTS value: {}", attempts))?;
        }
        if let Ok(interval) = env::var("POLL_INTERVAL_SECONDS") {
            config.session.poll_interval_seconds = interval
                .parse()
                .map_err(|_| anyhow!("Invalid POLL_INTERVAL_SECONDS value: {}", interval))?;
        }
        if let Ok(threshold) = env::var("START_THRESHOLD") {
            config.session.start_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("Invalid START_THRESHOLD value: {}", threshold))?;
        }

        // Lobby defaults
        if let Ok(region) = env::var("DEFAULT_REGION") {
            config.lobby.server_region = region
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_REGION value: {}", region))?;
        }
        if let Ok(mode) = env::var("DEFAULT_GAME_MODE") {
            config.lobby.game_mode = mode
                .parse()
                .map_err(|_| anyhow!("Invalid DEFAULT_GAME_MODE value: {}", mode))?;
        }
        if let Ok(length) = env::var("PASS_KEY_LENGTH") {
            config.lobby.pass_key_length = length
                .parse()
                .map_err(|_| anyhow!("Invalid PASS_KEY_LENGTH value: {}", length))?;
        }

        validate_config(&config)?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        validate_config(&config)?;
        Ok(config)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.service.shutdown_timeout_seconds)
    }
}

impl SessionSettings {
    /// Get ready-wait timeout as Duration
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_seconds)
    }

    /// Get lobby-creation acknowledgment window as Duration
    pub fn create_ack_timeout(&self) -> Duration {
        Duration::from_millis(self.create_ack_timeout_seconds * 1000)
    }

    /// Get leave settle delay as Duration
    pub fn leave_settle(&self) -> Duration {
        Duration::from_millis(self.leave_settle_ms)
    }

    /// Get teardown settle delay as Duration
    pub fn teardown_settle(&self) -> Duration {
        Duration::from_millis(self.teardown_settle_ms)
    }

    /// Reconnect delay for the given attempt: capped linear growth
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let scaled = self.reconnect_base_delay_ms.saturating_mul(attempt as u64);
        Duration::from_millis(scaled.min(self.reconnect_max_delay_ms))
    }

    /// Get membership poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    /// Get launch countdown as Duration
    pub fn launch_countdown(&self) -> Duration {
        Duration::from_secs(self.launch_countdown_seconds)
    }
}

/// Load pool account credentials from environment variables
fn load_accounts_from_env() -> Result<Vec<Credentials>> {
    let Ok(raw) = env::var("SESSION_ACCOUNTS") else {
        return Ok(Vec::new());
    };

    let mut accounts = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let upper = tag.to_uppercase();
        let username = env::var(format!("{}_USERNAME", upper));
        let password = env::var(format!("{}_PASSWORD", upper));
        match (username, password) {
            (Ok(username), Ok(password)) => accounts.push(Credentials {
                account_tag: tag.to_string(),
                username,
                password,
            }),
            _ => {
                return Err(anyhow!(
                    "Account '{}' listed in SESSION_ACCOUNTS is missing {}_USERNAME or {}_PASSWORD",
                    tag,
                    upper,
                    upper
                ))
            }
        }
    }

    Ok(accounts)
}

/// Validate configuration values
pub fn validate_config(config: &AppConfig) -> Result<()> {
    // Validate log level
    match config.service.log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => {}
        _ => return Err(anyhow!("Invalid log level: {}", config.service.log_level)),
    }

    // Validate ports
    if config.service.metrics_port == 0 {
        return Err(anyhow!("Metrics port cannot be 0"));
    }

    // Validate timeouts
    if config.service.shutdown_timeout_seconds == 0 {
        return Err(anyhow!("Shutdown timeout must be greater than 0"));
    }
    if config.session.ready_timeout_seconds == 0 {
        return Err(anyhow!("Ready timeout must be greater than 0"));
    }
    if config.session.create_ack_timeout_seconds == 0 {
        return Err(anyhow!("Create ack timeout must be greater than 0"));
    }

    // Validate session settings
    if config.session.max_reconnect_attempts == 0 {
        return Err(anyhow!("Max reconnect attempts must be greater than 0"));
    }
    if config.session.reconnect_max_delay_ms < config.session.reconnect_base_delay_ms {
        return Err(anyhow!(
            "Reconnect max delay must not be below the base delay"
        ));
    }
    if config.session.start_threshold == 0 {
        return Err(anyhow!("Start threshold must be greater than 0"));
    }

    // Validate lobby defaults
    if config.lobby.pass_key_length == 0 {
        return Err(anyhow!("Pass key length must be greater than 0"));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_invalid_log_level_rejected() {
        let mut config = AppConfig::default();
        config.service.log_level = "verbose".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_reconnect_delay_capped_linear() {
        let settings = SessionSettings::default();
        assert_eq!(settings.reconnect_delay(1), Duration::from_millis(5000));
        assert_eq!(settings.reconnect_delay(3), Duration::from_millis(15000));
        // Cap kicks in past attempt six
        assert_eq!(settings.reconnect_delay(10), Duration::from_millis(30000));
    }

    #[test]
    fn test_zero_reconnect_ceiling_rejected() {
        let mut config = AppConfig::default();
        config.session.max_reconnect_attempts = 0;
        assert!(validate_config(&config).is_err());
    }
}
