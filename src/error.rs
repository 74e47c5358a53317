//! Error types for the tournament orchestration service
//!
//! This module defines all error types using anyhow for consistent error handling
//! throughout the application.

/// Result type alias for convenience
pub type Result<T> = anyhow::Result<T>;

/// Custom error types for specific orchestration scenarios
///
/// Exhaustion and timeout are distinct variants on purpose: an operator
/// seeing `SessionPoolExhausted` should add capacity or wait, while a
/// `OperationTimeout` points at the remote service, not at local state.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("Authentication rejected for account '{account}'")]
    AuthRejected { account: String },

    #[error("Transport failure on account '{account}': {message}")]
    TransportFailure { account: String, message: String },

    #[error("Reconnect ceiling reached for account '{account}' after {attempts} attempts")]
    ReconnectCeiling { account: String, attempts: u32 },

    #[error("Operation '{operation}' timed out after {seconds}s")]
    OperationTimeout { operation: String, seconds: u64 },

    #[error("Remote rejected request: {message}")]
    ProtocolRejection { message: String },

    #[error("Session '{account}' is not ready")]
    SessionNotReady { account: String },

    #[error("No free session available in the pool")]
    SessionPoolExhausted,

    #[error("Owner '{owner}' already has an active lobby")]
    LobbyAlreadyActive { owner: String },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid tournament phase transition: {from} -> {requested}")]
    InvalidPhaseTransition { from: String, requested: String },

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Internal service error: {message}")]
    InternalError { message: String },
}

impl OrchestratorError {
    /// True when the error means the session can never recover without
    /// manual intervention (bad credentials, retry ceiling).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrchestratorError::AuthRejected { .. } | OrchestratorError::ReconnectCeiling { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        assert!(OrchestratorError::AuthRejected {
            account: "host1".to_string()
        }
        .is_terminal());
        assert!(OrchestratorError::ReconnectCeiling {
            account: "host1".to_string(),
            attempts: 5
        }
        .is_terminal());
        assert!(!OrchestratorError::TransportFailure {
            account: "host1".to_string(),
            message: "socket reset".to_string()
        }
        .is_terminal());
        assert!(!OrchestratorError::SessionPoolExhausted.is_terminal());
    }

    #[test]
    fn test_exhaustion_and_timeout_are_distinguishable() {
        let exhausted = OrchestratorError::SessionPoolExhausted.to_string();
        let timeout = OrchestratorError::OperationTimeout {
            operation: "create_lobby".to_string(),
            seconds: 40,
        }
        .to_string();
        assert_ne!(exhausted, timeout);
        assert!(timeout.contains("40s"));
    }
}
