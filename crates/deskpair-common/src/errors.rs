use std::path::PathBuf;

use crate::id::{ConnectionId, SessionId};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("config parse error: {0}")]
    ParseError(String),

    #[error("config validation error: {0}")]
    ValidationError(String),
}

/// Failures of the pairing core. Neither is fatal to the connection that hit it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("connection {0} is not bound to a session")]
    NotBound(ConnectionId),
}

impl RelayError {
    /// Machine-readable code sent to clients in error frames.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::SessionNotFound(_) => "session_not_found",
            RelayError::NotBound(_) => "not_bound",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeskpairError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
