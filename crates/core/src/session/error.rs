//! Error types for session drivers.

use thiserror::Error;

/// Failure of a single session capability call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A wait did not observe its condition in time.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// An element, window or resource could not be found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The portal refused the request (e.g. bad credentials).
    #[error("Rejected: {0}")]
    Rejected(String),

    /// Communication with the driver or portal failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// Short machine-readable kind, used in logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Timeout(_) => "timeout",
            SessionError::NotFound(_) => "not_found",
            SessionError::Rejected(_) => "rejected",
            SessionError::Transport(_) => "transport",
        }
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SessionError::Timeout(e.to_string())
        } else {
            SessionError::Transport(e.to_string())
        }
    }
}
