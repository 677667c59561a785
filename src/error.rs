//! Error taxonomy shared by the store, the REST layer and the board.
//!
//! Every failure in this crate is scoped to the request that triggered it, so
//! the variants describe what went wrong with that request rather than how
//! the process should react.

use thiserror::Error;

/// Result type for task store and board operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Input rejected by store validation (empty title, non-positive hours, empty update).
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown task, note, time entry or project id.
    #[error("not found: {0}")]
    NotFound(String),

    /// Conflicting mutation or an operation not allowed in the current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Transport failure or timeout talking to a remote store.
    #[error("network error: {0}")]
    Network(String),

    /// Missing or invalid bearer token.
    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serde(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn not_found(resource: &str, id: u64) -> Self {
        Error::NotFound(format!("{resource} {id}"))
    }

    /// Short machine-friendly name of the variant, used in logs and notifications.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "ValidationError",
            Error::NotFound(_) => "NotFound",
            Error::Conflict(_) => "Conflict",
            Error::Network(_) => "NetworkError",
            Error::Auth(_) => "AuthError",
            Error::Io(_) => "IoError",
            Error::Serde(_) => "SerdeError",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serde(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Error::Serde(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}
