//! Error types for the NPAC adapter core

use thiserror::Error;

/// Result type for adapter operations
pub type NpacResult<T> = std::result::Result<T, NpacError>;

/// Errors raised by the adapter core and its collaborators
///
/// Protocol-level failures (failure statuses, timeouts, stale replies) are not
/// errors in this sense: handlers turn them into retries or log lines. These
/// variants cover collaborator calls and setup.
#[derive(Error, Debug)]
pub enum NpacError {
    /// Region id outside the fixed NPAC region set
    #[error("Invalid region id: {0}")]
    InvalidRegion(u8),

    /// Invalid adapter configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The gateway could not accept an outbound request
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Reading or writing the last notification time failed
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Queue status bookkeeping failed
    #[error("Queue error: {0}")]
    Queue(String),

    /// Downstream processing rejected a reply
    #[error("Processing error: {0}")]
    Processing(String),

    /// No session matched the given id or SPID
    #[error("No session found: {0}")]
    SessionNotFound(String),

    /// A reply could not be decoded
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    #[error("Infrastructure error: {0}")]
    Infra(#[from] infra_common::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl From<&str> for NpacError {
    fn from(s: &str) -> Self {
        NpacError::Other(s.to_string())
    }
}

impl From<String> for NpacError {
    fn from(s: String) -> Self {
        NpacError::Other(s)
    }
}
