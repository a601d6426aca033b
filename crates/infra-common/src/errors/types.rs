use thiserror::Error;

/// Result type for infrastructure operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the shared infrastructure
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid or unusable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Logging could not be installed
    #[error("Logging error: {0}")]
    Logging(String),

    /// No tokio runtime is available to spawn onto
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// The worker pool has been shut down
    #[error("Worker pool '{0}' is shut down")]
    PoolShutdown(String),

    /// I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error message with context attached
    #[error("{0}")]
    Custom(String),
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Custom(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Custom(s)
    }
}
