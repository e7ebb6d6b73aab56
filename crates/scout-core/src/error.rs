//! Error types for paperscout.

use thiserror::Error;

/// Result type alias using paperscout's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for paperscout operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Temporary upstream failure (network blip, rate limit, 5xx). Retryable.
    #[error("Transient error: {0}")]
    Transient(String),

    /// An external call exceeded its deadline. Retryable.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Paper source fetch failed (non-retryable, or retries exhausted)
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Inference/generation failed
    #[error("Inference error: {0}")]
    Inference(String),

    /// Task pipeline error
    #[error("Task error: {0}")]
    Task(String),

    /// The task was cancelled by its owner
    #[error("Task cancelled")]
    Cancelled,

    /// Persistence of the category store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Authentication/authorization failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether the failed operation may succeed if attempted again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Transient(_) | Error::Timeout(_))
    }

    /// Whether the error comes from missing or invalid credentials/settings.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_) | Error::Unauthorized(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_connect() || e.is_request() {
            Error::Transient(e.to_string())
        } else {
            Error::Inference(e.to_string())
        }
    }
}
