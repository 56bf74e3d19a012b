//! Custom error types for Crane
//!
//! Two layers: [`CallError`] describes a single provider call and never
//! crosses the agent boundary as a panic; [`CraneError`] is what the
//! conversation layer and the stores return.

use std::time::Duration;

use thiserror::Error;

/// Failure of one agent call against its provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// Provider temporarily unavailable (HTTP 503 and friends)
    #[error("transient provider error (HTTP {status}): {body}")]
    Transient { status: u16, body: String },

    /// Provider rejected the request (400/401/403/404)
    #[error("fatal provider error (HTTP {status}): {body}")]
    Fatal { status: u16, body: String },

    /// Connection could not be established or was dropped
    #[error("network error: {0}")]
    Network(String),

    /// The call did not complete within the agent's timeout
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The provider answered 2xx but the payload could not be unwrapped
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl CallError {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        match status {
            400 | 401 | 403 | 404 => Self::Fatal { status, body },
            _ => Self::Transient { status, body },
        }
    }

    /// Whether another attempt may be made within the agent's retry loop
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Main error type for Crane operations
#[derive(Error, Debug)]
pub enum CraneError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Durable storage errors (counters, transcripts)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Long-term context could not be read for a non-initial iteration
    #[error("Retrieval read error: {0}")]
    RetrievalRead(String),

    /// Summary could not be pushed to the retrieval store
    #[error("Retrieval write error: {0}")]
    RetrievalWrite(String),

    /// Moderator failed on every summarization attempt
    #[error("The moderator failed to provide a valid response after {attempts} attempts")]
    SummarizationExhausted { attempts: usize },

    /// Feedback agent failed on every attempt
    #[error("The feedback agent failed to provide a valid response after {attempts} attempts")]
    FeedbackExhausted { attempts: usize },

    /// Human participant input failed
    #[error("Human input error: {0}")]
    Human(String),

    /// JSON parsing errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type for Crane operations
pub type Result<T> = std::result::Result<T, CraneError>;

impl CraneError {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }
}
