//! Error types for gwsync
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

/// Result type alias for gwsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for gwsync
#[derive(Error, Debug)]
pub enum Error {
    /// Domain source errors (fetching or parsing blocklists)
    #[error("Domain source error: {0}")]
    Source(String),

    /// Gateway errors (remote list/rule operations)
    #[error("Gateway error: {0}")]
    Gateway(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The candidate set is larger than the gateway allows
    #[error("Candidate set has {count} domains, exceeding the limit of {limit}")]
    QuotaExceeded {
        /// Number of domains in the candidate set
        count: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Rate limiting errors
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a domain source error
    pub fn source(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a gateway error
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a quota error
    pub fn quota_exceeded(count: usize, limit: usize) -> Self {
        Self::QuotaExceeded { count, limit }
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a rate limit error
    pub fn rate_limited(msg: impl Into<String>) -> Self {
        Self::RateLimited(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Whether this error was raised before any remote write happened
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::QuotaExceeded { .. } | Self::Config(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
