//! Transcript-cleaning provider client error types.

use std::sync::Arc;

/// Errors from the LLM transcript-cleaning client.
#[derive(Debug, thiserror::Error)]
pub enum CleanerError {
    /// Missing ENGRAFT_CLEANER_API_KEY environment variable.
    #[error("missing API key: ENGRAFT_CLEANER_API_KEY not set")]
    MissingApiKey,

    /// Authentication failed (invalid API key).
    #[error("authentication failed: invalid API key")]
    AuthError,

    /// Rate limited by the provider.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),

    /// The model returned an empty completion.
    #[error("empty completion")]
    EmptyCompletion,
}

impl From<reqwest::Error> for CleanerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { CleanerError::Timeout } else { CleanerError::Network(Arc::new(err)) }
    }
}
