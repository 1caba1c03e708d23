//! Bible-text provider client error types.

use std::sync::Arc;

/// Errors from the Bible-text provider client.
#[derive(Debug, thiserror::Error)]
pub enum BibleError {
    /// Missing ENGRAFT_BIBLE_API_KEY environment variable.
    #[error("missing API key: ENGRAFT_BIBLE_API_KEY not set")]
    MissingApiKey,

    /// Authentication failed (invalid API key).
    #[error("authentication failed: invalid API key")]
    AuthError,

    /// The provider has no text for the requested passage.
    #[error("passage not found: {0}")]
    PassageNotFound(String),

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

    /// The provider answered with no verses.
    #[error("empty passage: {0}")]
    EmptyPassage(String),
}

impl From<reqwest::Error> for BibleError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { BibleError::Timeout } else { BibleError::Network(Arc::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BibleError::MissingApiKey;
        assert!(err.to_string().contains("API key"));

        let err = BibleError::PassageNotFound("Opinions 3:16".to_string());
        assert!(err.to_string().contains("not found"));
    }
}
