//! Speech-to-text provider client error types.

use std::sync::Arc;

/// Errors from the speech-to-text provider client.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    /// Missing ENGRAFT_SPEECH_API_KEY environment variable.
    #[error("missing API key: ENGRAFT_SPEECH_API_KEY not set")]
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

    /// The transcription job did not finish within the poll budget.
    #[error("transcription timed out after {attempts} status polls")]
    PollBudgetExhausted { attempts: u32 },

    /// The provider reported the transcription job as failed.
    #[error("transcription job failed: {0}")]
    JobFailed(String),

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for SpeechError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { SpeechError::Timeout } else { SpeechError::Network(Arc::new(err)) }
    }
}
