//! LLM transcript-cleaning client.
//!
//! Speech-to-text output of recited scripture is full of homophone mistakes
//! ("alter" for "altar") and missing punctuation. The cleaner asks an LLM to
//! repair transcription artifacts using the reference passage for context,
//! without "correcting" the speaker's actual recitation mistakes, which the
//! grading step downstream needs to see.

pub mod error;

pub use error::CleanerError;

use reqwest::header;
use serde::Deserialize;
use std::time::Duration;

/// Default base URL for the cleaning provider.
const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Default model.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "engraft/0.1";

const SYSTEM_PROMPT: &str = "You clean up speech-to-text transcripts of scripture recitations. \
Fix mis-heard words, punctuation, and casing using the reference passage for context. \
Preserve what the speaker actually said: do not add, remove, or correct words to match the reference. \
Reply with the cleaned transcript only.";

/// Cleaning provider client configuration.
#[derive(Debug, Clone)]
pub struct CleanerConfig {
    /// API key for the cleaning provider.
    pub api_key: String,
    /// Base URL (default: https://api.openai.com/v1).
    pub base_url: String,
    /// Model name.
    pub model: String,
    /// Request timeout (default: 20s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl CleanerConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads ENGRAFT_CLEANER_API_KEY from environment. Returns error if not set.
    pub fn from_env() -> Result<Self, CleanerError> {
        let api_key = std::env::var("ENGRAFT_CLEANER_API_KEY").map_err(|_| CleanerError::MissingApiKey)?;

        Ok(Self { api_key, ..Default::default() })
    }
}

/// Transcript-cleaning abstraction consumed by the recording orchestrator.
#[async_trait::async_trait]
pub trait TranscriptCleaner: Send + Sync {
    /// Clean a raw transcript given the passage the user was reciting.
    async fn clean(&self, transcript: &str, reference_text: &str) -> Result<String, CleanerError>;
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

/// Build the user message for one cleaning request.
fn cleaning_prompt(transcript: &str, reference_text: &str) -> String {
    format!("Reference passage:\n{reference_text}\n\nRaw transcript:\n{transcript}")
}

/// LLM cleaning provider API client.
#[derive(Debug, Clone)]
pub struct CleanerClient {
    http: reqwest::Client,
    config: CleanerConfig,
}

impl CleanerClient {
    /// Create a new cleaner client with the given configuration.
    pub fn new(config: CleanerConfig) -> Result<Self, CleanerError> {
        if config.api_key.is_empty() {
            return Err(CleanerError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| CleanerError::Network(std::sync::Arc::new(e)))?;

        Ok(Self { http, config })
    }

    /// Create a new cleaner client from environment variables.
    pub fn from_env() -> Result<Self, CleanerError> {
        Self::new(CleanerConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl TranscriptCleaner for CleanerClient {
    async fn clean(&self, transcript: &str, reference_text: &str) -> Result<String, CleanerError> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = serde_json::json!({
            "model": self.config.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": cleaning_prompt(transcript, reference_text) },
            ],
        });

        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await
            .map_err(CleanerError::from)?;

        let status = response.status();
        if status == 401 || status == 403 {
            return Err(CleanerError::AuthError);
        }
        if status == 429 {
            return Err(CleanerError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(CleanerError::HttpError { status: status.as_u16() });
        }

        let bytes = response.bytes().await.map_err(CleanerError::from)?;
        let parsed: CompletionResponse =
            serde_json::from_slice(&bytes).map_err(|e| CleanerError::Parse(e.to_string()))?;

        let cleaned = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CleanerError::EmptyCompletion)?;

        Ok(cleaned)
    }
}
