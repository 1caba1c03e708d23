//! Speech-to-text provider client.
//!
//! ### Protocol
//!
//! - **Upload**: `POST {base}/v2/upload` with raw audio bytes, returns a
//!   provider-side audio URL.
//! - **Create job**: `POST {base}/v2/transcript` with the audio URL.
//! - **Poll**: `GET {base}/v2/transcript/{id}` until `completed` or `error`,
//!   bounded by the configured poll budget.
//!
//! The budget bounds how long a request-scoped worker can hang on one job;
//! exhausting it is a distinct timeout error so the orchestrator can release
//! the transcription lock and surface something actionable.

pub mod error;

pub use error::SpeechError;

use bytes::Bytes;
use reqwest::header;
use serde::Deserialize;
use std::time::Duration;

/// Default base URL for the speech-to-text provider.
const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "engraft/0.1";

/// Default status poll budget: ~60 attempts at 1-second intervals.
const DEFAULT_POLL_ATTEMPTS: u32 = 60;
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Default lifetime reported for upload targets.
const DEFAULT_UPLOAD_EXPIRES_SECS: u64 = 3_600;

/// Speech provider client configuration.
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// API key for the speech provider.
    pub api_key: String,
    /// Base URL (default: https://api.assemblyai.com).
    pub base_url: String,
    /// Per-request timeout (default: 30s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
    /// Maximum transcription status polls before giving up.
    pub poll_attempts: u32,
    /// Interval between status polls.
    pub poll_interval: Duration,
    /// Lifetime reported for upload targets, in seconds.
    pub upload_expires_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            poll_attempts: DEFAULT_POLL_ATTEMPTS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            upload_expires_secs: DEFAULT_UPLOAD_EXPIRES_SECS,
        }
    }
}

impl SpeechConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads ENGRAFT_SPEECH_API_KEY from environment. Returns error if not set.
    pub fn from_env() -> Result<Self, SpeechError> {
        let api_key = std::env::var("ENGRAFT_SPEECH_API_KEY").map_err(|_| SpeechError::MissingApiKey)?;

        Ok(Self { api_key, ..Default::default() })
    }
}

/// A provider-issued upload target handed to the mobile client.
#[derive(Debug, Clone)]
pub struct UploadSlot {
    pub upload_url: String,
    pub path: String,
    pub expires_in_seconds: u64,
}

/// Speech-to-text abstraction consumed by the recording orchestrator.
#[async_trait::async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Reserve an upload target for a recording.
    async fn create_upload(&self) -> Result<UploadSlot, SpeechError>;

    /// Transcribe one recording end to end (upload, job, poll, transcript).
    async fn transcribe(&self, audio: Bytes) -> Result<String, SpeechError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Debug, Deserialize)]
struct UploadSlotResponse {
    upload_url: String,
    path: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptJob {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Speech-to-text provider API client.
#[derive(Debug, Clone)]
pub struct SpeechClient {
    http: reqwest::Client,
    config: SpeechConfig,
}

impl SpeechClient {
    /// Create a new speech client with the given configuration.
    pub fn new(config: SpeechConfig) -> Result<Self, SpeechError> {
        if config.api_key.is_empty() {
            return Err(SpeechError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| SpeechError::Network(std::sync::Arc::new(e)))?;

        Ok(Self { http, config })
    }

    /// Create a new speech client from environment variables.
    pub fn from_env() -> Result<Self, SpeechError> {
        Self::new(SpeechConfig::from_env()?)
    }

    fn check_status(status: reqwest::StatusCode) -> Result<(), SpeechError> {
        if status == 401 || status == 403 {
            return Err(SpeechError::AuthError);
        }
        if status == 429 {
            return Err(SpeechError::RateLimited);
        }
        if status.is_client_error() || status.is_server_error() {
            return Err(SpeechError::HttpError { status: status.as_u16() });
        }
        Ok(())
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, SpeechError> {
        Self::check_status(response.status())?;
        let bytes = response.bytes().await.map_err(SpeechError::from)?;
        serde_json::from_slice(&bytes).map_err(|e| SpeechError::Parse(e.to_string()))
    }

    async fn upload_audio(&self, audio: Bytes) -> Result<String, SpeechError> {
        let url = format!("{}/v2/upload", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, &self.config.api_key)
            .header(header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await
            .map_err(SpeechError::from)?;

        let parsed: UploadResponse = Self::parse(response).await?;
        Ok(parsed.upload_url)
    }

    async fn create_job(&self, audio_url: &str) -> Result<TranscriptJob, SpeechError> {
        let url = format!("{}/v2/transcript", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, &self.config.api_key)
            .json(&serde_json::json!({ "audio_url": audio_url }))
            .send()
            .await
            .map_err(SpeechError::from)?;

        Self::parse(response).await
    }

    async fn poll_job(&self, id: &str) -> Result<TranscriptJob, SpeechError> {
        let url = format!("{}/v2/transcript/{}", self.config.base_url, id);
        let response = self
            .http
            .get(&url)
            .header(header::AUTHORIZATION, &self.config.api_key)
            .send()
            .await
            .map_err(SpeechError::from)?;

        Self::parse(response).await
    }
}

#[async_trait::async_trait]
impl SpeechProvider for SpeechClient {
    async fn create_upload(&self) -> Result<UploadSlot, SpeechError> {
        let url = format!("{}/v2/upload-slots", self.config.base_url);
        let response = self
            .http
            .post(&url)
            .header(header::AUTHORIZATION, &self.config.api_key)
            .send()
            .await
            .map_err(SpeechError::from)?;

        let parsed: UploadSlotResponse = Self::parse(response).await?;
        Ok(UploadSlot {
            upload_url: parsed.upload_url,
            path: parsed.path,
            expires_in_seconds: self.config.upload_expires_secs,
        })
    }

    async fn transcribe(&self, audio: Bytes) -> Result<String, SpeechError> {
        let audio_url = self.upload_audio(audio).await?;
        let job = self.create_job(&audio_url).await?;

        tracing::debug!("transcription job {} created with status {}", job.id, job.status);

        let mut job = job;
        for attempt in 0..self.config.poll_attempts {
            match job.status.as_str() {
                "completed" => {
                    return job
                        .text
                        .filter(|text| !text.is_empty())
                        .ok_or_else(|| SpeechError::Parse("completed job carried no text".into()));
                }
                "error" => {
                    return Err(SpeechError::JobFailed(
                        job.error.unwrap_or_else(|| "unspecified provider error".into()),
                    ));
                }
                _ => {
                    tracing::debug!("job {} still {}, poll attempt {}", job.id, job.status, attempt + 1);
                    tokio::time::sleep(self.config.poll_interval).await;
                    job = self.poll_job(&job.id).await?;
                }
            }
        }

        Err(SpeechError::PollBudgetExhausted { attempts: self.config.poll_attempts })
    }
}
