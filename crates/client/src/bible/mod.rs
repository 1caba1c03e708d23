//! Licensed Bible-text provider client.
//!
//! The provider is treated as an opaque dependency with a narrow contract:
//! given a normalized passage reference and a license version, return the
//! verses. Wire details stay in this module.

pub mod error;
pub mod response;

pub use error::BibleError;
pub use response::Verse;

use engraft_core::PassageRef;
use reqwest::header;
use std::time::Duration;

/// Default base URL for the Bible-text provider.
const DEFAULT_BASE_URL: &str = "https://api.scripture.api.bible/v1";

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "engraft/0.1";

/// Bible provider client configuration.
#[derive(Debug, Clone)]
pub struct BibleConfig {
    /// API key for the licensed text provider.
    pub api_key: String,
    /// Base URL (default: https://api.scripture.api.bible/v1).
    pub base_url: String,
    /// Request timeout (default: 10s).
    pub timeout: Duration,
    /// User-agent string.
    pub user_agent: String,
}

impl Default for BibleConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: DEFAULT_TIMEOUT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl BibleConfig {
    /// Load configuration from environment variables.
    ///
    /// Reads ENGRAFT_BIBLE_API_KEY from environment. Returns error if not set.
    pub fn from_env() -> Result<Self, BibleError> {
        let api_key = std::env::var("ENGRAFT_BIBLE_API_KEY").map_err(|_| BibleError::MissingApiKey)?;

        Ok(Self { api_key, ..Default::default() })
    }
}

/// Text source abstraction consumed by the text-fetch orchestrator.
#[async_trait::async_trait]
pub trait TextProvider: Send + Sync {
    /// Fetch the verses of a passage in one license version.
    async fn fetch_passage(&self, reference: &PassageRef, version: &str) -> Result<Vec<Verse>, BibleError>;
}

/// Bible-text provider API client.
#[derive(Debug, Clone)]
pub struct BibleClient {
    http: reqwest::Client,
    config: BibleConfig,
}

impl BibleClient {
    /// Create a new Bible client with the given configuration.
    pub fn new(config: BibleConfig) -> Result<Self, BibleError> {
        if config.api_key.is_empty() {
            return Err(BibleError::MissingApiKey);
        }

        let http = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .build()
            .map_err(|e| BibleError::Network(std::sync::Arc::new(e)))?;

        Ok(Self { http, config })
    }

    /// Create a new Bible client from environment variables.
    pub fn from_env() -> Result<Self, BibleError> {
        Self::new(BibleConfig::from_env()?)
    }
}

#[async_trait::async_trait]
impl TextProvider for BibleClient {
    async fn fetch_passage(&self, reference: &PassageRef, version: &str) -> Result<Vec<Verse>, BibleError> {
        let url = format!("{}/bibles/{}/passages", self.config.base_url, version);

        let mut query: Vec<(&str, String)> =
            vec![("book", reference.book.clone()), ("chapter", reference.chapter.to_string())];
        if let Some((start, end)) = reference.verse_span() {
            query.push(("verse-start", start.to_string()));
            query.push(("verse-end", end.to_string()));
        }

        tracing::debug!("fetching passage {} ({})", reference, version);

        let http_response = self
            .http
            .get(&url)
            .header("api-key", &self.config.api_key)
            .header(header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(BibleError::from)?;

        let status = http_response.status();

        if status == 401 || status == 403 {
            return Err(BibleError::AuthError);
        }

        if status == 404 {
            return Err(BibleError::PassageNotFound(reference.to_string()));
        }

        if status == 429 {
            return Err(BibleError::RateLimited);
        }

        if status.is_client_error() || status.is_server_error() {
            return Err(BibleError::HttpError { status: status.as_u16() });
        }

        let bytes = http_response.bytes().await.map_err(BibleError::from)?;
        let api_response: response::PassageApiResponse =
            serde_json::from_slice(&bytes).map_err(|e| BibleError::Parse(e.to_string()))?;

        if api_response.data.verses.is_empty() {
            return Err(BibleError::EmptyPassage(reference.to_string()));
        }

        Ok(api_response.data.verses.into_iter().map(Verse::from).collect())
    }
}
