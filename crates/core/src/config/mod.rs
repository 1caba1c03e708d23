//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (ENGRAFT_*)
//! 2. TOML config file (if ENGRAFT_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (ENGRAFT_*)
/// 2. TOML config file (if ENGRAFT_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite store backing cache, quotas, and locks.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Listen address for the HTTP API.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// User-Agent string for outbound provider requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Outbound HTTP request timeout in milliseconds.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Licensed Bible-text provider API key.
    ///
    /// Set via ENGRAFT_BIBLE_API_KEY. Required only when a text request
    /// misses the cache.
    #[serde(default)]
    pub bible_api_key: Option<String>,

    /// Bible-text provider base URL.
    #[serde(default = "default_bible_base_url")]
    pub bible_base_url: String,

    /// Speech-to-text provider API key.
    ///
    /// Set via ENGRAFT_SPEECH_API_KEY. Required for recording operations.
    #[serde(default)]
    pub speech_api_key: Option<String>,

    /// Speech-to-text provider base URL.
    #[serde(default = "default_speech_base_url")]
    pub speech_base_url: String,

    /// Transcript-cleaning LLM provider API key.
    ///
    /// Set via ENGRAFT_CLEANER_API_KEY. Cleaning degrades to the raw
    /// transcript when calls fail, but the key is still required to attempt
    /// them.
    #[serde(default)]
    pub cleaner_api_key: Option<String>,

    /// Transcript-cleaning provider base URL.
    #[serde(default = "default_cleaner_base_url")]
    pub cleaner_base_url: String,

    /// Model name passed to the cleaning provider.
    #[serde(default = "default_cleaner_model")]
    pub cleaner_model: String,

    /// Per-version verse cache cap.
    #[serde(default = "default_cache_verse_capacity")]
    pub cache_verse_capacity: usize,

    /// Transcription lock staleness threshold in seconds.
    #[serde(default = "default_lock_stale_secs")]
    pub lock_stale_secs: u64,

    /// Maximum transcription status poll attempts.
    #[serde(default = "default_transcribe_poll_attempts")]
    pub transcribe_poll_attempts: u32,

    /// Interval between transcription status polls in milliseconds.
    #[serde(default = "default_transcribe_poll_interval_ms")]
    pub transcribe_poll_interval_ms: u64,

    /// Lifetime reported for recording upload targets, in seconds.
    #[serde(default = "default_upload_expires_secs")]
    pub upload_expires_secs: u64,

    /// Supporter-tier user ids for the config-backed tier resolver.
    ///
    /// Set via ENGRAFT_SUPPORTER_USER_IDS (comma-separated). A real
    /// deployment replaces this with a subscription lookup.
    #[serde(default)]
    pub supporter_user_ids: Vec<String>,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./engraft.sqlite")
}

fn default_listen_addr() -> String {
    "127.0.0.1:8775".into()
}

fn default_user_agent() -> String {
    "engraft/0.1".into()
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_bible_base_url() -> String {
    "https://api.scripture.api.bible/v1".into()
}

fn default_speech_base_url() -> String {
    "https://api.assemblyai.com".into()
}

fn default_cleaner_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_cleaner_model() -> String {
    "gpt-4o-mini".into()
}

fn default_cache_verse_capacity() -> usize {
    crate::cache::DEFAULT_VERSE_CAPACITY
}

fn default_lock_stale_secs() -> u64 {
    crate::lock::DEFAULT_STALE_AFTER_SECS
}

fn default_transcribe_poll_attempts() -> u32 {
    60
}

fn default_transcribe_poll_interval_ms() -> u64 {
    1_000
}

fn default_upload_expires_secs() -> u64 {
    3_600
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            listen_addr: default_listen_addr(),
            user_agent: default_user_agent(),
            timeout_ms: default_timeout_ms(),
            bible_api_key: None,
            bible_base_url: default_bible_base_url(),
            speech_api_key: None,
            speech_base_url: default_speech_base_url(),
            cleaner_api_key: None,
            cleaner_base_url: default_cleaner_base_url(),
            cleaner_model: default_cleaner_model(),
            cache_verse_capacity: default_cache_verse_capacity(),
            lock_stale_secs: default_lock_stale_secs(),
            transcribe_poll_attempts: default_transcribe_poll_attempts(),
            transcribe_poll_interval_ms: default_transcribe_poll_interval_ms(),
            upload_expires_secs: default_upload_expires_secs(),
            supporter_user_ids: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Outbound timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Interval between transcription status polls.
    pub fn transcribe_poll_interval(&self) -> Duration {
        Duration::from_millis(self.transcribe_poll_interval_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `ENGRAFT_`
    /// 2. TOML file from `ENGRAFT_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("ENGRAFT_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("ENGRAFT_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Check if the Bible provider API key is available (deferred validation).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the key is not set.
    pub fn require_bible_api_key(&self) -> Result<&str, ConfigError> {
        self.bible_api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "bible_api_key".into(),
            hint: "Set ENGRAFT_BIBLE_API_KEY environment variable".into(),
        })
    }

    /// Check if the speech provider API key is available (deferred validation).
    pub fn require_speech_api_key(&self) -> Result<&str, ConfigError> {
        self.speech_api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "speech_api_key".into(),
            hint: "Set ENGRAFT_SPEECH_API_KEY environment variable".into(),
        })
    }

    /// Check if the cleaning provider API key is available (deferred validation).
    pub fn require_cleaner_api_key(&self) -> Result<&str, ConfigError> {
        self.cleaner_api_key.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "cleaner_api_key".into(),
            hint: "Set ENGRAFT_CLEANER_API_KEY environment variable".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.db_path, PathBuf::from("./engraft.sqlite"));
        assert_eq!(config.user_agent, "engraft/0.1");
        assert_eq!(config.timeout_ms, 20_000);
        assert_eq!(config.cache_verse_capacity, 500);
        assert_eq!(config.lock_stale_secs, 300);
        assert_eq!(config.transcribe_poll_attempts, 60);
        assert_eq!(config.transcribe_poll_interval_ms, 1_000);
        assert!(config.bible_api_key.is_none());
        assert!(config.supporter_user_ids.is_empty());
    }

    #[test]
    fn test_timeout_durations() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
        assert_eq!(config.transcribe_poll_interval(), Duration::from_millis(1_000));
    }

    #[test]
    fn test_require_api_keys_missing() {
        let config = AppConfig::default();
        assert!(matches!(config.require_bible_api_key(), Err(ConfigError::Missing { .. })));
        assert!(matches!(config.require_speech_api_key(), Err(ConfigError::Missing { .. })));
        assert!(matches!(config.require_cleaner_api_key(), Err(ConfigError::Missing { .. })));
    }

    #[test]
    fn test_require_api_key_present() {
        let config = AppConfig { bible_api_key: Some("test-key".into()), ..Default::default() };
        assert_eq!(config.require_bible_api_key().unwrap(), "test-key");
    }
}
