//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_verse_capacity` is 0
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `lock_stale_secs` or `transcribe_poll_attempts` is 0
    /// - `user_agent` or `listen_addr` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_verse_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "cache_verse_capacity".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.lock_stale_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "lock_stale_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.transcribe_poll_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "transcribe_poll_attempts".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.listen_addr.is_empty() {
            return Err(ConfigError::Invalid { field: "listen_addr".into(), reason: "must not be empty".into() });
        }

        Ok(())
    }
}
