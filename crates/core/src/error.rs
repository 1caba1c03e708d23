//! Unified error types for the engraft core.
//!
//! Cache callers are expected to fail open (treat these as misses); quota and
//! lock callers must not.

use tokio_rusqlite::rusqlite;

/// Unified error types for the engraft core stores.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed passage reference.
    #[error("INVALID_REFERENCE: {0}")]
    InvalidReference(String),

    /// Database operation failed.
    #[error("STORE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("STORE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Subscription tier lookup failed.
    #[error("TIER_LOOKUP: {0}")]
    TierLookup(String),
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidReference("chapter must be at least 1".to_string());
        assert!(err.to_string().contains("INVALID_REFERENCE"));
        assert!(err.to_string().contains("chapter"));
    }

    #[test]
    fn test_migration_error_display() {
        let err = Error::MigrationFailed("bad sql".to_string());
        assert!(err.to_string().contains("STORE_ERROR"));
    }
}
