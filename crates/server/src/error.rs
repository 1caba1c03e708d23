//! Structured errors for the engraft HTTP surface.
//!
//! The taxonomy separates what the caller can do about a failure: fix the
//! request (validation), wait for the quota window (quota), retry shortly
//! (transcription in progress), or nothing (upstream/storage). Quota and
//! lock store failures surface as 500s rather than being swallowed: they
//! are the enforcement mechanisms, so skipping them silently is not safe.
//! Cache store failures never reach this type at all; the cache fails open.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use engraft_core::{UsageDecision, UsageDimension};

/// Structured errors for the engraft API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request; nothing was touched.
    #[error("VALIDATION: {0}")]
    Validation(String),

    /// A usage meter is exhausted for today.
    #[error("QUOTA_EXCEEDED: {dimension} used {used} of {limit}")]
    QuotaExceeded { dimension: UsageDimension, used: f64, limit: f64, resets_at: DateTime<Utc> },

    /// The user's transcription lock is already held.
    #[error("TRANSCRIPTION_IN_PROGRESS")]
    TranscriptionInProgress,

    /// An external provider failed.
    #[error("UPSTREAM: {provider}: {message}")]
    Upstream { provider: &'static str, message: String },

    /// The quota or lock store failed; enforcement cannot be skipped.
    #[error("STORAGE: {0}")]
    Storage(engraft_core::Error),
}

impl ApiError {
    /// Quota rejection carrying the decision's detail for UI messaging.
    pub fn quota(dimension: UsageDimension, decision: &UsageDecision) -> Self {
        ApiError::QuotaExceeded {
            dimension,
            used: decision.used,
            limit: decision.limit,
            resets_at: decision.resets_at,
        }
    }

    /// Provider failure, labeled with which dependency broke.
    pub fn upstream(provider: &'static str, err: impl std::fmt::Display) -> Self {
        ApiError::Upstream { provider, message: err.to_string() }
    }
}

impl From<engraft_core::Error> for ApiError {
    fn from(err: engraft_core::Error) -> Self {
        match err {
            engraft_core::Error::InvalidReference(msg) => ApiError::Validation(msg),
            other => ApiError::Storage(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "code": "VALIDATION", "message": msg }),
            ),
            ApiError::QuotaExceeded { dimension, used, limit, resets_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "code": "QUOTA_EXCEEDED",
                    "message": format!("daily {dimension} limit reached"),
                    "dimension": dimension.meter(),
                    "used": used,
                    "limit": limit,
                    "resetsAt": resets_at.to_rfc3339(),
                }),
            ),
            ApiError::TranscriptionInProgress => (
                StatusCode::TOO_MANY_REQUESTS,
                serde_json::json!({
                    "code": "TRANSCRIPTION_IN_PROGRESS",
                    "message": "a recording is already being processed for this user",
                }),
            ),
            ApiError::Upstream { provider, message } => {
                tracing::error!("upstream {provider} failure: {message}");
                (
                    StatusCode::BAD_GATEWAY,
                    serde_json::json!({ "code": "UPSTREAM", "message": format!("{provider} provider failed") }),
                )
            }
            ApiError::Storage(err) => {
                tracing::error!("storage failure: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    serde_json::json!({ "code": "STORAGE", "message": "internal storage error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use engraft_core::quota::next_utc_midnight;

    #[test]
    fn test_quota_error_carries_decision_detail() {
        let decision =
            UsageDecision { allowed: false, used: 200.0, limit: 300.0, resets_at: next_utc_midnight() };
        let err = ApiError::quota(UsageDimension::TranscribeSeconds, &decision);

        match err {
            ApiError::QuotaExceeded { dimension, used, limit, .. } => {
                assert_eq!(dimension, UsageDimension::TranscribeSeconds);
                assert_eq!(used, 200.0);
                assert_eq!(limit, 300.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_reference_maps_to_validation() {
        let err: ApiError = engraft_core::Error::InvalidReference("book must not be empty".into()).into();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn test_in_progress_is_distinct_from_quota() {
        // both are 429-class, but the codes differ so clients can tell
        // "retry shortly" from "come back tomorrow"
        let err = ApiError::TranscriptionInProgress;
        assert!(err.to_string().contains("TRANSCRIPTION_IN_PROGRESS"));
        assert!(!err.to_string().contains("QUOTA"));
    }
}
