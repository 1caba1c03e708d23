//! Begin-recording-upload orchestration.
//!
//! Hands the mobile client a provider upload target, but only after the
//! cheap local checks: the declared duration must fit today's transcription
//! budget and no other recording may be in flight for the user. Nothing is
//! recorded or locked here; the upload itself consumes nothing until the
//! recording is processed.

use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use engraft_core::UsageDimension;

/// Input parameters for beginning a recording upload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadParams {
    pub duration_seconds: f64,
}

/// Output of beginning a recording upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BeginUploadOutput {
    pub upload_target: String,
    pub path: String,
    pub expires_in_seconds: u64,
}

/// Implementation of the begin-upload operation.
pub async fn begin_upload_impl(
    state: &AppState, user_id: &str, params: BeginUploadParams,
) -> Result<BeginUploadOutput, ApiError> {
    if !params.duration_seconds.is_finite() || params.duration_seconds <= 0.0 {
        return Err(ApiError::Validation("durationSeconds must be positive".into()));
    }

    let decision = state
        .quota
        .check_usage(user_id, UsageDimension::TranscribeSeconds, params.duration_seconds)
        .await?;
    if !decision.allowed {
        return Err(ApiError::quota(UsageDimension::TranscribeSeconds, &decision));
    }

    if state.lock.is_held(user_id).await? {
        return Err(ApiError::TranscriptionInProgress);
    }

    let slot = state
        .speech
        .create_upload()
        .await
        .map_err(|e| ApiError::upstream("speech-to-text", e))?;

    Ok(BeginUploadOutput {
        upload_target: slot.upload_url,
        path: slot.path,
        expires_in_seconds: slot.expires_in_seconds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{FailingSpeech, StaticBible, StubCleaner, StubSpeech, state_with};
    use std::sync::Arc;

    async fn stub_state() -> AppState {
        state_with(
            Arc::new(StaticBible(vec![])),
            Arc::new(StubSpeech("raw")),
            Arc::new(StubCleaner("clean")),
        )
        .await
    }

    #[tokio::test]
    async fn test_begin_upload_hands_out_slot() {
        let state = stub_state().await;

        let output =
            begin_upload_impl(&state, "u1", BeginUploadParams { duration_seconds: 90.0 }).await.unwrap();
        assert_eq!(output.upload_target, "https://uploads.example/slot-1");
        assert_eq!(output.path, "recordings/slot-1");
        assert_eq!(output.expires_in_seconds, 3600);
    }

    #[tokio::test]
    async fn test_rejects_non_positive_duration() {
        let state = stub_state().await;

        for duration_seconds in [0.0, -5.0, f64::NAN] {
            let err = begin_upload_impl(&state, "u1", BeginUploadParams { duration_seconds }).await.unwrap_err();
            assert!(matches!(err, ApiError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_rejects_when_budget_exhausted() {
        let state = stub_state().await;
        state
            .quota
            .record_usage("u1", UsageDimension::TranscribeSeconds, 250.0)
            .await
            .unwrap();

        let err =
            begin_upload_impl(&state, "u1", BeginUploadParams { duration_seconds: 60.0 }).await.unwrap_err();
        match err {
            ApiError::QuotaExceeded { used, limit, .. } => {
                assert_eq!(used, 250.0);
                assert_eq!(limit, 300.0);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_while_recording_in_flight() {
        let state = stub_state().await;
        assert!(state.lock.acquire("u1").await.unwrap());

        let err =
            begin_upload_impl(&state, "u1", BeginUploadParams { duration_seconds: 60.0 }).await.unwrap_err();
        assert!(matches!(err, ApiError::TranscriptionInProgress));

        // a different user is unaffected
        assert!(begin_upload_impl(&state, "u2", BeginUploadParams { duration_seconds: 60.0 }).await.is_ok());
    }

    #[tokio::test]
    async fn test_provider_failure_surfaces_as_upstream() {
        let state = state_with(
            Arc::new(StaticBible(vec![])),
            Arc::new(FailingSpeech),
            Arc::new(StubCleaner("clean")),
        )
        .await;

        let err =
            begin_upload_impl(&state, "u1", BeginUploadParams { duration_seconds: 60.0 }).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream { provider: "speech-to-text", .. }));
    }
}
