//! Recording pipeline orchestration.
//!
//! One recorded recitation attempt flows through a strictly ordered
//! pipeline: validate, pre-check both meters, take the per-user lock,
//! transcribe, record transcription usage, clean (best effort), record
//! cleaning usage, release the lock. The lock is released on every path
//! out of the locked section: the inner pipeline returns a Result and the
//! release runs unconditionally before that Result is inspected.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;
use engraft_core::UsageDimension;

/// Input parameters for processing a recording.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecordingParams {
    /// Base64-encoded recording audio.
    pub audio: String,
    pub duration_seconds: f64,
    /// The passage text the user was reciting, for cleaning context.
    pub reference_text: String,
}

/// Output of processing a recording.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRecordingOutput {
    pub transcription: String,
    pub cleaned_transcription: String,
    pub cleaning_used: bool,
}

/// Implementation of the process-recording operation.
pub async fn process_recording_impl(
    state: &AppState, user_id: &str, params: ProcessRecordingParams,
) -> Result<ProcessRecordingOutput, ApiError> {
    // step 1: validate before touching quota or lock
    let audio = BASE64
        .decode(&params.audio)
        .map_err(|_| ApiError::Validation("audio must be valid base64".into()))?;
    if audio.is_empty() {
        return Err(ApiError::Validation("audio must not be empty".into()));
    }
    if !params.duration_seconds.is_finite() || params.duration_seconds <= 0.0 {
        return Err(ApiError::Validation("durationSeconds must be positive".into()));
    }
    if params.reference_text.trim().is_empty() {
        return Err(ApiError::Validation("referenceText must not be empty".into()));
    }

    // step 2: pre-check both meters before any external call
    let duration = params.duration_seconds;
    let decision = state.quota.check_usage(user_id, UsageDimension::TranscribeSeconds, duration).await?;
    if !decision.allowed {
        return Err(ApiError::quota(UsageDimension::TranscribeSeconds, &decision));
    }
    let decision = state.quota.check_usage(user_id, UsageDimension::EvaluateCount, 1.0).await?;
    if !decision.allowed {
        return Err(ApiError::quota(UsageDimension::EvaluateCount, &decision));
    }

    // step 3: one pipeline per user at a time
    if !state.lock.acquire(user_id).await? {
        return Err(ApiError::TranscriptionInProgress);
    }

    // steps 4-7 inside, step 8 unconditionally after
    let result = locked_pipeline(state, user_id, Bytes::from(audio), duration, &params.reference_text).await;
    let released = state.lock.release(user_id).await;

    let output = result?;
    released?;
    Ok(output)
}

/// Steps 4-7: the section that runs under the user's transcription lock.
async fn locked_pipeline(
    state: &AppState, user_id: &str, audio: Bytes, duration_seconds: f64, reference_text: &str,
) -> Result<ProcessRecordingOutput, ApiError> {
    // step 4: transcription failure aborts with no usage recorded
    let transcription = state
        .speech
        .transcribe(audio)
        .await
        .map_err(|e| ApiError::upstream("speech-to-text", e))?;

    // step 5: the upload and transcription consumed the declared duration
    // regardless of what happens downstream
    state
        .quota
        .record_usage(user_id, UsageDimension::TranscribeSeconds, duration_seconds)
        .await?;

    // steps 6-7: cleaning is best effort; a failure degrades to the raw
    // transcript and records no evaluate usage
    match state.cleaner.clean(&transcription, reference_text).await {
        Ok(cleaned_transcription) => {
            state.quota.record_usage(user_id, UsageDimension::EvaluateCount, 1.0).await?;
            Ok(ProcessRecordingOutput { transcription, cleaned_transcription, cleaning_used: true })
        }
        Err(e) => {
            tracing::warn!("transcript cleaning failed, falling back to raw transcript: {e}");
            Ok(ProcessRecordingOutput {
                cleaned_transcription: transcription.clone(),
                transcription,
                cleaning_used: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::testing::{
        FailingCleaner, FailingSpeech, StaticBible, StubCleaner, StubSpeech, state_with,
    };
    use std::sync::Arc;

    fn params(duration_seconds: f64) -> ProcessRecordingParams {
        ProcessRecordingParams {
            audio: BASE64.encode(b"riff-wav-bytes"),
            duration_seconds,
            reference_text: "For God so loved the world".into(),
        }
    }

    async fn stub_state() -> AppState {
        state_with(
            Arc::new(StaticBible(vec![])),
            Arc::new(StubSpeech("for god so loved the world")),
            Arc::new(StubCleaner("For God so loved the world")),
        )
        .await
    }

    async fn used(state: &AppState, user_id: &str, dimension: UsageDimension) -> f64 {
        state.quota.check_usage(user_id, dimension, 0.0).await.unwrap().used
    }

    #[tokio::test]
    async fn test_happy_path_records_both_meters() {
        let state = stub_state().await;

        let output = process_recording_impl(&state, "u1", params(200.0)).await.unwrap();
        assert_eq!(output.transcription, "for god so loved the world");
        assert_eq!(output.cleaned_transcription, "For God so loved the world");
        assert!(output.cleaning_used);

        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 200.0);
        assert_eq!(used(&state, "u1", UsageDimension::EvaluateCount).await, 1.0);
        assert!(!state.lock.is_held("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_second_recording_over_budget_rejected() {
        let state = stub_state().await;
        process_recording_impl(&state, "u1", params(200.0)).await.unwrap();

        // 200 + 150 > 300 free-tier seconds
        let err = process_recording_impl(&state, "u1", params(150.0)).await.unwrap_err();
        match err {
            ApiError::QuotaExceeded { dimension, used, limit, .. } => {
                assert_eq!(dimension, UsageDimension::TranscribeSeconds);
                assert_eq!(used, 200.0);
                assert_eq!(limit, 300.0);
            }
            other => panic!("unexpected error: {other}"),
        }

        // the rejected attempt consumed nothing and left no lock behind
        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 200.0);
        assert!(!state.lock.is_held("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_cleaning_failure_degrades_to_raw_transcript() {
        let state = state_with(
            Arc::new(StaticBible(vec![])),
            Arc::new(StubSpeech("for god so loved the world")),
            Arc::new(FailingCleaner),
        )
        .await;

        let output = process_recording_impl(&state, "u1", params(90.0)).await.unwrap();
        assert_eq!(output.cleaned_transcription, output.transcription);
        assert!(!output.cleaning_used);

        // transcription usage is recorded, cleaning usage is not
        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 90.0);
        assert_eq!(used(&state, "u1", UsageDimension::EvaluateCount).await, 0.0);
        assert!(!state.lock.is_held("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_transcription_failure_releases_lock_and_records_nothing() {
        let state = state_with(
            Arc::new(StaticBible(vec![])),
            Arc::new(FailingSpeech),
            Arc::new(StubCleaner("clean")),
        )
        .await;

        let err = process_recording_impl(&state, "u1", params(120.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::Upstream { provider: "speech-to-text", .. }));

        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 0.0);
        assert_eq!(used(&state, "u1", UsageDimension::EvaluateCount).await, 0.0);
        assert!(!state.lock.is_held("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_in_flight_recording_rejected_distinctly() {
        let state = stub_state().await;
        assert!(state.lock.acquire("u1").await.unwrap());

        let err = process_recording_impl(&state, "u1", params(60.0)).await.unwrap_err();
        assert!(matches!(err, ApiError::TranscriptionInProgress));

        // the conflicting attempt must not release the holder's lock
        assert!(state.lock.is_held("u1").await.unwrap());
        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 0.0);
    }

    #[tokio::test]
    async fn test_evaluate_budget_exhaustion_blocks_before_lock() {
        let state = stub_state().await;
        state.quota.record_usage("u1", UsageDimension::EvaluateCount, 20.0).await.unwrap();

        let err = process_recording_impl(&state, "u1", params(60.0)).await.unwrap_err();
        match err {
            ApiError::QuotaExceeded { dimension, .. } => {
                assert_eq!(dimension, UsageDimension::EvaluateCount);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!state.lock.is_held("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_validation_happens_before_everything() {
        let state = stub_state().await;

        let mut bad_audio = params(60.0);
        bad_audio.audio = "not base64!!!".into();
        assert!(matches!(
            process_recording_impl(&state, "u1", bad_audio).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        let mut empty_audio = params(60.0);
        empty_audio.audio = String::new();
        assert!(matches!(
            process_recording_impl(&state, "u1", empty_audio).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        let mut empty_reference = params(60.0);
        empty_reference.reference_text = "   ".into();
        assert!(matches!(
            process_recording_impl(&state, "u1", empty_reference).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        assert!(matches!(
            process_recording_impl(&state, "u1", params(0.0)).await.unwrap_err(),
            ApiError::Validation(_)
        ));

        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 0.0);
        assert!(!state.lock.is_held("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_lock_can_be_retaken_after_completion() {
        let state = stub_state().await;

        process_recording_impl(&state, "u1", params(50.0)).await.unwrap();
        process_recording_impl(&state, "u1", params(50.0)).await.unwrap();

        assert_eq!(used(&state, "u1", UsageDimension::TranscribeSeconds).await, 100.0);
        assert_eq!(used(&state, "u1", UsageDimension::EvaluateCount).await, 2.0);
    }
}
