//! HTTP request handlers.
//!
//! Handlers stay thin: extract the user id, hand the parameters to the
//! operation implementations in [`crate::ops`], and let [`ApiError`]'s
//! IntoResponse do the status mapping.

use axum::Json;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use serde::Serialize;

use crate::error::ApiError;
use crate::ops::begin_upload::{BeginUploadOutput, BeginUploadParams, begin_upload_impl};
use crate::ops::fetch_text::{FetchTextOutput, FetchTextParams, fetch_text_impl};
use crate::ops::process_recording::{
    ProcessRecordingOutput, ProcessRecordingParams, process_recording_impl,
};
use crate::state::AppState;

/// Authenticated user id, injected by the upstream gateway.
///
/// Session verification happens before requests reach this service; this
/// extractor only requires the header to be present.
pub struct UserId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| UserId(value.to_string()))
            .ok_or_else(|| ApiError::Validation("missing x-user-id header".into()))
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok", version: env!("CARGO_PKG_VERSION") })
}

pub async fn fetch_text(
    State(state): State<AppState>, user: UserId, Json(params): Json<FetchTextParams>,
) -> Result<Json<FetchTextOutput>, ApiError> {
    fetch_text_impl(&state, &user.0, params).await.map(Json)
}

pub async fn begin_upload(
    State(state): State<AppState>, user: UserId, Json(params): Json<BeginUploadParams>,
) -> Result<Json<BeginUploadOutput>, ApiError> {
    begin_upload_impl(&state, &user.0, params).await.map(Json)
}

pub async fn process_recording(
    State(state): State<AppState>, user: UserId, Json(params): Json<ProcessRecordingParams>,
) -> Result<Json<ProcessRecordingOutput>, ApiError> {
    process_recording_impl(&state, &user.0, params).await.map(Json)
}
