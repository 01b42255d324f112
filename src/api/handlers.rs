use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::{
    error::{AppError, AppResult},
    models::{AdvanceOutcome, FilterCriteriaRequest, MediaKind},
    services::{ContentSetStatus, ParticipantProgress},
};

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct ContentSetQuery {
    pub index: Option<u32>,
    /// Media kind to fall back to when the session has no stored set
    pub fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExpiryRequest {
    /// Seconds until expiry; 0 expires immediately
    pub delay_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct DecisionRequest {
    pub item_id: u64,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub session_id: String,
    pub existed: bool,
}

/// Health check endpoint
pub async fn health_check() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "healthy" })))
}

pub async fn create_content_set(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<FilterCriteriaRequest>,
) -> AppResult<Response> {
    let content_set = state
        .content_sets
        .create_content_set(&session_id, &request)
        .await?;
    Ok((StatusCode::CREATED, Json(content_set)).into_response())
}

pub async fn get_content_set(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(params): Query<ContentSetQuery>,
) -> AppResult<Response> {
    match (params.fallback, params.index) {
        (Some(raw), None) => {
            let media_kind = MediaKind::parse(&raw).ok_or_else(|| {
                AppError::Validation(format!("fallback must be 'movie' or 'tv', got '{}'", raw))
            })?;
            let content = state
                .content_sets
                .get_content_set_or_fallback(&session_id, media_kind)
                .await?;
            Ok(Json(content).into_response())
        }
        (Some(_), Some(_)) => Err(AppError::Validation(
            "index and fallback cannot be combined".to_string(),
        )),
        (None, index) => {
            let content_set = state
                .content_sets
                .get_content_set(&session_id, index)
                .await?;
            Ok(Json(content_set).into_response())
        }
    }
}

pub async fn refresh_content_set(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Response> {
    let content_set = state.content_sets.refresh_content_set(&session_id).await?;
    Ok(Json(content_set).into_response())
}

pub async fn get_content_set_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<ContentSetStatus>> {
    let status = state
        .content_sets
        .get_content_set_status(&session_id)
        .await?;
    Ok(Json(status))
}

pub async fn cleanup_content_set(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<CleanupResponse>> {
    let existed = state.content_sets.cleanup(&session_id).await?;
    Ok(Json(CleanupResponse {
        session_id,
        existed,
    }))
}

pub async fn schedule_expiry(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ExpiryRequest>,
) -> AppResult<Json<ContentSetStatus>> {
    let metadata = state
        .content_sets
        .schedule_expiry(&session_id, Duration::from_secs(request.delay_secs))
        .await?;
    Ok(Json(metadata.into()))
}

pub async fn advance(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> AppResult<Json<AdvanceOutcome>> {
    let outcome = state.content_sets.advance(&session_id).await?;
    Ok(Json(outcome))
}

pub async fn record_decision(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(String, String)>,
    Json(request): Json<DecisionRequest>,
) -> AppResult<Json<ParticipantProgress>> {
    let progress = state
        .content_sets
        .record_decision(&session_id, &participant_id, request.item_id)
        .await?;
    Ok(Json(progress))
}

pub async fn next_for_participant(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(String, String)>,
) -> AppResult<Json<AdvanceOutcome>> {
    let outcome = state
        .content_sets
        .next_for_participant(&session_id, &participant_id)
        .await?;
    Ok(Json(outcome))
}
