//! Session lifecycle endpoints
use crate::error::ApiResult;
use crate::registry::{IngestOutcome, SessionSummary};
use crate::types::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;
use tracing::info;

/// List retained sessions
pub async fn list_sessions(State(state): State<ApiState>) -> Json<Vec<SessionSummary>> {
    Json(state.registry.list().await)
}

/// Open a session from a `task_start` body under a fresh id
pub async fn create_session(
    State(state): State<ApiState>,
    Json(event): Json<Value>,
) -> ApiResult<(StatusCode, Json<IngestOutcome>)> {
    let outcome = state.registry.create_session(event).await?;
    info!(session_id = %outcome.session_id, "Session created via API");
    Ok((StatusCode::CREATED, Json(outcome)))
}

pub async fn get_session(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSummary>> {
    Ok(Json(state.registry.summary(&session_id).await?))
}
