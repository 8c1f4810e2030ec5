//! Snapshot endpoints over a session's derived state
use crate::error::ApiResult;
use crate::types::*;
use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Json},
};
use provlane_flow::{GraphFormat, ProofOfWork, TimelineSnapshot};

/// Graph snapshot; `?format=json|gexf|graphml`, JSON by default
pub async fn get_graph(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Query(query): Query<GraphQuery>,
) -> ApiResult<impl IntoResponse> {
    let format = match query.format.as_deref() {
        Some(name) => name.parse()?,
        None => GraphFormat::Json,
    };
    let body = state.registry.graph(&session_id, format).await?;
    Ok(([(header::CONTENT_TYPE, format.content_type())], body))
}

pub async fn get_timeline(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<TimelineSnapshot>> {
    Ok(Json(state.registry.timeline(&session_id).await?))
}

pub async fn get_proof_of_work(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<ProofOfWork>> {
    Ok(Json(state.registry.proof_of_work(&session_id).await?))
}

pub async fn get_ascii_tree(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let tree = state.registry.ascii_tree(&session_id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], tree))
}
