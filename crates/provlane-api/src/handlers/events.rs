//! Producer ingestion endpoint
use crate::types::*;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::Value;
use tracing::debug;

/// Accept one event or an array of events for a session.
///
/// Ingestion is fire-and-forget: every event is applied or dropped on its
/// own, and the response only reports the counts.
pub async fn ingest_events(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<IngestResponse>) {
    let events = match body {
        Value::Array(events) => events,
        single => vec![single],
    };

    let mut response = IngestResponse {
        session_id: session_id.clone(),
        ..IngestResponse::default()
    };
    for event in events {
        match state.registry.ingest(&session_id, event).await {
            Ok(_) => response.accepted += 1,
            Err(e) => {
                response.dropped += 1;
                response.errors.push(e.to_string());
            }
        }
    }
    debug!(
        session_id = %session_id,
        accepted = response.accepted,
        dropped = response.dropped,
        "Ingested batch"
    );
    (StatusCode::ACCEPTED, Json(response))
}
