//! Health check endpoint
use crate::types::*;
use axum::{extract::State, response::Json};

pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    let response = HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        sessions: state.registry.len().await,
    };
    Json(response)
}
