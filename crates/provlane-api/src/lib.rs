//! # Provlane API
//!
//! Live distribution server for provenance sessions: producers post events,
//! dashboards pull graph/timeline snapshots and subscribe to the live stream
//! with full backlog replay.

pub mod config;
pub mod error;
pub mod handlers;
pub mod hub;
pub mod registry;
pub mod types;

use axum::{
    routing::{get, post},
    Router,
};
use handlers::*;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use config::ServerConfig;
pub use error::{ApiError, ApiResult};
pub use registry::{IngestOutcome, SessionRegistry, SessionSummary};
pub use types::ApiState;

/// Create API router with all endpoints
pub fn create_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(health_check))
        .route("/api/v1/sessions", get(list_sessions).post(create_session))
        .route("/api/v1/sessions/{id}", get(get_session))
        .route("/api/v1/sessions/{id}/events", post(ingest_events))
        .route("/api/v1/sessions/{id}/stream", get(stream_session))
        .route("/api/v1/sessions/{id}/graph", get(get_graph))
        .route("/api/v1/sessions/{id}/timeline", get(get_timeline))
        .route("/api/v1/sessions/{id}/proof-of-work", get(get_proof_of_work))
        .route("/api/v1/sessions/{id}/ascii-tree", get(get_ascii_tree))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the API until `signal` resolves.
///
/// Open sessions are aborted as soon as the signal fires, which closes every
/// live stream so graceful shutdown does not wait on connected dashboards.
pub async fn serve_until<F>(
    listener: TcpListener,
    state: ApiState,
    signal: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let registry = state.registry.clone();
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async move {
            signal.await;
            info!("Shutdown signal received");
            let aborted = registry.abort_all("server shutdown").await;
            if aborted > 0 {
                warn!(aborted, "Open sessions aborted on shutdown");
            }
        })
        .await
}
