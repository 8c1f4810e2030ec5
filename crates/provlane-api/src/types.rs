use crate::config::ServerConfig;
use crate::registry::SessionRegistry;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// API state shared by every handler
#[derive(Clone)]
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<ServerConfig>,
}

impl ApiState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        let config = Arc::new(registry.config().clone());
        Self { registry, config }
    }
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
    pub sessions: usize,
}

/// Error response type
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: String,
}

/// Per-batch ingestion report; dropped events are not retried
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IngestResponse {
    pub session_id: String,
    pub accepted: usize,
    pub dropped: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    pub format: Option<String>,
}
