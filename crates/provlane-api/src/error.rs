//! API errors and their HTTP mapping

use crate::types::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use provlane_flow::FlowError;
use provlane_types::EventError;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Flow(#[from] FlowError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Event(EventError::MalformedEvent { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Event(EventError::UnknownSessionReference { .. }) => StatusCode::NOT_FOUND,
            ApiError::Event(_) => StatusCode::CONFLICT,
            ApiError::Flow(FlowError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            ApiError::Flow(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

/// Helper function to create error responses
pub fn create_error_response(
    status: StatusCode,
    message: String,
) -> (StatusCode, Json<ErrorResponse>) {
    let response = ErrorResponse {
        error: status.as_str().to_string(),
        message,
        timestamp: chrono::Utc::now().to_rfc3339(),
    };
    (status, Json(response))
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        create_error_response(status, self.to_string()).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
