//! Error types for the web surface.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Errors that can occur handling a request.
#[derive(Debug, Error)]
pub enum WebError {
    /// Core engine error (schedule data, day resolution).
    #[error(transparent)]
    Core(#[from] routineos_core::CoreError),

    /// Subscription storage error.
    #[error(transparent)]
    Push(#[from] routineos_push::PushError),
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match &self {
            WebError::Core(routineos_core::CoreError::InvalidDayIndex(_)) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
