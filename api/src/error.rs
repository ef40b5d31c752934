//! Error envelope and status mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use maes_common::CoreError;

/// API-facing wrapper around the core taxonomy.
#[derive(Debug)]
pub struct ApiError(pub CoreError);

pub type ApiResult<T> = Result<T, ApiError>;

impl<E: Into<CoreError>> From<E> for ApiError {
    fn from(e: E) -> Self {
        ApiError(e.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Unauthorized => StatusCode::UNAUTHORIZED,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::NotReady(_) | CoreError::Invalid(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "request failed");
        }
        // No stack traces; a stable code plus a human-readable message.
        let body = serde_json::json!({
            "error": self.0.code(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}
