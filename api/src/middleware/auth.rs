//! Service-token authentication

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use maes_common::CoreError;

use crate::{ApiError, ApiState};

/// Header carrying the static service token.
pub const SERVICE_TOKEN_HEADER: &str = "x-service-token";

/// Reject requests without the configured service token. An empty
/// configured token rejects everything rather than opening the service.
pub async fn require_service_token(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(SERVICE_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    let expected = state.service_token.as_str();

    if expected.is_empty() || provided != Some(expected) {
        return ApiError(CoreError::Unauthorized).into_response();
    }
    next.run(request).await
}
