//! Error-to-response mapping for queue operations.

use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use serde::Serialize;
use tracing::error;

use anteroom_core::{QueueError, StoreError};

/// JSON error body returned by every failing endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

/// Wrapper turning a [`QueueError`] into an HTTP response.
pub struct ApiError(pub QueueError);

impl From<QueueError> for ApiError {
    fn from(err: QueueError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            // The caller already holds a ticket; point them at it.
            QueueError::AlreadyJoined(_) => (StatusCode::CONFLICT, "already_joined"),
            QueueError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            // Gone, not Unauthorized: the session cannot be recovered
            // by re-authenticating, only by rejoining the queue.
            QueueError::InvalidToken => (StatusCode::GONE, "invalid_token"),
            QueueError::NotActive => (StatusCode::GONE, "not_active"),
            QueueError::Paused => (StatusCode::SERVICE_UNAVAILABLE, "queue_paused"),
            QueueError::Store(StoreError::Unavailable(_)) => {
                error!(error = %self.0, "store unavailable");
                (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable")
            }
            QueueError::Store(_) => {
                error!(error = %self.0, "unexpected store error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error")
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
                code,
            }),
        )
            .into_response()
    }
}

/// Bad-request helper for malformed path/query input.
pub fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: message.into(),
            code: "bad_request",
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_already_joined_maps_to_conflict() {
        let response = ApiError(QueueError::AlreadyJoined("owner".into())).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_token_errors_map_to_gone() {
        assert_eq!(
            ApiError(QueueError::InvalidToken).into_response().status(),
            StatusCode::GONE
        );
        assert_eq!(
            ApiError(QueueError::NotActive).into_response().status(),
            StatusCode::GONE
        );
    }

    #[test]
    fn test_store_unavailable_maps_to_503() {
        let err = QueueError::Store(StoreError::Unavailable("db locked".into()));
        assert_eq!(
            ApiError(err).into_response().status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
