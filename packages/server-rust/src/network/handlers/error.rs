//! Maps service errors onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use quarry_core::QueryError;
use serde_json::json;

/// Error returned by every API handler. The body is `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Query(#[from] QueryError),

    /// Malformed input caught before any service ran (multipart framing,
    /// JSON body syntax).
    #[error("{0}")]
    BadRequest(String),
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Query(QueryError::Validation(_)) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Query(QueryError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Query(QueryError::Execution { .. }) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Execution errors display only their summary; the cause was logged
        // where it happened.
        (self.status(), Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
