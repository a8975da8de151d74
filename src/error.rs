//! Error types for the call ledger service

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A webhook delivery missing its identifier or a required field.
    /// Dropped and logged by the ingestion path, never a record mutation.
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// A non-creating event referencing no known identifier or alias.
    #[error("unknown call identifier: {0}")]
    UnknownIdentifier(String),

    #[error("call not found: {0}")]
    CallNotFound(String),

    /// Per-record lock contention that outlived the bounded retries.
    #[error("lock contention on call {0}")]
    RaceDetected(String),

    /// A record shape the sanitizer's repair rules do not cover.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Error::MalformedEvent(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            Error::UnknownIdentifier(_) | Error::CallNotFound(_) => {
                (StatusCode::NOT_FOUND, self.to_string())
            }
            Error::RaceDetected(_) => (StatusCode::SERVICE_UNAVAILABLE, self.to_string()),
            Error::Provider(_) => (StatusCode::BAD_GATEWAY, self.to_string()),
            Error::InvariantViolation(_) | Error::Internal(_) => {
                tracing::error!("internal error: {:?}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}
