//! Domain error taxonomy and its single HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::store::StoreError;

/// Every failure surfaced by the credential engine collapses into one of
/// these kinds. `Unauthorized` is deliberately undifferentiated so callers
/// cannot tell which check failed.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed input; always the caller's fault and reported immediately.
    #[error("{0}")]
    Validation(String),
    /// Missing, invalid, expired, or revoked credential.
    #[error("Unauthorized")]
    Unauthorized,
    /// Valid credential but the account is disabled.
    #[error("Account disabled")]
    Forbidden,
    /// Uniqueness violation (duplicate email or token).
    #[error("{0}")]
    Conflict(String),
    /// Resource absent, where enumeration safety does not require masking.
    #[error("Not found")]
    NotFound,
    /// Email dispatch or store backend failure; retryable.
    #[error("upstream failure: {0}")]
    Upstream(String),
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(what) => Self::Conflict(format!("{what} already exists")),
            StoreError::Backend(err) => Self::Upstream(err.to_string()),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, "Account disabled".to_string()),
            Self::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            Self::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            Self::Upstream(detail) => {
                // Internal detail stays in the logs, never in the response body.
                error!("upstream failure: {detail}");
                (
                    StatusCode::BAD_GATEWAY,
                    "Service temporarily unavailable".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
