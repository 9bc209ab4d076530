//! API error types.

use crate::coordinator::CoordinatorError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use csvgate_query::QueryErrorKind;
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
///
/// Messages are fixed strings or sanitizer output, which never echoes input.
/// Paths and engine messages stay in the logs.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad gateway: {0}")]
    BadGateway(String),

    #[error("gateway timeout: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::BadGateway(_) => "bad_gateway",
            Self::Timeout(_) => "timeout",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<CoordinatorError> for ApiError {
    fn from(err: CoordinatorError) -> Self {
        match err {
            CoordinatorError::InvalidKey(e) => Self::BadRequest(e.to_string()),
            CoordinatorError::Query(e) => match e.kind {
                QueryErrorKind::ObjectNotFound => {
                    Self::NotFound("object does not exist".to_string())
                }
                QueryErrorKind::ConnectionFailed => {
                    Self::BadGateway("database connection failed".to_string())
                }
                QueryErrorKind::ExportFailed => Self::BadGateway("export failed".to_string()),
            },
            CoordinatorError::Storage(_) => Self::Internal("cache storage failure".to_string()),
            CoordinatorError::Timeout(_) => {
                Self::Timeout("regeneration is still in progress".to_string())
            }
            CoordinatorError::Aborted(_) => Self::Internal("regeneration aborted".to_string()),
        }
    }
}

impl From<csvgate_storage::StorageError> for ApiError {
    fn from(_: csvgate_storage::StorageError) -> Self {
        Self::Internal("cache storage failure".to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
