//! API error types.

use crate::registry::RegistryError;
use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Seconds a client should wait before retrying after an admission reject.
const RETRY_AFTER_SECS: &str = "60";

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("too many concurrent uploads, please retry later")]
    TooManyUploads,

    #[error("missing part {0}")]
    MissingPart(u32),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Unauthorized(_) => "unauthorized",
            Self::TooManyUploads => "too_many_uploads",
            Self::MissingPart(_) => "missing_part",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::TooManyUploads => StatusCode::TOO_MANY_REQUESTS,
            Self::MissingPart(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::NotFound => Self::NotFound("upload not found".to_string()),
            RegistryError::Unauthorized => Self::Unauthorized("invalid upload token".to_string()),
            RegistryError::TooManyUploads => Self::TooManyUploads,
            RegistryError::MissingPart(n) => Self::MissingPart(n),
            RegistryError::PartOutOfRange { .. } => Self::BadRequest(e.to_string()),
            RegistryError::Domain(err) => match err {
                // Illegal transitions are programming errors, not client faults.
                lectern_core::Error::InvalidTransition { .. } => Self::Internal(err.to_string()),
                other => Self::BadRequest(other.to_string()),
            },
            RegistryError::Io(err) => Self::Internal(format!("failed to persist part: {err}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::TOO_MANY_REQUESTS {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
