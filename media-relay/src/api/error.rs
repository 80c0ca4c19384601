//! API error handling.
//!
//! Every failure that reaches a client is a JSON `{code, message}` body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    // The pipeline run has already logged the failure with its request id.
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidLocator(msg) => ApiError::bad_request("INVALID_LOCATOR", msg),
            Error::InvalidUpload(msg) => ApiError::bad_request("INVALID_UPLOAD", msg),
            Error::OriginUnavailable(msg) => {
                ApiError::internal("ORIGIN_UNAVAILABLE", format!("Error downloading media: {msg}"))
            }
            Error::TranscodeFailure(msg) => {
                ApiError::internal("CONVERSION_FAILED", format!("Error converting file: {msg}"))
            }
            Error::Io(_) | Error::IoPath { .. } => {
                ApiError::internal("IO_ERROR", "Local storage error occurred")
            }
            _ => ApiError::internal("INTERNAL_ERROR", "An unexpected error occurred"),
        }
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = Result<T, ApiError>;
