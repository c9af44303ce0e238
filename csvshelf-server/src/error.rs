//! Error types for csvshelf-server
//!
//! All expected failures (bad type, duplicate, malformed CSV, missing record,
//! store outage) become a JSON error body with a matching status code. Only
//! unexpected internal errors become a generic 500.

use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::db::StoreError;
use crate::services::UploadFailure;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Record with the same name exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the size limit (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Declared content type is not CSV (415)
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Upload content could not be parsed (422)
    #[error("Unprocessable content: {0}")]
    Unprocessable(String),

    /// Record store unreachable or rejected the operation (503)
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Conflict(_) => (StatusCode::CONFLICT, "DUPLICATE"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "TOO_LARGE"),
            ApiError::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "INVALID_TYPE")
            }
            ApiError::Unprocessable(_) => (StatusCode::UNPROCESSABLE_ENTITY, "DECODE_ERROR"),
            ApiError::StorageUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORE_ERROR"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = self.parts();

        let message = match &self {
            ApiError::Internal(detail) => {
                // Details stay in the log; the client gets a generic message
                tracing::error!(error = %detail, "Internal error while handling request");
                "Something went wrong".to_string()
            }
            ApiError::NotFound(msg)
            | ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::PayloadTooLarge(msg)
            | ApiError::UnsupportedMediaType(msg)
            | ApiError::Unprocessable(msg)
            | ApiError::StorageUnavailable(msg) => msg.clone(),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

impl From<UploadFailure> for ApiError {
    fn from(failure: UploadFailure) -> Self {
        let message = failure.to_string();
        match failure {
            UploadFailure::MissingFile | UploadFailure::Interrupted(_) => {
                ApiError::BadRequest(message)
            }
            UploadFailure::TooLarge { .. } => ApiError::PayloadTooLarge(message),
            UploadFailure::InvalidType { .. } => ApiError::UnsupportedMediaType(message),
            UploadFailure::Duplicate { .. } => ApiError::Conflict(message),
            UploadFailure::Decode(_) => ApiError::Unprocessable(message),
            UploadFailure::Store(_) => ApiError::StorageUnavailable(message),
            UploadFailure::Internal(_) => ApiError::Internal(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) | StoreError::NameNotFound(_) => {
                ApiError::NotFound(err.to_string())
            }
            StoreError::Duplicate(_) => ApiError::Conflict(err.to_string()),
            StoreError::Database(_) => ApiError::StorageUnavailable(err.to_string()),
            StoreError::Corrupt { .. } => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::PayloadTooLarge(err.body_text())
        } else {
            ApiError::BadRequest(err.body_text())
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
