//! Error types for the job service
//!
//! Every failure a caller can observe resolves into one of these variants;
//! raw internal errors never cross the API boundary.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Service errors
#[derive(Debug, Error)]
pub enum Error {
    /// Bad submission shape, rejected before a job is created
    #[error("Invalid submission: {0}")]
    Validation(String),

    /// Queue is full; admission control rejected the submission
    #[error("Job queue is at capacity, retry later")]
    Saturated,

    /// Unknown job id
    #[error("Job not found: {0}")]
    NotFound(Uuid),

    /// Result requested before the job finished
    #[error("Job {0} has not finished yet")]
    NotReady(Uuid),

    /// Cancel requested on a job that already reached a terminal state
    #[error("Job {0} already reached a terminal state")]
    AlreadyTerminal(Uuid),

    /// Result requested for a job that terminated with an error
    #[error("Job failed ({code}): {message}")]
    JobFailed { code: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Persistence layer error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::Validation(msg) => (StatusCode::BAD_REQUEST, "validation_error", msg.clone()),
            Error::Saturated => (
                StatusCode::TOO_MANY_REQUESTS,
                "saturated",
                self.to_string(),
            ),
            Error::NotFound(id) => (
                StatusCode::NOT_FOUND,
                "not_found",
                format!("Job not found: {}", id),
            ),
            Error::NotReady(id) => (
                StatusCode::CONFLICT,
                "not_ready",
                format!("Job {} has not finished yet", id),
            ),
            Error::AlreadyTerminal(id) => (
                StatusCode::CONFLICT,
                "already_terminal",
                format!("Job {} already reached a terminal state", id),
            ),
            Error::JobFailed { code, message } => (
                StatusCode::CONFLICT,
                "job_failed",
                format!("{}: {}", code, message),
            ),
            Error::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error", msg.clone()),
            Error::Storage(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "storage_error",
                msg.clone(),
            ),
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                msg.clone(),
            ),
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
