//! Error types for the jobdesk backend.
//!
//! All errors are explicitly typed using thiserror. No panics in production code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

/// Central error type for all jobdesk operations.
#[derive(Debug, Error)]
pub enum JobdeskError {
    /// Malformed input: bad id, duplicate unique field, invalid request body.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A referenced record does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller's role does not grant the requested permission.
    #[error("Access denied")]
    Forbidden,

    /// Missing or invalid credentials.
    #[error("Authentication failed")]
    Unauthorized,

    /// An operation would violate a protected invariant (e.g. deleting
    /// the ADMIN role or the root administrator account).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error (missing env vars, invalid values).
    #[error("Configuration error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl JobdeskError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Database(_) | Self::Config(_) | Self::Json(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// User-facing error message. Client errors carry their descriptive
    /// message; server errors hide internal details.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::NotFound(msg) => format!("Not found: {}", msg),
            Self::Forbidden => "Access denied".to_string(),
            Self::Unauthorized => "Authentication failed".to_string(),
            Self::Conflict(msg) => msg.clone(),
            Self::Database(_) => "Database error occurred".to_string(),
            Self::Config(_) => "Service configuration error".to_string(),
            Self::Json(_) => "Data format error".to_string(),
        }
    }
}

/// JSON error body returned to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub message: String,
}

impl IntoResponse for JobdeskError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "request rejected");
        }

        let body = ErrorBody {
            status_code: status.as_u16(),
            message: self.user_message(),
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for jobdesk operations.
pub type Result<T> = std::result::Result<T, JobdeskError>;
