//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and how each kind
//! is turned into an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use study_assistant_core::{CoreError, PortError};
use tracing::error;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An error raised by one of the core services.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The request could not be understood (bad multipart body, bad data URI, ...).
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

impl From<PortError> for ApiError {
    fn from(e: PortError) -> Self {
        ApiError::Core(CoreError::Store(e))
    }
}

fn core_status(e: &CoreError) -> StatusCode {
    match e {
        CoreError::Validation(_) | CoreError::IndexOutOfRange { .. } => StatusCode::BAD_REQUEST,
        CoreError::PermissionDenied | CoreError::AdminOnly => StatusCode::FORBIDDEN,
        CoreError::DuplicateEmail => StatusCode::CONFLICT,
        CoreError::InvalidCredentials | CoreError::NotAuthenticated => StatusCode::UNAUTHORIZED,
        CoreError::GenerationFailed(_) => StatusCode::BAD_GATEWAY,
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::ExportFailed(_) | CoreError::ClipboardUnavailable | CoreError::Store(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Core(e) => (core_status(e), e.kind(), e.user_message()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            other => {
                error!("Internal error: {}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "অপ্রত্যাশিত কোনো সমস্যা হয়েছে।".to_string(),
                )
            }
        };
        if status.is_server_error() {
            error!(kind, "Request failed: {}", self);
        }
        (status, Json(json!({ "error": kind, "message": message }))).into_response()
    }
}
