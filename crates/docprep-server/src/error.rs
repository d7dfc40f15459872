//! Server-specific error types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use docprep_common::DocprepError;

use crate::clients::ClientError;
use crate::store::StoreError;

/// Result type alias for API handlers
pub type ApiResult<T> = std::result::Result<T, AppError>;

/// Application error types
///
/// Callers branch on the variant, not on message contents: not-found and
/// validation reject at the API boundary, downstream failures surface the
/// collaborator's answer, and policy blocks never appear here because a
/// blocked item is a completed job, not a failed one.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Downstream error: {0}")]
    Downstream(#[from] ClientError),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound(ref message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Validation(ref message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::Conflict(ref message) => (StatusCode::CONFLICT, message.clone()),
            AppError::Downstream(ref e) => {
                tracing::error!("Downstream error: {}", e);
                (StatusCode::BAD_GATEWAY, e.to_string())
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "A database error occurred".to_string(),
                )
            }
            AppError::Storage(ref message) => {
                tracing::error!("Storage error: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "An object storage error occurred".to_string(),
                )
            }
            AppError::Internal(ref message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, message.clone())
            }
            AppError::Unsupported(ref message) => (StatusCode::NOT_IMPLEMENTED, message.clone()),
        };

        let body = Json(json!({
            "error": {
                "message": error_message,
                "status": status.as_u16(),
            }
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Duplicate(msg) => AppError::Conflict(msg),
            StoreError::Sqlx(e) => AppError::Database(e),
        }
    }
}

impl From<DocprepError> for AppError {
    fn from(err: DocprepError) -> Self {
        match err {
            DocprepError::InvalidLink(msg) => AppError::Validation(msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}
