//! Error types for the archive viewer server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::document::MetadataError;
use crate::jobs::JobError;
use crate::viewer::ViewerError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("S3 error: {0}")]
    Storage(#[from] StorageError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error(transparent)]
    Viewer(#[from] ViewerError),

    #[error("Job error: {0}")]
    Job(#[from] JobError),
}

/// Storage-specific errors
#[derive(Error, Debug, Clone)]
pub enum StorageError {
    #[error("S3 connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Bucket not found: {0}")]
    BucketNotFound(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Object already exists: {0}")]
    AlreadyExists(String),

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

fn viewer_status(err: &ViewerError) -> (StatusCode, &'static str) {
    match err {
        ViewerError::NotReady(_) | ViewerError::InvalidTransition { .. } | ViewerError::NoDocument => {
            (StatusCode::CONFLICT, "invalid_state")
        }
        ViewerError::PageOutOfRange { .. } => (StatusCode::BAD_REQUEST, "page_out_of_range"),
        ViewerError::PageFailed { .. } => (StatusCode::BAD_GATEWAY, "page_failed"),
        ViewerError::RemoteResource(_) | ViewerError::DirectRendering(_) => {
            (StatusCode::CONFLICT, "direct_rendering")
        }
        ViewerError::ResourceReleased(_) => (StatusCode::GONE, "resource_released"),
        ViewerError::Decode(_) => (StatusCode::UNPROCESSABLE_ENTITY, "decode_error"),
        ViewerError::SessionNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        ViewerError::TooManySessions(_) => (StatusCode::SERVICE_UNAVAILABLE, "too_many_sessions"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone()),
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Storage(e) => {
                tracing::error!("Storage error: {}", e);
                match e {
                    StorageError::ObjectNotFound(key) => {
                        (StatusCode::NOT_FOUND, "not_found", format!("Object not found: {}", key))
                    }
                    StorageError::AccessDenied(_) => (
                        StatusCode::FORBIDDEN,
                        "access_denied",
                        "Access denied".to_string(),
                    ),
                    StorageError::AlreadyExists(key) => {
                        (StatusCode::CONFLICT, "conflict", format!("Object already exists: {}", key))
                    }
                    _ => (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "storage_error",
                        "Storage error".to_string(),
                    ),
                }
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "Database error".to_string(),
                )
            }
            AppError::Metadata(e) => {
                tracing::error!("Metadata error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "metadata_error",
                    "Document metadata unavailable".to_string(),
                )
            }
            AppError::Viewer(e) => {
                let (status, error_type) = viewer_status(e);
                if status.is_server_error() {
                    tracing::warn!("Viewer error: {}", e);
                }
                (status, error_type, e.to_string())
            }
            AppError::Job(e) => {
                tracing::error!("Job error: {}", e);
                match e {
                    JobError::Unavailable(_) => {
                        (StatusCode::SERVICE_UNAVAILABLE, "job_unavailable", e.to_string())
                    }
                    JobError::UnknownJob(_) => (StatusCode::BAD_REQUEST, "bad_request", e.to_string()),
                    JobError::DocumentNotFound(_) => (StatusCode::NOT_FOUND, "not_found", e.to_string()),
                    JobError::PollLimit { .. } => {
                        (StatusCode::GATEWAY_TIMEOUT, "processing_timeout", e.to_string())
                    }
                    _ => (StatusCode::BAD_GATEWAY, "job_error", e.to_string()),
                }
            }
        };

        let body = Json(ErrorResponse {
            error: error_type.to_string(),
            message,
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (status, body).into_response()
    }
}
