//! Metadata store errors

use thiserror::Error;

/// Errors raised by the backend metadata query interface
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The backend could not be reached or the query failed
    #[error("Metadata query failed: {0}")]
    QueryFailed(String),

    /// A row exists but could not be interpreted
    #[error("Invalid metadata record: {0}")]
    InvalidRecord(String),
}

impl From<sqlx::Error> for MetadataError {
    fn from(err: sqlx::Error) -> Self {
        MetadataError::QueryFailed(err.to_string())
    }
}
