//! Viewer error types
//!
//! Page-level failures (`FetchError`, `DecodeError`) never end a session;
//! they degrade to a per-page error. `ViewerError` is what commands return.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::decoder::DecodeError;
use crate::document::MetadataError;
use crate::error::StorageError;

use super::types::ViewerPhase;

/// Most specific reason a page could not be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchErrorKind {
    NotFound,
    DownloadFailed,
    EmptyPayload,
}

impl fmt::Display for FetchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NotFound => "not-found",
            Self::DownloadFailed => "download-failed",
            Self::EmptyPayload => "empty-payload",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct FetchError {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::NotFound,
            message: message.into(),
        }
    }

    pub fn download_failed(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::DownloadFailed,
            message: message.into(),
        }
    }

    pub fn empty_payload(path: &str) -> Self {
        Self {
            kind: FetchErrorKind::EmptyPayload,
            message: format!("{} is empty", path),
        }
    }
}

impl From<StorageError> for FetchError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ObjectNotFound(key) => Self::not_found(format!("object {} not found", key)),
            other => Self::download_failed(other.to_string()),
        }
    }
}

impl From<MetadataError> for FetchError {
    fn from(err: MetadataError) -> Self {
        Self::download_failed(err.to_string())
    }
}

/// Why a single page ended up without a renderable handle
#[derive(Debug, Clone, Error)]
pub enum PageFailure {
    #[error("fetch failed: {0}")]
    Fetch(FetchError),

    /// The bytes arrived but the decoder rejected them
    #[error("decode failed: {0}")]
    Decode(DecodeError),
}

/// Failure category shown to the UI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    /// Network or storage problem
    Fetch,
    /// File may be corrupt
    Decode,
}

impl PageFailure {
    pub fn category(&self) -> FailureCategory {
        match self {
            Self::Fetch(_) => FailureCategory::Fetch,
            Self::Decode(_) => FailureCategory::Decode,
        }
    }
}

/// Errors returned by viewer session commands and queries
#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("Viewer is {0}, expected ready")]
    NotReady(ViewerPhase),

    #[error("Cannot {action} while viewer is {phase}")]
    InvalidTransition {
        phase: ViewerPhase,
        action: &'static str,
    },

    #[error("No document is open")]
    NoDocument,

    #[error("Page {page} is out of range (1-{total})")]
    PageOutOfRange { page: u32, total: u32 },

    #[error("Page {page} failed permanently: {failure}")]
    PageFailed { page: u32, failure: PageFailure },

    /// The page is served from a remote URL and is painted by the client
    #[error("Page is available at {0}")]
    RemoteResource(String),

    /// The active render strategy does not page through the cache
    #[error("Document is rendered directly from {0}")]
    DirectRendering(String),

    #[error("Resource {0} was already released")]
    ResourceReleased(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Too many open viewer sessions (max: {0})")]
    TooManySessions(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_errors_map_to_fetch_kinds() {
        let missing: FetchError = StorageError::ObjectNotFound("a.pdf".into()).into();
        assert_eq!(missing.kind, FetchErrorKind::NotFound);

        let network: FetchError = StorageError::SdkError("connection reset".into()).into();
        assert_eq!(network.kind, FetchErrorKind::DownloadFailed);

        let metadata: FetchError = MetadataError::QueryFailed("timeout".into()).into();
        assert_eq!(metadata.kind, FetchErrorKind::DownloadFailed);
    }

    #[test]
    fn test_fetch_error_display() {
        let err = FetchError::empty_payload("split_pages/d/page_1.pdf");
        assert_eq!(err.to_string(), "empty-payload: split_pages/d/page_1.pdf is empty");
    }
}
