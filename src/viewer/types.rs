//! Viewer types

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};
use uuid::Uuid;

use crate::document::{ContentKind, ProcessingStatus};

use super::error::{FailureCategory, PageFailure};
use super::strategy::{RenderPlan, RenderStrategy};

/// Route prefix under which locally-owned resources are served
pub const RESOURCE_ROUTE_PREFIX: &str = "/api/v1/resources/";

/// Handle to bytes held in the resource registry.
///
/// Must be revoked exactly once, on eviction or session teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectUrl(Uuid);

impl ObjectUrl {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_id(id: Uuid) -> Self {
        Self(id)
    }

    pub fn id(&self) -> Uuid {
        self.0
    }

    pub fn href(&self) -> String {
        format!("{}{}", RESOURCE_ROUTE_PREFIX, self.0)
    }
}

impl fmt::Display for ObjectUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", RESOURCE_ROUTE_PREFIX, self.0)
    }
}

impl Serialize for ObjectUrl {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Where the bytes of a page live
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "url", rename_all = "lowercase")]
pub enum ResourceRef {
    /// Backend-hosted per-page file, usable without downloading
    Remote(String),
    /// Bytes exclusively owned by one cache entry
    Local(ObjectUrl),
    /// Whole original document shared by every page (degraded mode).
    /// Owned by the fetcher, never released by the cache.
    Document(ObjectUrl),
}

impl ResourceRef {
    pub fn object_url(&self) -> Option<ObjectUrl> {
        match self {
            Self::Remote(_) => None,
            Self::Local(url) | Self::Document(url) => Some(*url),
        }
    }

    pub fn href(&self) -> String {
        match self {
            Self::Remote(url) => url.clone(),
            Self::Local(url) | Self::Document(url) => url.href(),
        }
    }
}

/// One resolved, renderable page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageHandle {
    pub page_number: u32,
    pub resource: ResourceRef,
    /// Diagnostics only
    pub size_bytes: u64,
    pub content_kind: ContentKind,
}

/// Contiguous window of pages that should be resident
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn contains(&self, page: u32) -> bool {
        page >= self.start && page <= self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

/// Viewer lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewerPhase {
    Idle,
    LoadingMetadata,
    Ready,
    /// Backend processing has not finished; not an error
    Processing,
    Error,
}

impl fmt::Display for ViewerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::LoadingMetadata => "loading-metadata",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Error => "error",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionErrorKind {
    /// Backend query failed
    Metadata,
    NotFound,
    /// A backend job reported `failed`; re-invoking it is the recovery
    ProcessingFailed,
}

/// Document-level failure that put the session into `Error`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

/// Per-page error surfaced to the UI
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageErrorInfo {
    pub page: u32,
    pub category: FailureCategory,
    pub message: String,
}

impl PageErrorInfo {
    pub fn new(page: u32, failure: &PageFailure) -> Self {
        Self {
            page,
            category: failure.category(),
            message: failure.to_string(),
        }
    }
}

/// State of one page as seen by the UI
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum PageStatus {
    Ready { handle: PageHandle },
    Loading,
    Failed { error: PageErrorInfo },
    NotLoaded,
}

/// Immutable view of a session, published on every state change
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerSnapshot {
    pub phase: ViewerPhase,
    pub document_id: Option<String>,
    pub error: Option<SessionError>,
    pub processing_status: Option<ProcessingStatus>,
    pub current_page: u32,
    pub total_pages: Option<u32>,
    pub scale: f32,
    pub visible_range: Option<PageRange>,
    pub strategy: Option<RenderStrategy>,
    pub plan: Option<RenderPlan>,
    pub loading_pages: Vec<u32>,
    pub error_pages: Vec<PageErrorInfo>,
    pub cached_pages: Vec<u32>,
    pub retry_counts: BTreeMap<u32, u32>,
}

impl ViewerSnapshot {
    pub fn idle(scale: f32) -> Self {
        Self {
            phase: ViewerPhase::Idle,
            document_id: None,
            error: None,
            processing_status: None,
            current_page: 1,
            total_pages: None,
            scale,
            visible_range: None,
            strategy: None,
            plan: None,
            loading_pages: Vec::new(),
            error_pages: Vec::new(),
            cached_pages: Vec::new(),
            retry_counts: BTreeMap::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_url_href() {
        let url = ObjectUrl::new();
        assert!(url.href().starts_with("/api/v1/resources/"));
        assert_eq!(url.href(), url.to_string());
    }

    #[test]
    fn test_resource_ref_serialization() {
        let remote = ResourceRef::Remote("https://cdn/x.png".into());
        let json = serde_json::to_value(&remote).unwrap();
        assert_eq!(json["type"], "remote");
        assert_eq!(json["url"], "https://cdn/x.png");

        let url = ObjectUrl::new();
        let json = serde_json::to_value(ResourceRef::Local(url)).unwrap();
        assert_eq!(json["type"], "local");
        assert_eq!(json["url"], url.href());
    }

    #[test]
    fn test_page_range() {
        let range = PageRange { start: 8, end: 12 };
        assert_eq!(range.len(), 5);
        assert!(range.contains(8) && range.contains(12));
        assert!(!range.contains(13));
        assert_eq!(range.pages().collect::<Vec<_>>(), vec![8, 9, 10, 11, 12]);
    }
}
