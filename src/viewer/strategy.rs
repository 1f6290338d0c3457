//! Render strategy selection
//!
//! Decides how a document is painted from what the backend has produced so
//! far. Re-evaluated whenever the document record changes.

use serde::Serialize;

use crate::document::{DocumentInfo, ProcessingStatus, SplitPage};
use crate::storage::BlobStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStrategy {
    /// Split index complete; only the visible range is resident
    VirtualPaging,
    /// Stream the linearized whole file
    HybridStreaming,
    /// Some split pages exist; render each from its own file
    SplitPages,
    /// Original upload, no page-level caching
    WholeFile,
}

impl RenderStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VirtualPaging => "virtual-paging",
            Self::HybridStreaming => "hybrid-streaming",
            Self::SplitPages => "split-pages",
            Self::WholeFile => "whole-file",
        }
    }

    /// Whether pages go through the session's page cache
    pub fn uses_page_cache(&self) -> bool {
        matches!(self, Self::VirtualPaging)
    }
}

/// A split index is usable for paging once the split job finished or every
/// page has a record.
fn split_index_complete(info: &DocumentInfo, split_pages: &[SplitPage]) -> bool {
    if split_pages.is_empty() {
        return false;
    }
    info.processing_status == ProcessingStatus::Completed
        || info.total_pages == Some(split_pages.len() as u32)
}

pub fn select_strategy(info: &DocumentInfo, split_pages: &[SplitPage]) -> RenderStrategy {
    if split_index_complete(info, split_pages) {
        RenderStrategy::VirtualPaging
    } else if info.linearized_path().is_some() {
        RenderStrategy::HybridStreaming
    } else if !split_pages.is_empty() {
        RenderStrategy::SplitPages
    } else {
        RenderStrategy::WholeFile
    }
}

/// Directly usable URL of one split page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedPage {
    pub page_number: u32,
    pub url: String,
}

/// What the client needs to paint a document under a strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum RenderPlan {
    #[serde(rename_all = "camelCase")]
    Virtual { preload_distance: u32 },
    Stream { url: String },
    PerPage { pages: Vec<PlannedPage> },
    WholeFile { url: String },
}

impl RenderPlan {
    pub fn build(
        strategy: RenderStrategy,
        info: &DocumentInfo,
        split_pages: &[SplitPage],
        blobs: &dyn BlobStore,
        preload_distance: u32,
    ) -> Self {
        match strategy {
            RenderStrategy::VirtualPaging => Self::Virtual { preload_distance },
            RenderStrategy::HybridStreaming => Self::Stream {
                url: blobs.public_url(info.linearized_path().unwrap_or(&info.file_path)),
            },
            RenderStrategy::SplitPages => Self::PerPage {
                pages: split_pages
                    .iter()
                    .map(|page| PlannedPage {
                        page_number: page.page_number,
                        url: blobs.public_url(&page.file_path),
                    })
                    .collect(),
            },
            RenderStrategy::WholeFile => Self::WholeFile {
                url: blobs.public_url(&info.file_path),
            },
        }
    }
}
