//! Metadata query interface
//!
//! The relational metadata table is owned by the backend. The viewer reads
//! it, registers new uploads and resets status before a processing retry.

use async_trait::async_trait;

use super::error::MetadataError;
use super::types::{DocumentInfo, ProcessingStatus, SplitPage};

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Record a newly uploaded document
    async fn register_document(&self, info: &DocumentInfo) -> Result<(), MetadataError>;

    /// Fetch a document record
    async fn get_document(&self, id: &str) -> Result<Option<DocumentInfo>, MetadataError>;

    /// Look up the pre-split file for one page
    async fn get_split_page(
        &self,
        document_id: &str,
        page_number: u32,
    ) -> Result<Option<SplitPage>, MetadataError>;

    /// All split pages of a document, ordered by page number
    async fn list_split_pages(&self, document_id: &str) -> Result<Vec<SplitPage>, MetadataError>;

    /// Remove partial split-page records, returning how many were deleted
    async fn clear_split_pages(&self, document_id: &str) -> Result<u64, MetadataError>;

    /// Overwrite the processing status of a document
    async fn set_processing_status(
        &self,
        document_id: &str,
        status: ProcessingStatus,
    ) -> Result<(), MetadataError>;
}
