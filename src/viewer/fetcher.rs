//! Page data fetcher
//!
//! Resolves one page of a document to a [`PageHandle`]:
//!
//! 1. A pre-split record exists: raster pages are served from their public
//!    URL, PDF pages are downloaded and registered as a local resource.
//! 2. No split record: the whole original is downloaded once per document and
//!    every page shares that single handle.
//!
//! Concurrent requests for the same page share one in-flight future.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::document::{ContentKind, MetadataStore, SplitPage};
use crate::storage::BlobStore;

use super::error::FetchError;
use super::resource::ResourceRegistry;
use super::types::{ObjectUrl, PageHandle, ResourceRef};

type FetchResult = Result<PageHandle, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

/// The whole original document, shared by every page.
///
/// Revoked when the last reference goes away, so a download that finishes
/// after its document was released still frees its bytes exactly once.
struct WholeDocument {
    url: ObjectUrl,
    size_bytes: u64,
    kind: ContentKind,
    registry: Arc<ResourceRegistry>,
}

impl Drop for WholeDocument {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

struct FetcherInner {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    registry: Arc<ResourceRegistry>,
    timeout: Duration,
    in_flight: Mutex<HashMap<(String, u32), SharedFetch>>,
    documents: Mutex<HashMap<String, Arc<OnceCell<WholeDocument>>>>,
}

#[derive(Clone)]
pub struct PageFetcher {
    inner: Arc<FetcherInner>,
}

impl PageFetcher {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        registry: Arc<ResourceRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(FetcherInner {
                metadata,
                blobs,
                registry,
                timeout,
                in_flight: Mutex::new(HashMap::new()),
                documents: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Fetch a page, joining any in-flight request for the same page
    pub async fn fetch_page(&self, document_id: &str, page_number: u32) -> FetchResult {
        let key = (document_id.to_string(), page_number);

        let shared = {
            let mut in_flight = self.inner.in_flight.lock();
            match in_flight.get(&key) {
                Some(existing) => {
                    tracing::debug!(document_id, page = page_number, "Joining in-flight fetch");
                    existing.clone()
                }
                None => {
                    let inner = self.inner.clone();
                    let task_key = key.clone();
                    let fetch = async move {
                        let result = inner.fetch_with_timeout(&task_key.0, task_key.1).await;
                        inner.in_flight.lock().remove(&task_key);
                        result
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(key, fetch.clone());
                    fetch
                }
            }
        };

        shared.await
    }

    /// Requests currently in flight
    pub fn in_flight_count(&self) -> usize {
        self.inner.in_flight.lock().len()
    }

    /// Drop the shared whole-document handle of a document.
    ///
    /// Returns whether one was held.
    pub fn release_document(&self, document_id: &str) -> bool {
        let released = self.inner.documents.lock().remove(document_id).is_some();
        if released {
            tracing::debug!(document_id, "Released whole-document handle");
        }
        released
    }

    /// Drop every whole-document handle
    pub fn release_all(&self) {
        let documents = std::mem::take(&mut *self.inner.documents.lock());
        if !documents.is_empty() {
            tracing::debug!(count = documents.len(), "Released whole-document handles");
        }
    }
}

impl FetcherInner {
    async fn fetch_with_timeout(&self, document_id: &str, page_number: u32) -> FetchResult {
        match tokio::time::timeout(self.timeout, self.fetch(document_id, page_number)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    document_id,
                    page = page_number,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Page fetch timed out"
                );
                Err(FetchError::download_failed(format!(
                    "page {} timed out after {}ms",
                    page_number,
                    self.timeout.as_millis()
                )))
            }
        }
    }

    async fn fetch(&self, document_id: &str, page_number: u32) -> FetchResult {
        match self.metadata.get_split_page(document_id, page_number).await? {
            Some(split) => self.fetch_split_page(split).await,
            None => self.fetch_from_whole_document(document_id, page_number).await,
        }
    }

    async fn fetch_split_page(&self, split: SplitPage) -> FetchResult {
        if ContentKind::from_path(&split.file_path) == ContentKind::RasterImage {
            return Ok(PageHandle {
                page_number: split.page_number,
                resource: ResourceRef::Remote(self.blobs.public_url(&split.file_path)),
                size_bytes: split.file_size,
                content_kind: ContentKind::RasterImage,
            });
        }

        let bytes = self.blobs.download(&split.file_path).await?;
        if bytes.is_empty() {
            return Err(FetchError::empty_payload(&split.file_path));
        }

        let kind = ContentKind::detect(&bytes, &split.file_path);
        let content_type = kind.media_type(&bytes, &split.file_path);
        let size_bytes = bytes.len() as u64;
        let url = self.registry.create(bytes, content_type);
        tracing::debug!(
            page = split.page_number,
            size_bytes,
            resource = %url,
            "Fetched split page"
        );

        Ok(PageHandle {
            page_number: split.page_number,
            resource: ResourceRef::Local(url),
            size_bytes,
            content_kind: kind,
        })
    }

    async fn fetch_from_whole_document(&self, document_id: &str, page_number: u32) -> FetchResult {
        let cell = self
            .documents
            .lock()
            .entry(document_id.to_string())
            .or_default()
            .clone();

        let whole = cell
            .get_or_try_init(|| self.download_whole_document(document_id))
            .await?;

        Ok(PageHandle {
            page_number,
            resource: ResourceRef::Document(whole.url),
            size_bytes: whole.size_bytes,
            content_kind: whole.kind,
        })
    }

    async fn download_whole_document(&self, document_id: &str) -> Result<WholeDocument, FetchError> {
        let info = self
            .metadata
            .get_document(document_id)
            .await?
            .ok_or_else(|| FetchError::not_found(format!("document {} not found", document_id)))?;

        tracing::info!(
            document_id,
            path = %info.file_path,
            "No split pages, downloading whole document"
        );

        let bytes = self.blobs.download(&info.file_path).await?;
        if bytes.is_empty() {
            return Err(FetchError::empty_payload(&info.file_path));
        }

        let kind = ContentKind::detect(&bytes, &info.file_path);
        let content_type = kind.media_type(&bytes, &info.file_path);
        let size_bytes = bytes.len() as u64;
        let url = self.registry.create(bytes, content_type);

        Ok(WholeDocument {
            url,
            size_bytes,
            kind,
            registry: self.registry.clone(),
        })
    }
}
