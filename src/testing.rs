//! In-memory backends for unit tests

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::decoder::fixtures::pdf_with_pages;
use crate::decoder::{DecoderEnvironment, LopdfDecoder};
use crate::document::{DocumentInfo, MetadataError, MetadataStore, ProcessingStatus, SplitPage};
use crate::error::StorageError;
use crate::jobs::{JobError, JobInvoker, JobKind, JobPayload};
use crate::storage::{join_public_url, BlobStore, UploadOptions};
use crate::viewer::{ResourceRegistry, ViewerContext};

/// Blob store backed by a map, counting every download attempt
pub struct MemoryBlobStore {
    base_url: String,
    objects: Mutex<HashMap<String, Vec<u8>>>,
    downloads: Mutex<HashMap<String, usize>>,
    delay: Mutex<Duration>,
}

impl MemoryBlobStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            objects: Mutex::default(),
            downloads: Mutex::default(),
            delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn put(&self, path: &str, data: Vec<u8>) {
        self.objects.lock().insert(path.to_string(), data);
    }

    pub fn remove(&self, path: &str) {
        self.objects.lock().remove(path);
    }

    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects.lock().get(path).cloned()
    }

    /// Downloads attempted for a path, failed ones included
    pub fn download_count(&self, path: &str) -> usize {
        self.downloads.lock().get(path).copied().unwrap_or(0)
    }

    /// Latency added to every download
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        *self.downloads.lock().entry(path.to_string()).or_insert(0) += 1;

        let delay = *self.delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.get(path)
            .ok_or_else(|| StorageError::ObjectNotFound(path.to_string()))
    }

    fn public_url(&self, path: &str) -> String {
        join_public_url(&self.base_url, path)
    }

    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        options: UploadOptions,
    ) -> Result<(), StorageError> {
        let mut objects = self.objects.lock();
        if !options.upsert && objects.contains_key(path) {
            return Err(StorageError::AlreadyExists(path.to_string()));
        }
        objects.insert(path.to_string(), data);
        Ok(())
    }
}

/// Metadata store backed by maps
#[derive(Default)]
pub struct MemoryMetadataStore {
    documents: Mutex<HashMap<String, DocumentInfo>>,
    pages: Mutex<HashMap<String, Vec<SplitPage>>>,
    /// Statuses handed out by successive document reads
    scripted: Mutex<HashMap<String, VecDeque<ProcessingStatus>>>,
    failing: AtomicBool,
    document_queries: AtomicUsize,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_document(&self, info: DocumentInfo) {
        self.documents.lock().insert(info.id.clone(), info);
    }

    pub fn insert_split_page(&self, document_id: &str, page_number: u32, path: &str) {
        let mut pages = self.pages.lock();
        let list = pages.entry(document_id.to_string()).or_default();
        list.retain(|p| p.page_number != page_number);
        list.push(SplitPage {
            page_number,
            file_path: path.to_string(),
            file_size: 1024,
        });
        list.sort_by_key(|p| p.page_number);
    }

    pub fn set_status(&self, document_id: &str, status: ProcessingStatus) {
        if let Some(info) = self.documents.lock().get_mut(document_id) {
            info.processing_status = status;
        }
    }

    /// Each document read advances through `statuses`, the last one sticks
    pub fn script_statuses(&self, document_id: &str, statuses: Vec<ProcessingStatus>) {
        self.scripted
            .lock()
            .insert(document_id.to_string(), statuses.into());
    }

    /// Make every query fail until switched off again
    pub fn fail_queries(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn document_queries(&self) -> usize {
        self.document_queries.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), MetadataError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(MetadataError::QueryFailed("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn register_document(&self, info: &DocumentInfo) -> Result<(), MetadataError> {
        self.check()?;
        self.insert_document(info.clone());
        Ok(())
    }

    async fn get_document(&self, id: &str) -> Result<Option<DocumentInfo>, MetadataError> {
        self.document_queries.fetch_add(1, Ordering::SeqCst);
        self.check()?;

        let next = {
            let mut scripted = self.scripted.lock();
            scripted.get_mut(id).and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().copied()
                }
            })
        };
        if let Some(status) = next {
            self.set_status(id, status);
        }

        Ok(self.documents.lock().get(id).cloned())
    }

    async fn get_split_page(
        &self,
        document_id: &str,
        page_number: u32,
    ) -> Result<Option<SplitPage>, MetadataError> {
        self.check()?;
        Ok(self
            .pages
            .lock()
            .get(document_id)
            .and_then(|list| list.iter().find(|p| p.page_number == page_number).cloned()))
    }

    async fn list_split_pages(&self, document_id: &str) -> Result<Vec<SplitPage>, MetadataError> {
        self.check()?;
        Ok(self.pages.lock().get(document_id).cloned().unwrap_or_default())
    }

    async fn clear_split_pages(&self, document_id: &str) -> Result<u64, MetadataError> {
        self.check()?;
        Ok(self
            .pages
            .lock()
            .remove(document_id)
            .map_or(0, |list| list.len() as u64))
    }

    async fn set_processing_status(
        &self,
        document_id: &str,
        status: ProcessingStatus,
    ) -> Result<(), MetadataError> {
        self.check()?;
        self.set_status(document_id, status);
        Ok(())
    }
}

/// Job invoker that records calls instead of sending them
#[derive(Default)]
pub struct RecordingJobInvoker {
    calls: Mutex<Vec<(JobKind, JobPayload)>>,
    unavailable: Mutex<HashSet<JobKind>>,
}

impl RecordingJobInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unavailable(&self, job: JobKind) {
        self.unavailable.lock().insert(job);
    }

    pub fn calls(&self) -> Vec<(JobKind, JobPayload)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl JobInvoker for RecordingJobInvoker {
    async fn invoke(&self, job: JobKind, payload: &JobPayload) -> Result<(), JobError> {
        self.calls.lock().push((job, payload.clone()));
        if self.unavailable.lock().contains(&job) {
            return Err(JobError::Unavailable(format!("{} not installed", job)));
        }
        Ok(())
    }
}

/// A viewer context wired to in-memory backends
pub struct TestContext {
    pub ctx: ViewerContext,
    pub metadata: Arc<MemoryMetadataStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub registry: Arc<ResourceRegistry>,
}

impl TestContext {
    pub fn split_path(document_id: &str, page: u32) -> String {
        crate::storage::keys::split_page_key(document_id, page)
    }

    /// Completed document whose pages are all split and stored
    pub fn seed_split_document(&self, document_id: &str, pages: u32) {
        self.metadata.insert_document(
            DocumentInfo::new(document_id, format!("uploads/{}.pdf", document_id))
                .with_status(ProcessingStatus::Completed)
                .with_total_pages(pages),
        );
        for page in 1..=pages {
            let path = Self::split_path(document_id, page);
            self.metadata.insert_split_page(document_id, page, &path);
            self.blobs.put(&path, pdf_with_pages(1));
        }
    }
}

pub fn test_context() -> TestContext {
    let metadata = Arc::new(MemoryMetadataStore::new());
    let blobs = Arc::new(MemoryBlobStore::new("https://cdn.example/archive"));
    let registry = Arc::new(ResourceRegistry::new());
    let decoder = Arc::new(DecoderEnvironment::new(Arc::new(LopdfDecoder::new())));
    decoder.init();

    TestContext {
        ctx: ViewerContext {
            metadata: metadata.clone(),
            blobs: blobs.clone(),
            decoder,
            registry: registry.clone(),
        },
        metadata,
        blobs,
        registry,
    }
}
