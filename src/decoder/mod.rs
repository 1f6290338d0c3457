//! Page decoding environment
//!
//! Validates fetched page bytes and rasterises pages. The environment is an
//! explicit object handed to each viewer session, with its own init/teardown
//! lifecycle, instead of process-wide decoder state.
//!
//! # Thread Safety
//!
//! Decoders are synchronous and CPU-bound. All calls go through
//! `tokio::task::spawn_blocking` wrapped in a timeout.

#[cfg(feature = "mupdf-render")]
mod mupdf;
mod pdf_model;

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::document::ContentKind;

#[cfg(feature = "mupdf-render")]
pub use self::mupdf::MupdfDecoder;
pub use pdf_model::LopdfDecoder;

/// Timeout for a single inspect or render call
const DECODE_TIMEOUT_SECS: u64 = 30;

/// Inspection results kept per resource
const DEFAULT_INSPECTION_CACHE: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Not a PDF or supported image")]
    InvalidHeader,

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Page index {index} out of range ({count} pages)")]
    PageOutOfRange { index: u32, count: u32 },

    #[error("Image error: {0}")]
    Image(String),

    #[error("Decoder environment is not initialised")]
    NotInitialized,

    #[error("Decode timed out after {0}s")]
    Timeout(u64),

    #[error("Decode task failed: {0}")]
    Task(String),
}

/// What a decoder learned about a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedInfo {
    /// `None` when the decoder cannot tell
    pub num_pages: Option<u32>,
    pub kind: ContentKind,
}

/// A rendered page, PNG-encoded
#[derive(Debug, Clone)]
pub struct PageSurface {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

/// Synchronous page decoder
pub trait PdfDecoder: Send + Sync {
    fn name(&self) -> &'static str;

    /// Validate bytes and count pages
    fn inspect(&self, data: &[u8]) -> Result<DecodedInfo, DecodeError>;

    /// Rasterise one page (0-based) at `scale`
    fn render(
        &self,
        data: &[u8],
        kind: ContentKind,
        page_index: u32,
        scale: f32,
    ) -> Result<PageSurface, DecodeError>;
}

/// Best decoder compiled into this build
pub fn default_decoder() -> Arc<dyn PdfDecoder> {
    #[cfg(feature = "mupdf-render")]
    {
        Arc::new(MupdfDecoder::new())
    }
    #[cfg(not(feature = "mupdf-render"))]
    {
        Arc::new(LopdfDecoder::new())
    }
}

pub struct DecoderEnvironment {
    decoder: Arc<dyn PdfDecoder>,
    ready: AtomicBool,
    inspections: Mutex<LruCache<Uuid, DecodedInfo>>,
    timeout: Duration,
}

impl DecoderEnvironment {
    pub fn new(decoder: Arc<dyn PdfDecoder>) -> Self {
        Self::with_capacity(decoder, DEFAULT_INSPECTION_CACHE)
    }

    pub fn with_capacity(decoder: Arc<dyn PdfDecoder>, inspections: usize) -> Self {
        let capacity = NonZeroUsize::new(inspections).unwrap_or(NonZeroUsize::MIN);
        Self {
            decoder,
            ready: AtomicBool::new(false),
            inspections: Mutex::new(LruCache::new(capacity)),
            timeout: Duration::from_secs(DECODE_TIMEOUT_SECS),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Mark the environment usable. Idempotent.
    pub fn init(&self) {
        if !self.ready.swap(true, Ordering::SeqCst) {
            tracing::info!(decoder = self.decoder.name(), "Decoder environment initialised");
        }
    }

    /// Drop cached inspections and refuse further work until `init` is called again
    pub fn teardown(&self) {
        if self.ready.swap(false, Ordering::SeqCst) {
            self.inspections.lock().clear();
            tracing::info!(decoder = self.decoder.name(), "Decoder environment torn down");
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    fn ensure_ready(&self) -> Result<(), DecodeError> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(DecodeError::NotInitialized)
        }
    }

    /// Inspect a resource, memoised by its id
    pub async fn inspect(&self, key: Uuid, data: Arc<Vec<u8>>) -> Result<DecodedInfo, DecodeError> {
        self.ensure_ready()?;
        if let Some(info) = self.inspections.lock().get(&key) {
            return Ok(*info);
        }

        let decoder = self.decoder.clone();
        let info = self
            .run_blocking(move || decoder.inspect(&data))
            .await?;

        self.inspections.lock().put(key, info);
        Ok(info)
    }

    /// Forget a memoised inspection, e.g. once its resource was revoked
    pub fn forget(&self, key: &Uuid) {
        self.inspections.lock().pop(key);
    }

    pub async fn render(
        &self,
        data: Arc<Vec<u8>>,
        kind: ContentKind,
        page_index: u32,
        scale: f32,
    ) -> Result<PageSurface, DecodeError> {
        self.ensure_ready()?;
        let decoder = self.decoder.clone();
        self.run_blocking(move || decoder.render(&data, kind, page_index, scale))
            .await
    }

    async fn run_blocking<T, F>(&self, work: F) -> Result<T, DecodeError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DecodeError> + Send + 'static,
    {
        let secs = self.timeout.as_secs();
        tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(work))
            .await
            .map_err(|_| DecodeError::Timeout(secs))?
            .map_err(|e| DecodeError::Task(format!("Task join error: {}", e)))?
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingDecoder {
        calls: AtomicUsize,
    }

    impl PdfDecoder for CountingDecoder {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn inspect(&self, _data: &[u8]) -> Result<DecodedInfo, DecodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(DecodedInfo {
                num_pages: Some(1),
                kind: ContentKind::PdfPage,
            })
        }

        fn render(&self, _: &[u8], _: ContentKind, _: u32, _: f32) -> Result<PageSurface, DecodeError> {
            std::thread::sleep(Duration::from_millis(200));
            Err(DecodeError::Unsupported("slow".into()))
        }
    }

    #[tokio::test]
    async fn test_requires_init() {
        let env = DecoderEnvironment::new(Arc::new(LopdfDecoder::new()));
        let result = env
            .inspect(Uuid::new_v4(), Arc::new(fixtures::pdf_with_pages(2)))
            .await;
        assert_eq!(result, Err(DecodeError::NotInitialized));

        env.init();
        let info = env
            .inspect(Uuid::new_v4(), Arc::new(fixtures::pdf_with_pages(2)))
            .await
            .unwrap();
        assert_eq!(info.num_pages, Some(2));

        env.teardown();
        assert!(!env.is_ready());
    }

    #[tokio::test]
    async fn test_inspections_are_memoised() {
        let decoder = Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
        });
        let env = DecoderEnvironment::new(decoder.clone());
        env.init();

        let key = Uuid::new_v4();
        let data = Arc::new(vec![1, 2, 3]);
        env.inspect(key, data.clone()).await.unwrap();
        env.inspect(key, data.clone()).await.unwrap();
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 1);

        env.forget(&key);
        env.inspect(key, data).await.unwrap();
        assert_eq!(decoder.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_render_timeout() {
        let env = DecoderEnvironment::new(Arc::new(CountingDecoder {
            calls: AtomicUsize::new(0),
        }))
        .with_timeout(Duration::from_millis(20));
        env.init();

        let result = env
            .render(Arc::new(Vec::new()), ContentKind::PdfPage, 0, 1.0)
            .await;
        assert_eq!(result.unwrap_err(), DecodeError::Timeout(0));
    }
}
