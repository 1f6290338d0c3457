//! Viewer session state machine
//!
//! One session views one document at a time and exclusively owns its page
//! cache, fetcher and retry state. Commands mutate state under a short lock,
//! then run I/O without holding it; every change is published as a
//! [`ViewerSnapshot`] on a watch channel.
//!
//! A generation counter is bumped whenever the document is (re)opened or
//! closed. Fetch results and scheduled retries carry the generation they were
//! started under and are discarded when it no longer matches.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::ViewerConfig;
use crate::decoder::{DecoderEnvironment, PageSurface};
use crate::document::{DocumentInfo, MetadataError, MetadataStore, ProcessingStatus, SplitPage};
use crate::storage::BlobStore;

use super::cache::PageCache;
use super::error::{FetchError, PageFailure, ViewerError};
use super::fetcher::PageFetcher;
use super::range::{compute_range, plan_fetches};
use super::resource::ResourceRegistry;
use super::retry::RetryManager;
use super::strategy::{select_strategy, RenderPlan, RenderStrategy};
use super::types::{
    PageErrorInfo, PageHandle, PageRange, PageStatus, ResourceRef, SessionError, SessionErrorKind,
    ViewerPhase, ViewerSnapshot,
};

pub const MIN_SCALE: f32 = 0.5;
pub const MAX_SCALE: f32 = 3.0;
pub const SCALE_STEP: f32 = 0.2;
pub const DEFAULT_SCALE: f32 = 1.0;

/// Apply a zoom step, snapping to one decimal and clamping to the scale bounds
pub fn step_scale(scale: f32, delta: f32) -> f32 {
    let next = ((scale + delta) * 10.0).round() / 10.0;
    next.clamp(MIN_SCALE, MAX_SCALE)
}

/// Per-session tuning
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub max_cached_pages: usize,
    pub preload_distance: u32,
    pub max_retries: u32,
    pub fetch_timeout: Duration,
}

impl From<&ViewerConfig> for SessionOptions {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            max_cached_pages: config.max_cached_pages,
            preload_distance: config.preload_distance,
            max_retries: config.max_retries,
            fetch_timeout: config.fetch_timeout(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&ViewerConfig::default())
    }
}

/// Backend collaborators shared by all sessions
#[derive(Clone)]
pub struct ViewerContext {
    pub metadata: Arc<dyn MetadataStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub decoder: Arc<DecoderEnvironment>,
    pub registry: Arc<ResourceRegistry>,
}

struct SessionState {
    phase: ViewerPhase,
    generation: u64,
    document_id: Option<String>,
    document: Option<DocumentInfo>,
    error: Option<SessionError>,
    current_page: u32,
    scale: f32,
    visible_range: Option<PageRange>,
    strategy: Option<RenderStrategy>,
    plan: Option<RenderPlan>,
    cache: PageCache,
    fetcher: Option<PageFetcher>,
    retries: RetryManager,
    loading: BTreeSet<u32>,
    errors: BTreeMap<u32, PageFailure>,
}

impl SessionState {
    fn total_pages(&self) -> Option<u32> {
        self.document.as_ref().and_then(|doc| doc.total_pages)
    }

    fn is_paging(&self) -> bool {
        self.phase == ViewerPhase::Ready
            && self.strategy.map_or(false, |s| s.uses_page_cache())
    }

    fn require_ready(&self) -> Result<(), ViewerError> {
        match self.phase {
            ViewerPhase::Ready => Ok(()),
            ViewerPhase::Idle => Err(ViewerError::NoDocument),
            phase => Err(ViewerError::NotReady(phase)),
        }
    }

    /// Ready, and pages go through the cache
    fn require_paging(&self) -> Result<(), ViewerError> {
        self.require_ready()?;
        if self.is_paging() {
            return Ok(());
        }
        let target = match &self.plan {
            Some(RenderPlan::Stream { url }) | Some(RenderPlan::WholeFile { url }) => url.clone(),
            _ => "per-page files".to_string(),
        };
        Err(ViewerError::DirectRendering(target))
    }

    fn check_page(&self, page: u32) -> Result<(), ViewerError> {
        let total = self.total_pages().unwrap_or(0);
        if page == 0 || page > total {
            return Err(ViewerError::PageOutOfRange { page, total });
        }
        Ok(())
    }

    fn fail(&mut self, kind: SessionErrorKind, message: String) {
        self.phase = ViewerPhase::Error;
        self.error = Some(SessionError { kind, message });
    }

    /// Release page resources and invalidate in-flight work
    fn reset_pages(&mut self) {
        self.generation += 1;
        self.retries.cancel_all();
        self.cache.release_all();
        if let Some(fetcher) = self.fetcher.take() {
            fetcher.release_all();
        }
        self.loading.clear();
        self.errors.clear();
        self.visible_range = None;
    }

    fn snapshot(&self) -> ViewerSnapshot {
        ViewerSnapshot {
            phase: self.phase,
            document_id: self.document_id.clone(),
            error: self.error.clone(),
            processing_status: self.document.as_ref().map(|doc| doc.processing_status),
            current_page: self.current_page,
            total_pages: self.total_pages(),
            scale: self.scale,
            visible_range: self.visible_range,
            strategy: self.strategy,
            plan: self.plan.clone(),
            loading_pages: self.loading.iter().copied().collect(),
            error_pages: self
                .errors
                .iter()
                .map(|(page, failure)| PageErrorInfo::new(*page, failure))
                .collect(),
            cached_pages: self.cache.pages(),
            retry_counts: self.retries.counts().collect(),
        }
    }
}

struct SessionInner {
    id: Uuid,
    ctx: ViewerContext,
    options: SessionOptions,
    state: Mutex<SessionState>,
    updates: watch::Sender<ViewerSnapshot>,
    last_active: Mutex<Instant>,
}

#[derive(Clone)]
pub struct ViewerSession {
    inner: Arc<SessionInner>,
}

impl ViewerSession {
    pub fn new(ctx: ViewerContext, options: SessionOptions) -> Self {
        let cache = PageCache::new(options.max_cached_pages, ctx.registry.clone());
        let state = SessionState {
            phase: ViewerPhase::Idle,
            generation: 0,
            document_id: None,
            document: None,
            error: None,
            current_page: 1,
            scale: DEFAULT_SCALE,
            visible_range: None,
            strategy: None,
            plan: None,
            cache,
            fetcher: None,
            retries: RetryManager::new(),
            loading: BTreeSet::new(),
            errors: BTreeMap::new(),
        };
        let (updates, _) = watch::channel(state.snapshot());

        Self {
            inner: Arc::new(SessionInner {
                id: Uuid::new_v4(),
                ctx,
                options,
                state: Mutex::new(state),
                updates,
                last_active: Mutex::new(Instant::now()),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// Record client activity, postponing idle expiry
    pub fn touch(&self) {
        *self.inner.last_active.lock() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.inner.last_active.lock().elapsed()
    }

    pub fn snapshot(&self) -> ViewerSnapshot {
        self.inner.state.lock().snapshot()
    }

    /// Receive a snapshot after every state change
    pub fn subscribe(&self) -> watch::Receiver<ViewerSnapshot> {
        self.inner.updates.subscribe()
    }

    pub fn document(&self) -> Option<DocumentInfo> {
        self.inner.state.lock().document.clone()
    }

    fn publish(&self, state: &SessionState) {
        self.inner.updates.send_replace(state.snapshot());
    }

    /// Open a document, replacing whatever was open before
    pub async fn open(&self, document_id: &str) -> Result<ViewerSnapshot, ViewerError> {
        let generation = {
            let mut state = self.inner.state.lock();
            if state.phase == ViewerPhase::LoadingMetadata {
                return Err(ViewerError::InvalidTransition {
                    phase: state.phase,
                    action: "open",
                });
            }
            if let Some(previous) = state.document_id.as_deref() {
                tracing::info!(
                    session_id = %self.inner.id,
                    previous,
                    document_id,
                    "Replacing open document"
                );
            }

            state.reset_pages();
            state.phase = ViewerPhase::LoadingMetadata;
            state.document_id = Some(document_id.to_string());
            state.document = None;
            state.error = None;
            state.strategy = None;
            state.plan = None;
            state.current_page = 1;
            self.publish(&state);
            state.generation
        };

        self.load_document(generation).await
    }

    /// Re-query the open document ("check again")
    pub async fn reload(&self) -> Result<ViewerSnapshot, ViewerError> {
        let generation = {
            let mut state = self.inner.state.lock();
            match state.phase {
                ViewerPhase::Idle => return Err(ViewerError::NoDocument),
                ViewerPhase::LoadingMetadata => {
                    return Err(ViewerError::InvalidTransition {
                        phase: state.phase,
                        action: "reload",
                    })
                }
                _ => {}
            }

            state.reset_pages();
            state.phase = ViewerPhase::LoadingMetadata;
            state.error = None;
            self.publish(&state);
            state.generation
        };

        self.load_document(generation).await
    }

    async fn load_document(&self, generation: u64) -> Result<ViewerSnapshot, ViewerError> {
        let document_id = self
            .inner
            .state
            .lock()
            .document_id
            .clone()
            .ok_or(ViewerError::NoDocument)?;

        let result = self.query_document(&document_id).await;

        let paging = {
            let mut state = self.inner.state.lock();
            if state.generation != generation {
                tracing::debug!(session_id = %self.inner.id, document_id, "Discarding superseded metadata");
                return Ok(state.snapshot());
            }

            match result {
                Ok(Some((info, split_pages))) => self.apply_document(&mut state, info, &split_pages),
                Ok(None) => {
                    tracing::warn!(session_id = %self.inner.id, document_id, "Document not found");
                    state.fail(
                        SessionErrorKind::NotFound,
                        format!("Document {} not found", document_id),
                    );
                }
                Err(e) => {
                    tracing::error!(session_id = %self.inner.id, document_id, error = %e, "Metadata query failed");
                    state.fail(SessionErrorKind::Metadata, e.to_string());
                }
            }

            self.publish(&state);
            state.is_paging()
        };

        if paging {
            self.refresh_range().await;
        }
        Ok(self.snapshot())
    }

    async fn query_document(
        &self,
        document_id: &str,
    ) -> Result<Option<(DocumentInfo, Vec<SplitPage>)>, MetadataError> {
        let metadata = &self.inner.ctx.metadata;
        let Some(info) = metadata.get_document(document_id).await? else {
            return Ok(None);
        };
        let split_pages = metadata.list_split_pages(document_id).await?;
        Ok(Some((info, split_pages)))
    }

    fn apply_document(&self, state: &mut SessionState, info: DocumentInfo, split_pages: &[SplitPage]) {
        let strategy = select_strategy(&info, split_pages);
        let plan = RenderPlan::build(
            strategy,
            &info,
            split_pages,
            self.inner.ctx.blobs.as_ref(),
            self.inner.options.preload_distance,
        );
        let status = info.processing_status;
        let total = info.total_pages.filter(|&total| total > 0);

        if status == ProcessingStatus::Failed {
            state.fail(
                SessionErrorKind::ProcessingFailed,
                format!("Processing of document {} failed", info.id),
            );
        } else if total.is_some() && (status.is_terminal() || !split_pages.is_empty()) {
            state.phase = ViewerPhase::Ready;
        } else {
            state.phase = ViewerPhase::Processing;
        }

        if let Some(total) = total {
            state.current_page = state.current_page.clamp(1, total);
        }
        state.strategy = Some(strategy);
        state.plan = Some(plan);

        if state.phase == ViewerPhase::Ready && strategy.uses_page_cache() {
            let ctx = &self.inner.ctx;
            state.fetcher = Some(PageFetcher::new(
                ctx.metadata.clone(),
                ctx.blobs.clone(),
                ctx.registry.clone(),
                self.inner.options.fetch_timeout,
            ));
            state.cache.set_focus(state.current_page);
        }

        tracing::info!(
            session_id = %self.inner.id,
            document_id = %info.id,
            status = %status,
            phase = %state.phase,
            strategy = strategy.as_str(),
            total_pages = ?total,
            split_pages = split_pages.len(),
            "Document loaded"
        );
        state.document = Some(info);
    }

    /// Navigate to a page, clamped to the document
    pub async fn go_to_page(&self, page: u32) -> Result<ViewerSnapshot, ViewerError> {
        let changed = {
            let mut state = self.inner.state.lock();
            state.require_ready()?;
            let total = state.total_pages().unwrap_or(1);
            let target = page.clamp(1, total);
            if target == state.current_page {
                false
            } else {
                state.current_page = target;
                state.cache.set_focus(target);
                self.publish(&state);
                true
            }
        };

        if changed {
            self.refresh_range().await;
        }
        Ok(self.snapshot())
    }

    pub async fn next_page(&self) -> Result<ViewerSnapshot, ViewerError> {
        let current = self.inner.state.lock().current_page;
        self.go_to_page(current.saturating_add(1)).await
    }

    pub async fn prev_page(&self) -> Result<ViewerSnapshot, ViewerError> {
        let current = self.inner.state.lock().current_page;
        self.go_to_page(current.saturating_sub(1)).await
    }

    pub fn zoom_in(&self) -> ViewerSnapshot {
        self.zoom(SCALE_STEP)
    }

    pub fn zoom_out(&self) -> ViewerSnapshot {
        self.zoom(-SCALE_STEP)
    }

    fn zoom(&self, delta: f32) -> ViewerSnapshot {
        let mut state = self.inner.state.lock();
        state.scale = step_scale(state.scale, delta);
        self.publish(&state);
        state.snapshot()
    }

    /// Force a fresh attempt for one page, resetting only its retry count
    pub async fn retry_page(&self, page: u32) -> Result<ViewerSnapshot, ViewerError> {
        let generation = {
            let mut state = self.inner.state.lock();
            state.require_paging()?;
            state.check_page(page)?;
            if state.cache.has(page) {
                return Ok(state.snapshot());
            }

            let fetching = state.loading.contains(&page) && !state.retries.is_pending(page);
            state.retries.reset(page);
            state.errors.remove(&page);
            if fetching {
                self.publish(&state);
                return Ok(state.snapshot());
            }

            state.loading.insert(page);
            self.publish(&state);
            state.generation
        };

        tracing::info!(session_id = %self.inner.id, page, "Manual page retry");
        self.load_and_settle(generation, page).await;
        Ok(self.snapshot())
    }

    /// Return to idle, releasing every resource the session holds
    pub fn close(&self) -> ViewerSnapshot {
        let mut state = self.inner.state.lock();
        if state.phase == ViewerPhase::Idle {
            return state.snapshot();
        }

        state.reset_pages();
        state.phase = ViewerPhase::Idle;
        state.document_id = None;
        state.document = None;
        state.error = None;
        state.strategy = None;
        state.plan = None;
        state.current_page = 1;
        tracing::info!(session_id = %self.inner.id, "Viewer closed");

        self.publish(&state);
        state.snapshot()
    }

    /// Current state of one page
    pub fn page(&self, page: u32) -> Result<PageStatus, ViewerError> {
        let state = self.inner.state.lock();
        state.require_ready()?;
        state.check_page(page)?;

        Ok(if let Some(handle) = state.cache.get(page) {
            PageStatus::Ready {
                handle: handle.clone(),
            }
        } else if let Some(failure) = state.errors.get(&page) {
            PageStatus::Failed {
                error: PageErrorInfo::new(page, failure),
            }
        } else if state.loading.contains(&page) {
            PageStatus::Loading
        } else {
            PageStatus::NotLoaded
        })
    }

    /// Rasterise a page at the current scale, loading it first if needed
    pub async fn render_page(&self, page: u32) -> Result<PageSurface, ViewerError> {
        let handle = self.resolve_page(page).await?;
        let (url, page_index) = match &handle.resource {
            ResourceRef::Remote(url) => return Err(ViewerError::RemoteResource(url.clone())),
            ResourceRef::Local(url) => (*url, 0),
            ResourceRef::Document(url) => (*url, page - 1),
        };

        let stored = self
            .inner
            .ctx
            .registry
            .resolve(&url)
            .ok_or_else(|| ViewerError::ResourceReleased(url.href()))?;
        let scale = self.inner.state.lock().scale;

        let surface = self
            .inner
            .ctx
            .decoder
            .render(stored.data, handle.content_kind, page_index, scale)
            .await?;
        Ok(surface)
    }

    async fn resolve_page(&self, page: u32) -> Result<PageHandle, ViewerError> {
        let mut updates = self.subscribe();
        loop {
            let start = {
                let mut state = self.inner.state.lock();
                state.require_paging()?;
                state.check_page(page)?;
                if let Some(handle) = state.cache.get(page) {
                    return Ok(handle.clone());
                }
                if let Some(failure) = state.errors.get(&page) {
                    return Err(ViewerError::PageFailed {
                        page,
                        failure: failure.clone(),
                    });
                }
                if state.loading.contains(&page) {
                    None
                } else {
                    state.loading.insert(page);
                    self.publish(&state);
                    Some(state.generation)
                }
            };

            match start {
                Some(generation) => {
                    if let Some(handle) = self.load_and_settle(generation, page).await {
                        return Ok(handle);
                    }
                }
                // Someone else is loading it; wait for the next state change
                None => {
                    if updates.changed().await.is_err() {
                        return Err(ViewerError::NoDocument);
                    }
                }
            }
        }
    }

    /// Recompute the visible range and fetch what it is missing, in parallel
    async fn refresh_range(&self) {
        let (generation, pages) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            if !state.is_paging() {
                return;
            }

            let total = state.total_pages().unwrap_or(1);
            let range = compute_range(state.current_page, self.inner.options.preload_distance, total);
            state.visible_range = Some(range);

            let cache = &state.cache;
            let loading = &state.loading;
            let errors = &state.errors;
            let pages = plan_fetches(range, state.current_page, |page| {
                cache.has(page) || loading.contains(&page) || errors.contains_key(&page)
            });
            state.loading.extend(pages.iter().copied());
            self.publish(state);
            (state.generation, pages)
        };

        if pages.is_empty() {
            return;
        }
        tracing::debug!(session_id = %self.inner.id, pages = ?pages, "Preloading pages");
        join_all(pages.into_iter().map(|page| self.load_page(generation, page))).await;
    }

    fn load_page(&self, generation: u64, page: u32) -> BoxFuture<'static, ()> {
        let session = self.clone();
        async move {
            session.load_and_settle(generation, page).await;
        }
        .boxed()
    }

    /// Fetch and validate one page, then record the outcome.
    ///
    /// Returns the handle on success.
    async fn load_and_settle(&self, generation: u64, page: u32) -> Option<PageHandle> {
        let target = {
            let state = self.inner.state.lock();
            if state.generation != generation {
                return None;
            }
            state.fetcher.clone().zip(state.document_id.clone())
        };
        let (fetcher, document_id) = target?;

        let outcome = match fetcher.fetch_page(&document_id, page).await {
            Ok(handle) => self.validate(handle).await,
            Err(err) => Err(PageFailure::Fetch(err)),
        };

        let handle = outcome.as_ref().ok().cloned();
        self.settle(generation, page, outcome);
        handle
    }

    /// Run locally-owned bytes past the decoder before caching them
    async fn validate(&self, handle: PageHandle) -> Result<PageHandle, PageFailure> {
        let url = match &handle.resource {
            ResourceRef::Local(url) => *url,
            _ => return Ok(handle),
        };

        let ctx = &self.inner.ctx;
        let Some(stored) = ctx.registry.resolve(&url) else {
            return Err(PageFailure::Fetch(FetchError::download_failed(format!(
                "resource {} released before validation",
                url
            ))));
        };

        match ctx.decoder.inspect(url.id(), stored.data).await {
            Ok(_) => Ok(handle),
            Err(err) => {
                ctx.registry.revoke(&url);
                ctx.decoder.forget(&url.id());
                Err(PageFailure::Decode(err))
            }
        }
    }

    fn settle(&self, generation: u64, page: u32, outcome: Result<PageHandle, PageFailure>) {
        let mut state = self.inner.state.lock();
        if state.generation != generation {
            if let Ok(PageHandle {
                resource: ResourceRef::Local(url),
                ..
            }) = &outcome
            {
                self.inner.ctx.registry.revoke(url);
            }
            tracing::debug!(session_id = %self.inner.id, page, "Discarding stale page result");
            return;
        }

        match outcome {
            Ok(handle) => {
                state.loading.remove(&page);
                state.errors.remove(&page);
                state.retries.record_success(page);
                state.cache.set(page, handle);
            }
            Err(failure) => {
                let session = self.clone();
                let scheduled = state.retries.schedule_retry(
                    page,
                    move || session.load_page(generation, page),
                    self.inner.options.max_retries,
                );
                match scheduled {
                    Some(delay) => {
                        tracing::warn!(
                            session_id = %self.inner.id,
                            page,
                            delay_ms = delay.as_millis() as u64,
                            error = %failure,
                            "Page load failed, retry scheduled"
                        );
                    }
                    None => {
                        tracing::warn!(
                            session_id = %self.inner.id,
                            page,
                            error = %failure,
                            "Page load failed permanently"
                        );
                        state.loading.remove(&page);
                        state.errors.insert(page, failure);
                    }
                }
            }
        }

        self.publish(&state);
    }
}
