//! Lazy page viewer
//!
//! Virtual paging for large archive documents: only the pages around the
//! current one are resident, fetched in parallel, retried with backoff, and
//! evicted by distance once the per-session budget is exceeded.

mod cache;
mod error;
mod fetcher;
mod range;
mod registry;
mod resource;
mod retry;
mod session;
mod strategy;
mod types;

pub use cache::PageCache;
pub use error::{FailureCategory, FetchError, FetchErrorKind, PageFailure, ViewerError};
pub use fetcher::PageFetcher;
pub use range::{compute_range, plan_fetches};
pub use registry::SessionRegistry;
pub use resource::{ResourceRegistry, StoredResource};
pub use retry::{backoff_delay, RetryManager};
pub use session::{
    step_scale, SessionOptions, ViewerContext, ViewerSession, DEFAULT_SCALE, MAX_SCALE, MIN_SCALE,
    SCALE_STEP,
};
pub use strategy::{select_strategy, PlannedPage, RenderPlan, RenderStrategy};
pub use types::{
    ObjectUrl, PageErrorInfo, PageHandle, PageRange, PageStatus, ResourceRef, SessionError,
    SessionErrorKind, ViewerPhase, ViewerSnapshot, RESOURCE_ROUTE_PREFIX,
};
