//! Document metadata
//!
//! Types and the query interface for the backend's document and split-page
//! records. The SQLite-backed implementation lives in `crate::db`.

mod error;
mod traits;
mod types;

pub use error::MetadataError;
pub use traits::MetadataStore;
pub use types::{ContentKind, DocumentInfo, ProcessingStatus, SplitPage};
