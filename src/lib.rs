//! Archive Viewer
//!
//! Lazy page viewer for large scanned archive documents. Pages are fetched
//! from pre-split per-page files around the current page, kept in a bounded
//! per-session cache and retried with exponential backoff; documents whose
//! backend processing has not finished fall back to streaming the whole file.
//!
//! # Modules
//!
//! - `viewer`: sessions, page cache, fetcher, retry and render strategy
//! - `decoder`: page-count inspection and rasterisation
//! - `jobs`: backend split/optimize/linearize invocation and status polling
//! - `document`: metadata types and the metadata store interface
//! - `db`: SQLite-backed metadata store
//! - `storage`: S3-compatible blob storage

pub mod config;
pub mod db;
pub mod decoder;
pub mod document;
pub mod error;
pub mod jobs;
pub mod routes;
pub mod state;
pub mod storage;
pub mod viewer;

#[cfg(test)]
mod testing;
