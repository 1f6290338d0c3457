//! Storage types

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Metadata about a storage object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectMetadata {
    pub key: String,
    pub size: i64,
    pub last_modified: Option<DateTime<Utc>>,
    pub content_type: Option<String>,
    pub etag: Option<String>,
}

/// A storage object with its data
#[derive(Debug)]
pub struct StorageObject {
    pub metadata: ObjectMetadata,
    pub data: Vec<u8>,
}

/// Options for writing an object
#[derive(Debug, Clone)]
pub struct UploadOptions {
    pub content_type: String,
    /// Overwrite an existing object instead of failing
    pub upsert: bool,
}

impl UploadOptions {
    pub fn new(content_type: impl Into<String>) -> Self {
        Self {
            content_type: content_type.into(),
            upsert: false,
        }
    }
}

/// Blob storage interface used by the page fetcher
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Download an object's bytes
    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;

    /// Directly usable URL for an object
    fn public_url(&self, path: &str) -> String;

    /// Write an object
    async fn upload(
        &self,
        path: &str,
        data: Vec<u8>,
        options: UploadOptions,
    ) -> Result<(), StorageError>;
}

/// Join a public base URL and an object key, encoding each key segment
pub fn join_public_url(base: &str, key: &str) -> String {
    let encoded: Vec<String> = key
        .split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect();
    format!("{}/{}", base.trim_end_matches('/'), encoded.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_options_never_overwrite_by_default() {
        let options = UploadOptions::new("image/png");
        assert_eq!(options.content_type, "image/png");
        assert!(!options.upsert);
    }

    #[test]
    fn test_join_public_url_encodes_segments() {
        assert_eq!(
            join_public_url("http://localhost:9000/archive/", "split_pages/d 1/page_1.pdf"),
            "http://localhost:9000/archive/split_pages/d%201/page_1.pdf"
        );
    }
}
