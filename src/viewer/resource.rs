//! Locally-owned resource registry
//!
//! Server-side counterpart of browser object URLs: bytes are registered once,
//! addressed by an [`ObjectUrl`], and freed by an explicit revoke. Only the
//! revoke that removes the bytes succeeds; any later one is a logged no-op.
//! Ids are random, so a stale handle can never alias another resource.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uuid::Uuid;

use super::types::ObjectUrl;

/// Bytes behind a live object URL
#[derive(Debug, Clone)]
pub struct StoredResource {
    pub data: Arc<Vec<u8>>,
    pub content_type: String,
}

#[derive(Default)]
pub struct ResourceRegistry {
    live: Mutex<HashMap<Uuid, StoredResource>>,
    revoked: AtomicUsize,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of `data` and hand back a handle to it
    pub fn create(&self, data: Vec<u8>, content_type: impl Into<String>) -> ObjectUrl {
        let url = ObjectUrl::new();
        self.live.lock().insert(
            url.id(),
            StoredResource {
                data: Arc::new(data),
                content_type: content_type.into(),
            },
        );
        url
    }

    pub fn resolve(&self, url: &ObjectUrl) -> Option<StoredResource> {
        self.resolve_id(url.id())
    }

    pub fn resolve_id(&self, id: Uuid) -> Option<StoredResource> {
        self.live.lock().get(&id).cloned()
    }

    /// Free the bytes behind `url`.
    ///
    /// Returns `true` only for the call that actually released them.
    pub fn revoke(&self, url: &ObjectUrl) -> bool {
        if self.live.lock().remove(&url.id()).is_some() {
            self.revoked.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            tracing::warn!(resource = %url, "Ignoring revoke of unknown or already revoked resource");
            false
        }
    }

    pub fn is_live(&self, url: &ObjectUrl) -> bool {
        self.live.lock().contains_key(&url.id())
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().len()
    }

    /// Successful revokes since startup
    pub fn revoked_count(&self) -> usize {
        self.revoked.load(Ordering::Relaxed)
    }

    /// Total bytes currently held
    pub fn live_bytes(&self) -> u64 {
        self.live
            .lock()
            .values()
            .map(|r| r.data.len() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_resolve_revoke() {
        let registry = ResourceRegistry::new();
        let url = registry.create(b"%PDF-1.4".to_vec(), "application/pdf");

        let stored = registry.resolve(&url).unwrap();
        assert_eq!(stored.data.as_slice(), b"%PDF-1.4");
        assert_eq!(stored.content_type, "application/pdf");
        assert_eq!(registry.live_bytes(), 8);

        assert!(registry.revoke(&url));
        assert!(registry.resolve(&url).is_none());
        assert_eq!(registry.live_count(), 0);
    }

    #[test]
    fn test_revoke_is_effective_once() {
        let registry = ResourceRegistry::new();
        let url = registry.create(vec![1, 2, 3], "application/octet-stream");

        assert!(registry.revoke(&url));
        assert!(!registry.revoke(&url));
        assert!(!registry.revoke(&url));
        assert_eq!(registry.revoked_count(), 1);
    }

    #[test]
    fn test_revoke_unknown_is_noop() {
        let registry = ResourceRegistry::new();
        let keep = registry.create(vec![9], "application/pdf");
        assert!(!registry.revoke(&ObjectUrl::new()));
        assert!(registry.is_live(&keep));
    }

    #[test]
    fn test_revoked_ids_are_not_retained() {
        let registry = ResourceRegistry::new();
        let urls: Vec<ObjectUrl> = (0..500)
            .map(|i| registry.create(vec![i as u8; 16], "application/pdf"))
            .collect();
        for url in &urls {
            assert!(registry.revoke(url));
        }

        assert_eq!(registry.revoked_count(), 500);
        assert!(registry.live.lock().is_empty());
        assert_eq!(registry.live_bytes(), 0);
        // Still refused after the bookkeeping is gone
        assert!(!registry.revoke(&urls[0]));
        assert_eq!(registry.revoked_count(), 500);
    }
}
