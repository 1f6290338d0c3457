//! Page cache store with distance-based eviction
//!
//! Holds at most `max_cached_pages` handles for one viewer session. When the
//! budget is exceeded the page farthest from the focus (current) page is
//! evicted, the lower page number first on ties. Eviction is driven by the
//! budget only, never by leaving the visible range.
//!
//! A local handle is revoked when the last page holding it leaves the cache.
//! Entries are removed before release, so a handle is never revoked twice.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use super::resource::ResourceRegistry;
use super::types::{ObjectUrl, PageHandle, ResourceRef};

pub struct PageCache {
    entries: BTreeMap<u32, PageHandle>,
    max_cached_pages: usize,
    focus: u32,
    registry: Arc<ResourceRegistry>,
}

impl PageCache {
    pub fn new(max_cached_pages: usize, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_cached_pages: max_cached_pages.max(1),
            focus: 1,
            registry,
        }
    }

    pub fn capacity(&self) -> usize {
        self.max_cached_pages
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, page_number: u32) -> Option<&PageHandle> {
        self.entries.get(&page_number)
    }

    pub fn has(&self, page_number: u32) -> bool {
        self.entries.contains_key(&page_number)
    }

    /// Cached page numbers in ascending order
    pub fn pages(&self) -> Vec<u32> {
        self.entries.keys().copied().collect()
    }

    /// Page eviction distances are measured from
    pub fn set_focus(&mut self, page_number: u32) {
        self.focus = page_number;
    }

    /// Insert or replace the handle for a page, then enforce the budget.
    ///
    /// Returns the pages evicted to get back under budget.
    pub fn set(&mut self, page_number: u32, handle: PageHandle) -> Vec<u32> {
        debug_assert_eq!(page_number, handle.page_number);

        if let Some(old) = self.entries.remove(&page_number) {
            if old.resource != handle.resource {
                self.release(&old);
            }
        }
        self.entries.insert(page_number, handle);

        let mut evicted = Vec::new();
        while self.entries.len() > self.max_cached_pages {
            let Some(victim) = self.eviction_candidate() else {
                break;
            };
            if let Some(old) = self.entries.remove(&victim) {
                self.release(&old);
            }
            evicted.push(victim);
        }

        if !evicted.is_empty() {
            tracing::debug!(
                focus = self.focus,
                evicted = ?evicted,
                "Evicted pages over cache budget"
            );
        }
        evicted
    }

    /// Release every resource and empty the cache. Safe to call repeatedly.
    pub fn release_all(&mut self) -> usize {
        let urls: HashSet<ObjectUrl> = std::mem::take(&mut self.entries)
            .into_values()
            .filter_map(|handle| match handle.resource {
                ResourceRef::Local(url) => Some(url),
                ResourceRef::Remote(_) | ResourceRef::Document(_) => None,
            })
            .collect();

        urls.iter().filter(|url| self.registry.revoke(url)).count()
    }

    fn eviction_candidate(&self) -> Option<u32> {
        let focus = self.focus;
        self.entries
            .keys()
            .copied()
            .max_by_key(|&page| (page.abs_diff(focus), Reverse(page)))
    }

    /// Revoke a handle that was just removed, unless another page still holds it
    fn release(&self, handle: &PageHandle) -> bool {
        match &handle.resource {
            ResourceRef::Local(url) => {
                let shared = self.entries.values().any(|h| h.resource == handle.resource);
                !shared && self.registry.revoke(url)
            }
            // Remote URLs own nothing; the whole-document handle belongs to the fetcher
            ResourceRef::Remote(_) | ResourceRef::Document(_) => false,
        }
    }
}

impl Drop for PageCache {
    fn drop(&mut self) {
        self.release_all();
    }
}
