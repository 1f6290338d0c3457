//! Visible-range calculation

use super::types::PageRange;

/// Pages within `preload_distance` of `current_page`, clamped to the document.
///
/// `current_page` is clamped into `1..=total_pages` first; a document with no
/// pages yields the single-page range `1..=1`.
pub fn compute_range(current_page: u32, preload_distance: u32, total_pages: u32) -> PageRange {
    let total = total_pages.max(1);
    let current = current_page.clamp(1, total);
    PageRange {
        start: current.saturating_sub(preload_distance).max(1),
        end: current.saturating_add(preload_distance).min(total),
    }
}

/// Pages in `range` that still need a fetch, nearest to `focus` first.
///
/// `skip` reports pages that are already cached, loading or failed.
pub fn plan_fetches<F>(range: PageRange, focus: u32, skip: F) -> Vec<u32>
where
    F: Fn(u32) -> bool,
{
    let mut pages: Vec<u32> = range.pages().filter(|&page| !skip(page)).collect();
    pages.sort_by_key(|&page| (page.abs_diff(focus), page));
    pages
}
