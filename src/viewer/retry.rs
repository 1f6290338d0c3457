//! Per-page retry bookkeeping with exponential backoff

use std::collections::HashMap;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::task::JoinHandle;

/// First retry delay
pub const BASE_DELAY: Duration = Duration::from_millis(1000);

/// Upper bound for any retry delay
pub const MAX_DELAY: Duration = Duration::from_millis(5000);

/// `min(1000ms * 2^attempts, 5000ms)`
pub fn backoff_delay(attempts: u32) -> Duration {
    let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
    let millis = (BASE_DELAY.as_millis() as u64).saturating_mul(factor);
    Duration::from_millis(millis).min(MAX_DELAY)
}

#[derive(Default)]
pub struct RetryManager {
    attempts: HashMap<u32, u32>,
    pending: HashMap<u32, JoinHandle<()>>,
}

impl RetryManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self, page_number: u32) -> u32 {
        self.attempts.get(&page_number).copied().unwrap_or(0)
    }

    /// True while the attempt count is below `max_retries`
    pub fn should_retry(&self, page_number: u32, max_retries: u32) -> bool {
        self.attempts(page_number) < max_retries
    }

    /// Count one more failed attempt and return the new count
    pub fn record_failure(&mut self, page_number: u32) -> u32 {
        let count = self.attempts.entry(page_number).or_insert(0);
        *count += 1;
        *count
    }

    pub fn record_success(&mut self, page_number: u32) {
        self.attempts.remove(&page_number);
        self.pending.remove(&page_number);
    }

    /// Forget a page's attempts and abort its pending retry, if any
    pub fn reset(&mut self, page_number: u32) {
        self.attempts.remove(&page_number);
        if let Some(handle) = self.pending.remove(&page_number) {
            handle.abort();
        }
    }

    /// Schedule `retry` after the backoff delay for the current attempt count.
    ///
    /// Only schedules while `attempts < max_retries - 1`; the failure is
    /// recorded when a retry is scheduled. Returns the delay, or `None` once
    /// attempts are exhausted.
    pub fn schedule_retry<F>(&mut self, page_number: u32, retry: F, max_retries: u32) -> Option<Duration>
    where
        F: FnOnce() -> BoxFuture<'static, ()> + Send + 'static,
    {
        let attempts = self.attempts(page_number);
        if attempts + 1 >= max_retries {
            tracing::debug!(page = page_number, attempts, "Retries exhausted");
            return None;
        }

        let delay = backoff_delay(attempts);
        self.record_failure(page_number);

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            retry().await;
        });
        if let Some(previous) = self.pending.insert(page_number, handle) {
            previous.abort();
        }

        tracing::debug!(
            page = page_number,
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Scheduled page retry"
        );
        Some(delay)
    }

    /// Whether a scheduled retry for the page has not finished yet
    pub fn is_pending(&self, page_number: u32) -> bool {
        self.pending
            .get(&page_number)
            .map_or(false, |handle| !handle.is_finished())
    }

    /// Retries that have not fired yet
    pub fn pending_count(&self) -> usize {
        self.pending.values().filter(|h| !h.is_finished()).count()
    }

    /// Snapshot of attempt counts for pages with at least one failure
    pub fn counts(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.attempts.iter().map(|(page, count)| (*page, *count))
    }

    /// Abort every pending retry and forget all attempts
    pub fn cancel_all(&mut self) {
        for (_, handle) in self.pending.drain() {
            handle.abort();
        }
        self.attempts.clear();
    }
}

impl Drop for RetryManager {
    fn drop(&mut self) {
        for handle in self.pending.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting(counter: &Arc<AtomicUsize>) -> impl FnOnce() -> BoxFuture<'static, ()> + Send + 'static {
        let counter = counter.clone();
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        }
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(0), Duration::from_millis(1000));
        assert_eq!(backoff_delay(1), Duration::from_millis(2000));
        assert_eq!(backoff_delay(2), Duration::from_millis(4000));
        assert_eq!(backoff_delay(3), Duration::from_millis(5000));
        assert_eq!(backoff_delay(64), Duration::from_millis(5000));
    }

    #[test]
    fn test_attempt_counting() {
        let mut retries = RetryManager::new();
        assert!(retries.should_retry(4, 3));
        assert_eq!(retries.record_failure(4), 1);
        assert_eq!(retries.record_failure(4), 2);
        assert_eq!(retries.record_failure(4), 3);
        assert!(!retries.should_retry(4, 3));
        assert_eq!(retries.attempts(5), 0);

        retries.record_success(4);
        assert_eq!(retries.attempts(4), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_schedule_for_three_retries() {
        let mut retries = RetryManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        let first = retries.schedule_retry(2, counting(&fired), 3);
        assert_eq!(first, Some(Duration::from_millis(1000)));

        let second = retries.schedule_retry(2, counting(&fired), 3);
        assert_eq!(second, Some(Duration::from_millis(2000)));

        let third = retries.schedule_retry(2, counting(&fired), 3);
        assert_eq!(third, None);
        assert_eq!(retries.attempts(2), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_fires_after_delay() {
        let mut retries = RetryManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        retries.schedule_retry(1, counting(&fired), 3);
        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_millis(2)).await;
        tokio::task::yield_now().await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(retries.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_all_aborts_pending() {
        let mut retries = RetryManager::new();
        let fired = Arc::new(AtomicUsize::new(0));

        retries.schedule_retry(1, counting(&fired), 3);
        retries.schedule_retry(2, counting(&fired), 3);
        assert_eq!(retries.pending_count(), 2);

        retries.cancel_all();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(retries.attempts(1), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_only_touches_one_page() {
        let mut retries = RetryManager::new();
        retries.record_failure(3);
        retries.record_failure(3);
        retries.record_failure(8);

        retries.reset(3);

        assert_eq!(retries.attempts(3), 0);
        assert_eq!(retries.attempts(8), 1);
    }
}
