//! Open viewer sessions
//!
//! Each session gets its own page cache and resource budget; the registry
//! bounds how many exist at once and closes the ones a client walked away
//! from.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use super::error::ViewerError;
use super::session::{SessionOptions, ViewerContext, ViewerSession};

#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<SessionRegistryInner>,
}

struct SessionRegistryInner {
    ctx: ViewerContext,
    options: SessionOptions,
    sessions: RwLock<HashMap<Uuid, ViewerSession>>,
    /// Maximum open sessions (0 = unlimited)
    max_sessions: usize,
    /// Idle time after which a session is swept (zero = never)
    idle_ttl: Duration,
}

impl SessionRegistry {
    pub fn new(
        ctx: ViewerContext,
        options: SessionOptions,
        max_sessions: usize,
        idle_ttl: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SessionRegistryInner {
                ctx,
                options,
                sessions: RwLock::new(HashMap::new()),
                max_sessions,
                idle_ttl,
            }),
        }
    }

    /// Create an idle session
    pub async fn create(&self) -> Result<ViewerSession, ViewerError> {
        let mut sessions = self.inner.sessions.write().await;
        if self.inner.max_sessions > 0 && sessions.len() >= self.inner.max_sessions {
            return Err(ViewerError::TooManySessions(self.inner.max_sessions));
        }

        let session = ViewerSession::new(self.inner.ctx.clone(), self.inner.options.clone());
        sessions.insert(session.id(), session.clone());

        tracing::info!(
            session_id = %session.id(),
            open_sessions = sessions.len(),
            "Created viewer session"
        );
        Ok(session)
    }

    /// Look a session up, counting the lookup as client activity
    pub async fn get(&self, id: Uuid) -> Result<ViewerSession, ViewerError> {
        let session = self
            .inner
            .sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| ViewerError::SessionNotFound(id.to_string()))?;
        session.touch();
        Ok(session)
    }

    /// Get a session by string ID
    pub async fn get_by_str(&self, id: &str) -> Result<ViewerSession, ViewerError> {
        let uuid = Uuid::parse_str(id).map_err(|_| ViewerError::SessionNotFound(id.to_string()))?;
        self.get(uuid).await
    }

    /// Close and forget a session
    pub async fn remove(&self, id: Uuid) -> Result<(), ViewerError> {
        let session = self
            .inner
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| ViewerError::SessionNotFound(id.to_string()))?;

        session.close();
        tracing::info!(session_id = %id, "Removed viewer session");
        Ok(())
    }

    /// Close every session, e.g. on shutdown
    pub async fn close_all(&self) -> usize {
        let sessions: Vec<ViewerSession> = self
            .inner
            .sessions
            .write()
            .await
            .drain()
            .map(|(_, session)| session)
            .collect();

        for session in &sessions {
            session.close();
        }
        sessions.len()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Close sessions idle for longer than the TTL.
    ///
    /// Returns the number of sessions closed
    pub async fn cleanup_expired(&self) -> usize {
        if self.inner.idle_ttl.is_zero() {
            return 0;
        }

        let expired: Vec<ViewerSession> = {
            let mut sessions = self.inner.sessions.write().await;
            let ids: Vec<Uuid> = sessions
                .iter()
                .filter(|(_, session)| session.idle_for() >= self.inner.idle_ttl)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| sessions.remove(id)).collect()
        };

        for session in &expired {
            session.close();
            tracing::debug!(
                session_id = %session.id(),
                idle_secs = session.idle_for().as_secs(),
                "Closed idle viewer session"
            );
        }

        let count = expired.len();
        if count > 0 {
            tracing::info!(count, "Cleaned up idle viewer sessions");
        }
        count
    }

    /// Start the background idle sweep
    pub fn start_cleanup_task(self, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);

            loop {
                interval.tick().await;
                self.cleanup_expired().await;
            }
        })
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use crate::viewer::ViewerPhase;

    #[tokio::test]
    async fn test_bounded_session_count() {
        let registry = SessionRegistry::new(test_context().ctx, SessionOptions::default(), 2, Duration::ZERO);

        let first = registry.create().await.unwrap();
        registry.create().await.unwrap();
        assert!(matches!(
            registry.create().await,
            Err(ViewerError::TooManySessions(2))
        ));

        registry.remove(first.id()).await.unwrap();
        assert!(registry.create().await.is_ok());
    }

    #[tokio::test]
    async fn test_lookup_and_remove() {
        let registry = SessionRegistry::new(test_context().ctx, SessionOptions::default(), 0, Duration::ZERO);
        let session = registry.create().await.unwrap();

        let found = registry.get_by_str(&session.id().to_string()).await.unwrap();
        assert_eq!(found.id(), session.id());
        assert!(matches!(
            registry.get_by_str("not-a-uuid").await,
            Err(ViewerError::SessionNotFound(_))
        ));

        registry.remove(session.id()).await.unwrap();
        assert!(registry.get(session.id()).await.is_err());
        assert!(registry.remove(session.id()).await.is_err());
    }

    #[tokio::test]
    async fn test_sessions_have_separate_caches() {
        let fixture = test_context();
        fixture.seed_split_document("doc-a", 3);
        fixture.seed_split_document("doc-b", 3);
        let registry = SessionRegistry::new(fixture.ctx.clone(), SessionOptions::default(), 0, Duration::ZERO);

        let a = registry.create().await.unwrap();
        let b = registry.create().await.unwrap();
        a.open("doc-a").await.unwrap();
        b.open("doc-b").await.unwrap();
        assert_eq!(fixture.registry.live_count(), 6);

        a.close();
        assert_eq!(b.snapshot().cached_pages, vec![1, 2, 3]);
        assert_eq!(fixture.registry.live_count(), 3);

        assert_eq!(registry.close_all().await, 2);
        assert_eq!(b.snapshot().phase, ViewerPhase::Idle);
        assert_eq!(fixture.registry.live_count(), 0);
        assert!(registry.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_sessions_expire() {
        let fixture = test_context();
        fixture.seed_split_document("doc-a", 3);
        let ttl = Duration::from_secs(600);
        let registry = SessionRegistry::new(fixture.ctx.clone(), SessionOptions::default(), 2, ttl);

        // Two viewers that go away without closing
        let gone = registry.create().await.unwrap();
        gone.open("doc-a").await.unwrap();
        registry.create().await.unwrap();
        assert!(matches!(
            registry.create().await,
            Err(ViewerError::TooManySessions(2))
        ));

        tokio::time::advance(ttl + Duration::from_secs(1)).await;
        assert_eq!(registry.cleanup_expired().await, 2);

        assert_eq!(gone.snapshot().phase, ViewerPhase::Idle);
        assert_eq!(fixture.registry.live_count(), 0);
        assert!(registry.create().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_keep_sessions_alive() {
        let ttl = Duration::from_secs(600);
        let registry = SessionRegistry::new(test_context().ctx, SessionOptions::default(), 0, ttl);
        let active = registry.create().await.unwrap();
        let idle = registry.create().await.unwrap();

        tokio::time::advance(Duration::from_secs(400)).await;
        registry.get(active.id()).await.unwrap();
        tokio::time::advance(Duration::from_secs(400)).await;

        assert_eq!(registry.cleanup_expired().await, 1);
        assert!(registry.get(active.id()).await.is_ok());
        assert!(registry.get(idle.id()).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_sweeps_in_background() {
        let registry = SessionRegistry::new(
            test_context().ctx,
            SessionOptions::default(),
            0,
            Duration::from_secs(60),
        );
        registry.create().await.unwrap();

        let sweeper = registry.clone().start_cleanup_task(Duration::from_secs(30));
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert!(registry.is_empty().await);
        sweeper.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_never_expires() {
        let registry = SessionRegistry::new(test_context().ctx, SessionOptions::default(), 0, Duration::ZERO);
        registry.create().await.unwrap();

        tokio::time::advance(Duration::from_secs(86_400)).await;
        assert_eq!(registry.cleanup_expired().await, 0);
        assert_eq!(registry.len().await, 1);
    }
}
