//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::jobs::ProcessingCoordinator;
use crate::viewer::{SessionOptions, SessionRegistry, ViewerContext};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    viewer: ViewerContext,
    sessions: SessionRegistry,
    coordinator: ProcessingCoordinator,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The decoder inside `viewer` should already be initialised.
    pub fn new(config: Config, viewer: ViewerContext, coordinator: ProcessingCoordinator) -> Self {
        let sessions = SessionRegistry::new(
            viewer.clone(),
            SessionOptions::from(&config.viewer),
            config.viewer.max_sessions,
            config.viewer.session_idle_ttl(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                viewer,
                sessions,
                coordinator,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Backends shared by every viewer session
    pub fn viewer(&self) -> &ViewerContext {
        &self.inner.viewer
    }

    /// Get the open viewer sessions
    pub fn sessions(&self) -> &SessionRegistry {
        &self.inner.sessions
    }

    /// Get the processing job coordinator
    pub fn coordinator(&self) -> &ProcessingCoordinator {
        &self.inner.coordinator
    }

    /// Close every session and tear the decoder down
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down application state...");
        let closed = self.inner.sessions.close_all().await;
        self.inner.viewer.decoder.teardown();
        tracing::info!(
            closed_sessions = closed,
            live_resources = self.inner.viewer.registry.live_count(),
            "Viewer state released"
        );
    }
}

#[cfg(test)]
pub(crate) mod test_state {
    use std::sync::Arc;

    use super::*;
    use crate::jobs::PollConfig;
    use crate::testing::{test_context, RecordingJobInvoker, TestContext};

    pub struct TestApp {
        pub state: AppState,
        pub fixture: TestContext,
        pub invoker: Arc<RecordingJobInvoker>,
    }

    pub fn test_app() -> TestApp {
        let fixture = test_context();
        let invoker = Arc::new(RecordingJobInvoker::new());
        let coordinator = ProcessingCoordinator::new(
            invoker.clone(),
            fixture.metadata.clone(),
            PollConfig {
                interval: std::time::Duration::from_millis(10),
                max_polls: 3,
            },
        );
        let state = AppState::new(Config::default(), fixture.ctx.clone(), coordinator);

        TestApp {
            state,
            fixture,
            invoker,
        }
    }
}
