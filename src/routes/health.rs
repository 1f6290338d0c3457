//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub decoder: &'static str,
    pub decoder_ready: bool,
    pub open_sessions: usize,
    pub live_resources: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/health", get(health_check))
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let viewer = state.viewer();

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        decoder: viewer.decoder.decoder_name(),
        decoder_ready: viewer.decoder.is_ready(),
        open_sessions: state.sessions().len().await,
        live_resources: viewer.registry.live_count(),
    })
}

#[cfg(test)]
mod tests {
    use axum_test::TestServer;

    use crate::routes;
    use crate::state::test_state::test_app;

    #[tokio::test]
    async fn test_health_reports_viewer_state() {
        let test = test_app();
        let server = TestServer::new(routes::app(test.state.clone())).unwrap();

        let response = server.get("/health").await;
        response.assert_status_ok();

        let json = response.json::<serde_json::Value>();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["decoderReady"], true);
        assert_eq!(json["openSessions"], 0);

        server.get("/api/v1/health").await.assert_status_ok();
    }
}
