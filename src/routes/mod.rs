//! Route modules for the archive viewer server

pub mod documents;
pub mod health;
pub mod resources;
pub mod viewer;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .nest("/api/v1/documents", documents::router())
        .nest("/api/v1/viewer", viewer::router())
        .nest("/api/v1/resources", resources::router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
