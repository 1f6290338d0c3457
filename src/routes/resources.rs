//! Locally-owned page bytes, addressed by object URL

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/:id", get(get_resource))
}

async fn get_resource(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response> {
    let uuid = Uuid::parse_str(&id).map_err(|_| AppError::NotFound(format!("Resource '{}' not found", id)))?;

    // Revoked and unknown ids look the same to the client
    let resource = state
        .viewer()
        .registry
        .resolve_id(uuid)
        .ok_or_else(|| AppError::NotFound(format!("Resource '{}' not found", id)))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, resource.content_type)
        .header(header::CONTENT_LENGTH, resource.data.len())
        .header(header::CACHE_CONTROL, "private, no-store")
        .body(Body::from(resource.data.as_ref().clone()))
        .map_err(|e| AppError::Internal(e.to_string()))
}
