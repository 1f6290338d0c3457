//! Viewer session endpoints
//!
//! A session is one open document with its own page cache. Every command
//! answers with the session snapshot after the command settled.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::viewer::{PageStatus, ViewerError, ViewerSession, ViewerSnapshot};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenRequest {
    pub document_id: String,
}

#[derive(Debug, Deserialize)]
pub struct GoToRequest {
    pub page: u32,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub snapshot: ViewerSnapshot,
}

impl SessionResponse {
    fn new(session: &ViewerSession, snapshot: ViewerSnapshot) -> Json<Self> {
        Json(Self {
            session_id: session.id().to_string(),
            snapshot,
        })
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(open_session))
        .route("/:sid", get(get_session).delete(close_session))
        .route("/:sid/goto", post(go_to_page))
        .route("/:sid/next", post(next_page))
        .route("/:sid/prev", post(prev_page))
        .route("/:sid/zoom-in", post(zoom_in))
        .route("/:sid/zoom-out", post(zoom_out))
        .route("/:sid/reload", post(reload))
        .route("/:sid/pages/:page", get(get_page))
        .route("/:sid/pages/:page/render", get(render_page))
        .route("/:sid/pages/:page/retry", post(retry_page))
}

async fn session(state: &AppState, sid: &str) -> Result<ViewerSession> {
    Ok(state.sessions().get_by_str(sid).await?)
}

async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> Result<(StatusCode, Json<SessionResponse>)> {
    if request.document_id.trim().is_empty() {
        return Err(AppError::BadRequest("documentId must not be empty".to_string()));
    }

    let session = state.sessions().create().await?;
    match session.open(&request.document_id).await {
        Ok(snapshot) => Ok((StatusCode::CREATED, SessionResponse::new(&session, snapshot))),
        Err(e) => {
            state.sessions().remove(session.id()).await?;
            Err(e.into())
        }
    }
}

async fn get_session(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.snapshot();
    Ok(SessionResponse::new(&session, snapshot))
}

async fn close_session(State(state): State<AppState>, Path(sid): Path<String>) -> Result<StatusCode> {
    let session = session(&state, &sid).await?;
    state.sessions().remove(session.id()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn go_to_page(
    State(state): State<AppState>,
    Path(sid): Path<String>,
    Json(request): Json<GoToRequest>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.go_to_page(request.page).await?;
    Ok(SessionResponse::new(&session, snapshot))
}

async fn next_page(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.next_page().await?;
    Ok(SessionResponse::new(&session, snapshot))
}

async fn prev_page(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.prev_page().await?;
    Ok(SessionResponse::new(&session, snapshot))
}

async fn zoom_in(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.zoom_in();
    Ok(SessionResponse::new(&session, snapshot))
}

async fn zoom_out(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.zoom_out();
    Ok(SessionResponse::new(&session, snapshot))
}

async fn reload(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.reload().await?;
    Ok(SessionResponse::new(&session, snapshot))
}

async fn get_page(
    State(state): State<AppState>,
    Path((sid, page)): Path<(String, u32)>,
) -> Result<Json<PageStatus>> {
    let session = session(&state, &sid).await?;
    Ok(Json(session.page(page)?))
}

/// Rasterised page as PNG.
///
/// Pages the client can load straight from storage redirect there instead.
async fn render_page(
    State(state): State<AppState>,
    Path((sid, page)): Path<(String, u32)>,
) -> Result<Response> {
    let session = session(&state, &sid).await?;

    let surface = match session.render_page(page).await {
        Ok(surface) => surface,
        Err(ViewerError::RemoteResource(url)) => {
            return Ok(Redirect::temporary(&url).into_response());
        }
        Err(e) => return Err(e.into()),
    };

    tracing::debug!(
        session_id = %session.id(),
        page,
        width = surface.width,
        height = surface.height,
        "Rendered page"
    );

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "image/png")
        .header(header::CACHE_CONTROL, "no-store")
        .body(Body::from(surface.data))
        .map_err(|e| AppError::Internal(e.to_string()))
}

async fn retry_page(
    State(state): State<AppState>,
    Path((sid, page)): Path<(String, u32)>,
) -> Result<Json<SessionResponse>> {
    let session = session(&state, &sid).await?;
    let snapshot = session.retry_page(page).await?;
    Ok(SessionResponse::new(&session, snapshot))
}
