//! Document API endpoints
//!
//! Document intake, a view of each document's processing state, and the job
//! triggers the admin tooling uses:
//! - `POST /` multipart upload (`file` field), stored and queued for splitting
//! - `GET /:id` info, render strategy and render plan
//! - `GET /:id/status?wait=true` blocks until processing settles
//! - `POST /:id/jobs/:kind` invokes split, optimize or linearize
//! - `POST /:id/retry-processing` clears partial pages and re-splits

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decoder::DecodeError;
use crate::document::{ContentKind, DocumentInfo, ProcessingStatus};
use crate::error::{AppError, Result};
use crate::jobs::JobKind;
use crate::state::AppState;
use crate::storage::{keys, UploadOptions};
use crate::viewer::{select_strategy, RenderPlan, RenderStrategy};

/// Largest accepted upload
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentResponse {
    pub document: DocumentInfo,
    pub strategy: RenderStrategy,
    pub plan: RenderPlan,
    pub split_page_count: usize,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusResponse {
    pub document_id: String,
    pub status: ProcessingStatus,
    pub terminal: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    /// Poll until the status is terminal
    #[serde(default)]
    pub wait: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub document_id: String,
    pub requested: JobKind,
    /// Differs from `requested` when linearization fell back to optimization
    pub invoked: JobKind,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResponse {
    pub document_id: String,
    pub cleared_pages: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub document: DocumentInfo,
    /// `None` when the split job could not be started; retry later
    pub split_job: Option<JobKind>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(upload_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/:id", get(get_document))
        .route("/:id/status", get(get_status))
        .route("/:id/jobs/:kind", post(trigger_job))
        .route("/:id/retry-processing", post(retry_processing))
}

/// POST /api/v1/documents
///
/// Validate the uploaded PDF, store it under `uploads/`, register it and
/// start splitting it into pages.
async fn upload_document(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("document.pdf").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(format!("Failed to read file data: {}", e)))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let Some((file_name, data)) = upload else {
        return Err(AppError::BadRequest("Missing 'file' field".to_string()));
    };
    if data.is_empty() {
        return Err(AppError::BadRequest("Uploaded file is empty".to_string()));
    }

    let viewer = state.viewer();
    let data = Arc::new(data);
    let scratch = Uuid::new_v4();
    let inspected = viewer.decoder.inspect(scratch, data.clone()).await;
    viewer.decoder.forget(&scratch);
    let info = inspected.map_err(|e| match e {
        DecodeError::NotInitialized | DecodeError::Timeout(_) | DecodeError::Task(_) => {
            AppError::Internal(e.to_string())
        }
        _ => AppError::BadRequest(format!("'{}' is not a readable PDF: {}", file_name, e)),
    })?;
    if info.kind != ContentKind::PdfPage {
        return Err(AppError::BadRequest(format!("'{}' is not a PDF", file_name)));
    }

    let data = Arc::try_unwrap(data).unwrap_or_else(|shared| shared.as_ref().clone());
    let size = data.len() as u64;
    let storage_key = keys::upload_key(Utc::now().timestamp_millis(), &file_name);
    viewer
        .blobs
        .upload(&storage_key, data, UploadOptions::new("application/pdf"))
        .await?;

    let document_id = Uuid::new_v4().to_string();
    let mut document = DocumentInfo::new(&document_id, &storage_key);
    document.total_pages = info.num_pages;
    document.original_size = Some(size);
    viewer.metadata.register_document(&document).await?;

    tracing::info!(
        document_id = %document_id,
        storage_key = %storage_key,
        size,
        pages = ?info.num_pages,
        "Document uploaded"
    );

    let split_job = match state
        .coordinator()
        .trigger(&document_id, JobKind::SplitIntoPages)
        .await
    {
        Ok(job) => Some(job),
        Err(e) => {
            tracing::warn!(document_id = %document_id, error = %e, "Split job not started");
            viewer
                .metadata
                .set_processing_status(&document_id, ProcessingStatus::Failed)
                .await?;
            document.processing_status = ProcessingStatus::Failed;
            None
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            document,
            split_job,
        }),
    ))
}

async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>> {
    let viewer = state.viewer();
    let document = viewer
        .metadata
        .get_document(&id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Document '{}' not found", id)))?;
    let split_pages = viewer.metadata.list_split_pages(&id).await?;

    let strategy = select_strategy(&document, &split_pages);
    let plan = RenderPlan::build(
        strategy,
        &document,
        &split_pages,
        viewer.blobs.as_ref(),
        state.config().viewer.preload_distance,
    );

    Ok(Json(DocumentResponse {
        document,
        strategy,
        plan,
        split_page_count: split_pages.len(),
    }))
}

async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<StatusResponse>> {
    let status = if query.wait {
        state.coordinator().watch(&id).wait().await?
    } else {
        state.coordinator().current_status(&id).await?
    };

    Ok(Json(StatusResponse {
        document_id: id,
        status,
        terminal: status.is_terminal(),
    }))
}

async fn trigger_job(
    State(state): State<AppState>,
    Path((id, kind)): Path<(String, String)>,
) -> Result<(StatusCode, Json<JobResponse>)> {
    let requested: JobKind = kind.parse()?;
    let invoked = state.coordinator().trigger(&id, requested).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobResponse {
            document_id: id,
            requested,
            invoked,
        }),
    ))
}

async fn retry_processing(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<RetryResponse>)> {
    let cleared_pages = state.coordinator().retry_processing(&id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(RetryResponse {
            document_id: id,
            cleared_pages,
        }),
    ))
}
