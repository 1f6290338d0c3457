//! Backend processing coordinator
//!
//! Triggers server-side jobs and observes their progress by polling the
//! document's processing status. The poll interval and limit are explicit
//! constructor parameters, and every watch can be cancelled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::JobsConfig;
use crate::document::{DocumentInfo, MetadataStore, ProcessingStatus};

use super::invoker::JobInvoker;
use super::types::{JobError, JobKind, JobPayload};

#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub interval: Duration,
    pub max_polls: u32,
}

impl From<&JobsConfig> for PollConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            max_polls: config.max_polls,
        }
    }
}

/// Handle to a background status poll.
///
/// The poll stops at the first terminal status, at the poll limit, on
/// `cancel`, or when the handle is dropped.
pub struct StatusWatch {
    updates: watch::Receiver<Option<ProcessingStatus>>,
    task: Option<JoinHandle<Result<ProcessingStatus, JobError>>>,
}

impl StatusWatch {
    /// Most recently observed status
    pub fn status(&self) -> Option<ProcessingStatus> {
        *self.updates.borrow()
    }

    /// Receiver notified on every observed status
    pub fn subscribe(&self) -> watch::Receiver<Option<ProcessingStatus>> {
        self.updates.clone()
    }

    /// Wait for a terminal status.
    ///
    /// The handle stays owned by `self` while awaited, so dropping this
    /// future (a disconnected long-poll client) aborts the poll.
    pub async fn wait(mut self) -> Result<ProcessingStatus, JobError> {
        let Some(task) = self.task.as_mut() else {
            return Err(JobError::Cancelled);
        };
        let result = match task.await {
            Ok(result) => result,
            Err(_) => Err(JobError::Cancelled),
        };
        self.task = None;
        result
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().map_or(false, |task| !task.is_finished())
    }
}

impl Drop for StatusWatch {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub struct ProcessingCoordinator {
    invoker: Arc<dyn JobInvoker>,
    metadata: Arc<dyn MetadataStore>,
    poll: PollConfig,
}

impl ProcessingCoordinator {
    pub fn new(invoker: Arc<dyn JobInvoker>, metadata: Arc<dyn MetadataStore>, poll: PollConfig) -> Self {
        Self {
            invoker,
            metadata,
            poll,
        }
    }

    async fn document(&self, document_id: &str) -> Result<DocumentInfo, JobError> {
        self.metadata
            .get_document(document_id)
            .await?
            .ok_or_else(|| JobError::DocumentNotFound(document_id.to_string()))
    }

    /// Start a job for a document. Returns the job that was actually invoked.
    ///
    /// Linearization falls back to optimization when the linearizer is not
    /// available on the backend.
    pub async fn trigger(&self, document_id: &str, job: JobKind) -> Result<JobKind, JobError> {
        let info = self.document(document_id).await?;
        let payload = JobPayload::new(job, &info.id, &info.file_path);

        match self.invoker.invoke(job, &payload).await {
            Ok(()) => Ok(job),
            Err(JobError::Unavailable(reason)) if job == JobKind::Linearize => {
                tracing::warn!(
                    document_id,
                    reason = %reason,
                    "Linearizer unavailable, falling back to optimize"
                );
                let fallback = JobPayload::new(JobKind::Optimize, &info.id, &info.file_path);
                self.invoker.invoke(JobKind::Optimize, &fallback).await?;
                Ok(JobKind::Optimize)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn current_status(&self, document_id: &str) -> Result<ProcessingStatus, JobError> {
        Ok(self.document(document_id).await?.processing_status)
    }

    /// Re-run splitting from scratch after a failed job.
    ///
    /// Returns how many partial split-page records were cleared.
    pub async fn retry_processing(&self, document_id: &str) -> Result<u64, JobError> {
        let cleared = self.metadata.clear_split_pages(document_id).await?;
        self.metadata
            .set_processing_status(document_id, ProcessingStatus::Pending)
            .await?;
        self.trigger(document_id, JobKind::SplitIntoPages).await?;

        tracing::info!(document_id, cleared, "Restarted document processing");
        Ok(cleared)
    }

    /// Poll the document's status in the background until it settles
    pub fn watch(&self, document_id: &str) -> StatusWatch {
        let (tx, rx) = watch::channel(None);
        let metadata = self.metadata.clone();
        let poll = self.poll;
        let document_id = document_id.to_string();

        let task = tokio::spawn(async move { poll_status(metadata, poll, document_id, tx).await });

        StatusWatch {
            updates: rx,
            task: Some(task),
        }
    }
}

async fn poll_status(
    metadata: Arc<dyn MetadataStore>,
    poll: PollConfig,
    document_id: String,
    updates: watch::Sender<Option<ProcessingStatus>>,
) -> Result<ProcessingStatus, JobError> {
    for attempt in 1..=poll.max_polls {
        match metadata.get_document(&document_id).await {
            Ok(Some(info)) => {
                let status = info.processing_status;
                updates.send_replace(Some(status));
                if status.is_terminal() {
                    tracing::debug!(document_id = %document_id, status = %status, polls = attempt, "Processing settled");
                    return Ok(status);
                }
            }
            Ok(None) => return Err(JobError::DocumentNotFound(document_id)),
            // Transient; the next poll may succeed
            Err(e) => {
                tracing::warn!(document_id = %document_id, error = %e, "Status poll failed");
            }
        }

        if attempt < poll.max_polls {
            tokio::time::sleep(poll.interval).await;
        }
    }

    Err(JobError::PollLimit {
        document_id,
        polls: poll.max_polls,
    })
}
