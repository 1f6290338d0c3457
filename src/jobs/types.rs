//! Backend job types

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::MetadataError;
use crate::storage::keys;

/// Server-side processing jobs, addressed by their function name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobKind {
    /// One PDF into N single-page files recorded in `pdf_pages`
    #[serde(rename = "split-pdf")]
    SplitIntoPages,
    /// Recompress the whole file
    #[serde(rename = "optimize-pdf")]
    Optimize,
    /// Reorder for fast first-page display
    #[serde(rename = "linearize-pdf")]
    Linearize,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SplitIntoPages => "split-pdf",
            Self::Optimize => "optimize-pdf",
            Self::Linearize => "linearize-pdf",
        }
    }

    /// Object key the job writes its whole-file output to.
    ///
    /// Splitting writes one object per page and reports them in `pdf_pages`.
    pub fn output_key(&self, original: &str) -> Option<String> {
        match self {
            Self::SplitIntoPages => None,
            Self::Optimize => Some(keys::optimized_key(original)),
            Self::Linearize => Some(keys::linearized_key(original)),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "split-pdf" | "split" => Ok(Self::SplitIntoPages),
            "optimize-pdf" | "optimize" => Ok(Self::Optimize),
            "linearize-pdf" | "linearize" => Ok(Self::Linearize),
            other => Err(JobError::UnknownJob(other.to_string())),
        }
    }
}

/// Body sent to every job function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobPayload {
    pub document_id: String,
    pub file_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
}

impl JobPayload {
    pub fn new(job: JobKind, document_id: impl Into<String>, file_path: impl Into<String>) -> Self {
        let file_path = file_path.into();
        Self {
            document_id: document_id.into(),
            output_path: job.output_key(&file_path),
            file_path,
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// The tool behind the job is not installed in the execution environment
    #[error("Job tool unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to invoke {job}: {message}")]
    InvokeFailed { job: JobKind, message: String },

    #[error("{job} rejected with status {status}: {message}")]
    Rejected {
        job: JobKind,
        status: u16,
        message: String,
    },

    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    #[error("Gave up on {document_id} after {polls} status polls")]
    PollLimit { document_id: String, polls: u32 },

    #[error("Status watch cancelled")]
    Cancelled,
}
