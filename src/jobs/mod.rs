//! Backend processing jobs
//!
//! Split, optimize and linearize run server-side; this module only invokes
//! them and observes the resulting processing status.

mod coordinator;
mod invoker;
mod types;

pub use coordinator::{PollConfig, ProcessingCoordinator, StatusWatch};
pub use invoker::{HttpJobInvoker, JobInvoker};
pub use types::{JobError, JobKind, JobPayload};
