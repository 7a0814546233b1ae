//! Core trait for job workers.
//!
//! A worker accepts a packed workspace and reports the job's state when
//! asked. The dispatcher drives any worker the same way: submit once, then
//! poll [`JobWorker::result`] until the state is terminal.

use async_trait::async_trait;

use crate::types::{JobRequest, JobStatusResponse, SubmitResponse};

/// Error types for worker operations.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// Could not reach the worker
    #[error("Network error: {0}")]
    Network(String),

    /// Worker answered with a non-success status
    #[error("Runner rejected request: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Response body did not parse
    #[error("Parse error: {0}")]
    Parse(String),

    /// Worker has no record of the job
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    /// Toolchain binary is not on the allow-list
    #[error("Toolchain not allowed: {0}")]
    NotAllowed(String),

    /// Worker could not be set up
    #[error("Worker unavailable: {0}")]
    Unavailable(String),
}

/// Something that runs toolchain jobs.
#[async_trait]
pub trait JobWorker: Send + Sync {
    /// Worker identifier for logs.
    fn id(&self) -> &str;

    /// Submit a job. Returns once the worker has accepted it.
    async fn submit(&self, request: &JobRequest) -> Result<SubmitResponse, WorkerError>;

    /// Current state of a job.
    async fn result(&self, job_id: &str) -> Result<JobStatusResponse, WorkerError>;
}
