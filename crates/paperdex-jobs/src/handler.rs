//! Job handler seam between the worker loop and the ingestion pipeline.

use async_trait::async_trait;

use paperdex_core::IngestionJob;

/// Context provided to a job handler.
pub struct JobContext {
    /// The claimed job being processed.
    pub job: IngestionJob,
}

impl JobContext {
    pub fn new(job: IngestionJob) -> Self {
        Self { job }
    }

    /// The external paper identifier this job processes.
    pub fn paper_id(&self) -> &str {
        &self.job.paper_id
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed; both stores are durably written.
    Success,
    /// Job failed with an error message.
    Failed(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job. Must leave the paper row in a terminal state on
    /// every path, including its own failures.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// No-op handler for testing the worker loop.
pub struct NoOpHandler;

#[async_trait]
impl JobHandler for NoOpHandler {
    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Success
    }
}
