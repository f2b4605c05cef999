//! The ingestion orchestrator: one handler execution takes an identifier
//! through fetch, excerpt, extraction, embedding, and the dual-store commit.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument, warn};

use paperdex_core::{DocumentSource, PaperRepository, ProcessingState, Result};
use paperdex_inference::StructuredExtractor;

use crate::excerpt::excerpt_pdf;
use crate::handler::{JobContext, JobHandler, JobResult};
use crate::writer::DualStoreWriter;

/// Handler for ingestion jobs.
pub struct IngestHandler {
    papers: Arc<dyn PaperRepository>,
    source: Arc<dyn DocumentSource>,
    extractor: StructuredExtractor,
    writer: DualStoreWriter,
}

impl IngestHandler {
    pub fn new(
        papers: Arc<dyn PaperRepository>,
        source: Arc<dyn DocumentSource>,
        extractor: StructuredExtractor,
        writer: DualStoreWriter,
    ) -> Self {
        Self {
            papers,
            source,
            extractor,
            writer,
        }
    }

    /// Run the pipeline stages. Errors propagate to `execute`, which owns the
    /// terminal state bookkeeping.
    async fn run_pipeline(&self, paper_id: &str) -> Result<()> {
        let document = self.source.fetch(paper_id).await?;
        let excerpt = excerpt_pdf(&document.bytes).await?;
        let meta = self.extractor.extract(&excerpt).await?;
        let embedding = self.extractor.embed_metadata(&meta).await?;
        self.writer
            .commit(paper_id, &document.authors, &meta, &embedding)
            .await
    }
}

#[async_trait]
impl JobHandler for IngestHandler {
    #[instrument(skip(self, ctx), fields(subsystem = "jobs", component = "ingest", op = "execute", paper_id = %ctx.paper_id(), job_id = %ctx.job.id))]
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let paper_id = ctx.paper_id().to_string();

        if let Err(e) = self.papers.mark_processing(&paper_id).await {
            return JobResult::Failed(format!("failed to mark processing: {}", e));
        }

        match self.run_pipeline(&paper_id).await {
            Ok(()) => {
                info!(paper_id = %paper_id, "Ingestion complete");
                JobResult::Success
            }
            Err(e) => {
                warn!(
                    paper_id = %paper_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Ingestion failed"
                );
                // The paper must land in a terminal state on every path. The
                // guard inside set_state protects a concurrently completed row.
                if let Err(state_err) = self
                    .papers
                    .set_state(&paper_id, ProcessingState::Failed)
                    .await
                {
                    warn!(paper_id = %paper_id, error = %state_err, "Failed to record failure state");
                }
                JobResult::Failed(e.to_string())
            }
        }
    }
}
