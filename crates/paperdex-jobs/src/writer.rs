//! Dual-store commit: relational row first, vector second, state flip last.

use std::sync::Arc;

use tracing::{debug, instrument};

use paperdex_core::{
    ExtractedMetadata, PaperRepository, ProcessingState, Result, Vector, VectorIndex,
};

/// Writes one ingested paper to both stores.
///
/// Write order is the consistency mechanism: the relational fields land while
/// the row is still `processing`, then the vector upsert, and only then the
/// flip to `completed`. A crash between the steps leaves a `processing` row
/// with no `completed` marker, which the reaper later flips to `failed`; the
/// read path never serves it as done. Both writes are idempotent upserts, so
/// a resubmission repairs any partial state.
#[derive(Clone)]
pub struct DualStoreWriter {
    papers: Arc<dyn PaperRepository>,
    vectors: Arc<dyn VectorIndex>,
}

impl DualStoreWriter {
    pub fn new(papers: Arc<dyn PaperRepository>, vectors: Arc<dyn VectorIndex>) -> Self {
        Self { papers, vectors }
    }

    /// Commit an extracted paper to both stores and mark it completed.
    #[instrument(skip(self, authors, meta, embedding), fields(subsystem = "jobs", component = "writer", op = "commit", paper_id = id))]
    pub async fn commit(
        &self,
        id: &str,
        authors: &[String],
        meta: &ExtractedMetadata,
        embedding: &Vector,
    ) -> Result<()> {
        self.papers.store_extracted(id, authors, meta).await?;
        self.vectors.upsert(id, embedding).await?;
        self.papers.set_state(id, ProcessingState::Completed).await?;

        debug!(paper_id = id, "Committed to both stores");
        Ok(())
    }
}
