//! Core traits for paperdex abstractions.
//!
//! These traits define the seams between the pipeline and its collaborators:
//! the relational store, the vector index, the inference services, and the
//! document source. Concrete implementations live in paperdex-db and
//! paperdex-inference; tests substitute in-memory fakes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pgvector::Vector;
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

// =============================================================================
// PAPER REPOSITORY
// =============================================================================

/// Request for the no-query listing path.
#[derive(Debug, Clone, Default)]
pub struct ListPapersRequest {
    /// Some(true): only papers with code links. Some(false): only papers
    /// without. None: no filter.
    pub has_code: Option<bool>,
    /// Maximum results.
    pub limit: i64,
    /// Pagination offset.
    pub offset: i64,
}

/// Repository over the relational store of structured paper fields.
///
/// The ingestion orchestrator is the only caller of the mutating methods;
/// read-path components use the query methods only.
#[async_trait]
pub trait PaperRepository: Send + Sync {
    /// Create an identifier-only row in `pending` state if none exists.
    /// A no-op when the row already exists in any state.
    async fn ensure_pending(&self, id: &str) -> Result<()>;

    /// Advance the row to `processing`. Called once per job before any stage
    /// runs; never regresses a `completed` row.
    async fn mark_processing(&self, id: &str) -> Result<()>;

    /// Overwrite every extracted field with the new values (insert-or-update,
    /// never merged field-by-field). Leaves the state at `processing`; the
    /// dual-store writer flips it to `completed` only after the vector write
    /// succeeds.
    async fn store_extracted(
        &self,
        id: &str,
        authors: &[String],
        meta: &ExtractedMetadata,
    ) -> Result<()>;

    /// Set the processing state. Implementations must refuse to regress a
    /// `completed` row to any other state.
    async fn set_state(&self, id: &str, state: ProcessingState) -> Result<()>;

    /// Point-in-time state read. `None` when no row exists (the
    /// "unknown"/pre-submission case). Never blocks on in-flight jobs.
    async fn state_of(&self, id: &str) -> Result<Option<ProcessingState>>;

    /// Fetch a full paper row. `PaperNotFound` when no row exists.
    async fn fetch(&self, id: &str) -> Result<Paper>;

    /// No-query listing: deterministic order (title descending), code-link
    /// filter, pagination. Returns the page plus the filtered total.
    async fn list(&self, req: ListPapersRequest) -> Result<(Vec<PaperSummary>, i64)>;

    /// Fetch lexical-scoring fields for exactly the given identifiers.
    /// Identifiers with no relational row are silently absent from the
    /// result; order is unspecified (callers re-order by semantic rank).
    async fn candidates(&self, ids: &[String]) -> Result<Vec<CandidateRecord>>;

    /// Join identifiers back to summaries, preserving the caller's order.
    /// Identifiers with no relational row are silently dropped.
    async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<PaperSummary>>;
}

// =============================================================================
// VECTOR INDEX
// =============================================================================

/// One nearest-neighbor hit, ordered by ascending distance.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub id: String,
    /// Cosine distance (0 = identical).
    pub distance: f64,
}

/// The vector index: identifier-keyed embeddings with k-NN lookup.
///
/// Shares identifiers with the relational store but enforces no relationship
/// to it; a `VectorRecord` existing iff its paper is `completed` is the
/// pipeline's invariant to maintain.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Insert or replace the embedding for an identifier.
    async fn upsert(&self, id: &str, vector: &Vector) -> Result<()>;

    /// Fetch the stored embedding, `None` when the identifier is unindexed.
    async fn get(&self, id: &str) -> Result<Option<Vector>>;

    /// The `k` nearest identifiers to `query`, closest first.
    async fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<Neighbor>>;

    /// Remove an identifier from the index, if present.
    async fn remove(&self, id: &str) -> Result<()>;
}

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Backend for generating text embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    /// Deterministic for a given input and model version.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate free text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate with the service instructed to emit a single JSON object.
    async fn generate_json(&self, prompt: &str) -> Result<String>;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// DOCUMENT SOURCE
// =============================================================================

/// Raw document plus source-side metadata for one identifier.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Raw bytes of the paginated document (PDF).
    pub bytes: Vec<u8>,
    /// Ordered author list as reported by the source.
    pub authors: Vec<String>,
}

/// External source of paper documents (e.g. the arXiv export API).
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Fetch the document for an identifier. `NotFound` when the source has
    /// no such paper (non-retryable); `SourceUnavailable` on transient
    /// failures (retryable by resubmission).
    async fn fetch(&self, id: &str) -> Result<SourceDocument>;
}

// =============================================================================
// INGEST QUEUE
// =============================================================================

/// Queue of ingestion jobs consumed by the worker pool.
#[async_trait]
pub trait IngestQueue: Send + Sync {
    /// Enqueue a job for an identifier, returning the job id. Submission
    /// never blocks on pipeline completion.
    async fn enqueue(&self, paper_id: &str) -> Result<Uuid>;

    /// Claim the next pending job (oldest first), marking it running.
    /// Safe under concurrent workers.
    async fn claim_next(&self) -> Result<Option<IngestionJob>>;

    /// Mark a job completed.
    async fn complete(&self, job_id: Uuid) -> Result<()>;

    /// Mark a job failed with an error message.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<IngestionJob>>;

    /// Count of jobs waiting to be claimed.
    async fn pending_count(&self) -> Result<i64>;

    /// Crash recovery: mark running jobs started before `cutoff` as failed
    /// and flip their papers' stale `processing` rows to `failed`. Returns
    /// the number of jobs reaped.
    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<i64>;
}
