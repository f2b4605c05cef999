//! Centralized default constants for the paperdex system.
//!
//! **This module is the single source of truth** for all shared default
//! values. Crates reference these constants instead of defining their own
//! magic numbers. When adding new constants, place them in the appropriate
//! section and document the rationale for the chosen value.

// =============================================================================
// TEXT EXCERPTING
// =============================================================================

/// Pages taken verbatim from the start of a document. Covers the title page,
/// abstract, and introduction of a typical paper.
pub const PAGES_FROM_START: usize = 15;

/// Pages taken verbatim from the end of a document. Covers conclusions,
/// references, and appendices, where code links and dataset names cluster.
pub const PAGES_FROM_END: usize = 10;

/// Delimiter inserted between the head and tail of a truncated excerpt.
pub const TRUNCATION_MARKER: &str = "\n\n... [DOCUMENT TRUNCATED] ...\n\n";

/// Timeout for a single external extraction command (pdfinfo/pdftotext).
pub const EXTRACTION_CMD_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model served by the embedding endpoint.
pub const EMBED_MODEL: &str = "all-MiniLM-L6-v2";

/// Default embedding vector dimension for all-MiniLM-L6-v2.
pub const EMBED_DIMENSION: usize = 384;

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 30;

// =============================================================================
// GENERATION / STRUCTURED EXTRACTION
// =============================================================================

/// Default text-generation model for structured extraction.
pub const GEN_MODEL: &str = "glm-4-flash";

/// Timeout for generation requests (seconds). Extraction prompts carry up to
/// 25 pages of text, so this is well above a chat-sized default.
pub const GEN_TIMEOUT_SECS: u64 = 180;

/// Default base URL for the OpenAI-compatible inference service.
pub const INFERENCE_URL: &str = "http://127.0.0.1:8000/v1";

// =============================================================================
// SEARCH
// =============================================================================

/// Semantic candidate set size for hybrid search. Candidates beyond this
/// rank never surface, regardless of lexical score.
pub const SEMANTIC_CANDIDATES: usize = 200;

/// Maximum recommendations returned for a paper.
pub const RECOMMEND_LIMIT: usize = 5;

/// Neighbors fetched for a recommendation query. One more than the limit
/// because a paper is always its own nearest neighbor.
pub const RECOMMEND_FETCH: usize = RECOMMEND_LIMIT + 1;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for the paper search surface.
pub const PAGE_SIZE: i64 = 12;

/// Upper bound on requested page size.
pub const PAGE_SIZE_MAX: i64 = 100;

/// Upper bound on the requested page number. Keeps client-supplied offsets
/// (`page * per_page`) far from i64 overflow.
pub const PAGE_MAX: i64 = 100_000;

// =============================================================================
// JOBS
// =============================================================================

/// Ceiling on a single ingestion job. Past this, the job is treated as failed
/// and the worker slot reclaimed.
pub const JOB_TIMEOUT_SECS: u64 = 600;

/// Polling interval when the job queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum concurrent ingestion jobs per worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Worker event broadcast channel capacity.
pub const EVENT_CAPACITY: usize = 256;

// =============================================================================
// DOCUMENT SOURCE
// =============================================================================

/// Default base URL for the arXiv export API.
pub const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Default base URL for arXiv PDF downloads.
pub const ARXIV_PDF_URL: &str = "https://arxiv.org/pdf";

/// Timeout for document source requests (seconds).
pub const SOURCE_TIMEOUT_SECS: u64 = 120;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;
