//! # paperdex-jobs
//!
//! Background ingestion pipeline for paperdex.
//!
//! One job takes an external paper identifier through the full pipeline:
//! fetch the document from its source, excerpt its text, run structured
//! extraction, embed the result, and commit both stores. The [`JobWorker`]
//! claims queued jobs concurrently and drives [`IngestHandler`] under a
//! per-job timeout.

pub mod excerpt;
pub mod handler;
pub mod ingest;
pub mod source;
pub mod worker;
pub mod writer;

pub use excerpt::{excerpt_pdf, ExcerptPlan};
pub use handler::{JobContext, JobHandler, JobResult};
pub use ingest::IngestHandler;
pub use source::ArxivSource;
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
pub use writer::DualStoreWriter;

/// Default polling interval in milliseconds.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = paperdex_core::defaults::JOB_POLL_INTERVAL_MS;
