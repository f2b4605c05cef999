//! Core data models for paperdex.
//!
//! The central entity is [`Paper`]: one row per external identifier in the
//! relational store, carrying the structured fields the extraction model
//! produced plus a [`ProcessingState`]. The matching embedding lives in the
//! vector index under the same identifier; the two stores have no foreign-key
//! relationship, so their consistency is a pipeline invariant, not a storage
//! guarantee.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

// =============================================================================
// PROCESSING STATE
// =============================================================================

/// Lifecycle state of a paper in the relational store.
///
/// Transitions are monotonic: `Pending → Processing → Completed` on the happy
/// path, `→ Failed` on any stage error. `Failed` is re-enterable (a fresh
/// submission restarts at `Processing`); `Completed` is the single terminal
/// success marker and is never regressed.
///
/// "Unknown" (no row exists) is derived by absence checks and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingState {
    /// Row exists, fields not yet populated.
    Pending,
    /// An ingestion job has started for this identifier.
    Processing,
    /// Both stores durably written.
    Completed,
    /// Terminal failure, eligible for resubmission.
    Failed,
}

impl ProcessingState {
    /// Stable string form used in the database and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingState::Pending => "pending",
            ProcessingState::Processing => "processing",
            ProcessingState::Completed => "completed",
            ProcessingState::Failed => "failed",
        }
    }

    /// Parse from the database string form. Unrecognized values collapse to
    /// `Pending` so a corrupt row never masquerades as done.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "processing" => ProcessingState::Processing,
            "completed" => ProcessingState::Completed,
            "failed" => ProcessingState::Failed,
            _ => ProcessingState::Pending,
        }
    }

    /// True for states no further job may advance past.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Failed)
    }
}

impl std::fmt::Display for ProcessingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// EXTRACTED METADATA
// =============================================================================

/// One benchmark result reported by a paper.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedResult {
    #[serde(default)]
    pub metric: String,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub task: String,
}

/// Structured record produced by the extraction model.
///
/// Field names mirror the JSON keys the extraction prompt fixes. Any key
/// absent in the model response defaults to an empty string or list; a
/// response whose top-level value is not a JSON object is rejected outright.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractedMetadata {
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "abstract")]
    pub abstract_text: String,
    #[serde(default)]
    pub contribution: String,
    #[serde(default)]
    pub tasks: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub datasets: Vec<String>,
    #[serde(default)]
    pub code_links: Vec<String>,
    #[serde(default)]
    pub results: Vec<ReportedResult>,
}

impl ExtractedMetadata {
    /// Parse the raw response body of the extraction model.
    ///
    /// Guarantees structural shape only: the top-level value must be a JSON
    /// object, and each field must either be absent (defaults applied) or
    /// carry the declared type. Anything else is `MalformedExtraction`,
    /// attributable to the model call rather than the input document.
    pub fn from_llm_json(body: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| Error::MalformedExtraction(format!("response is not JSON: {}", e)))?;

        if !value.is_object() {
            return Err(Error::MalformedExtraction(format!(
                "top-level value is {}, expected object",
                json_type_name(&value)
            )));
        }

        serde_json::from_value(value)
            .map_err(|e| Error::MalformedExtraction(format!("invalid field shape: {}", e)))
    }

    /// True when the model reported at least one code link.
    pub fn has_code(&self) -> bool {
        !self.code_links.is_empty()
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

// =============================================================================
// PAPER
// =============================================================================

/// A paper row in the relational store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    /// External document identifier (arXiv-style), primary key in both stores.
    pub id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    /// Ordered author list, captured from the document source at ingest time.
    pub authors: Vec<String>,
    pub contribution: String,
    pub tasks: Vec<String>,
    pub methods: Vec<String>,
    pub datasets: Vec<String>,
    pub code_links: Vec<String>,
    pub results: Vec<ReportedResult>,
    pub state: ProcessingState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Paper {
    /// True when the paper carries at least one code link.
    pub fn has_code(&self) -> bool {
        !self.code_links.is_empty()
    }
}

/// Lightweight paper view for list and recommendation surfaces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaperSummary {
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
}

/// Fields needed to lexically score a semantic candidate.
#[derive(Debug, Clone)]
pub struct CandidateRecord {
    pub id: String,
    pub title: String,
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub has_code: bool,
}

// =============================================================================
// SEARCH PAGE
// =============================================================================

/// One page of an ordered result set, with totals computed over the filtered
/// set (not the unfiltered store).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchPage<T> {
    pub total_items: i64,
    pub total_pages: i64,
    pub page: i64,
    pub per_page: i64,
    pub items: Vec<T>,
}

impl<T> SearchPage<T> {
    /// Build a page, deriving `total_pages` by ceiling division.
    pub fn new(total_items: i64, page: i64, per_page: i64, items: Vec<T>) -> Self {
        let total_pages = if per_page > 0 {
            (total_items + per_page - 1) / per_page
        } else {
            0
        };
        Self {
            total_items,
            total_pages,
            page,
            per_page,
            items,
        }
    }

    /// An empty page for zero-candidate short-circuits.
    pub fn empty(page: i64, per_page: i64) -> Self {
        Self::new(0, page, per_page, Vec::new())
    }
}

// =============================================================================
// INGESTION JOB
// =============================================================================

/// Queue status of an ingestion job. Ephemeral; the paper row is the source
/// of truth for client-visible progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "running" => JobStatus::Running,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            _ => JobStatus::Pending,
        }
    }
}

/// One unit of ingestion work: identifier plus bookkeeping. Consumed exactly
/// once by a worker; retained only for observability after a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub paper_id: String,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_state_round_trip() {
        for state in [
            ProcessingState::Pending,
            ProcessingState::Processing,
            ProcessingState::Completed,
            ProcessingState::Failed,
        ] {
            assert_eq!(ProcessingState::from_str_lossy(state.as_str()), state);
        }
    }

    #[test]
    fn test_processing_state_unrecognized_is_pending() {
        assert_eq!(
            ProcessingState::from_str_lossy("done"),
            ProcessingState::Pending
        );
    }

    #[test]
    fn test_processing_state_terminal() {
        assert!(ProcessingState::Completed.is_terminal());
        assert!(ProcessingState::Failed.is_terminal());
        assert!(!ProcessingState::Pending.is_terminal());
        assert!(!ProcessingState::Processing.is_terminal());
    }

    #[test]
    fn test_extracted_metadata_full_object() {
        let body = r#"{
            "title": "Attention Is All You Need",
            "abstract": "The dominant sequence transduction models...",
            "contribution": "Introduces the Transformer.",
            "tasks": ["Machine Translation"],
            "methods": ["Transformer"],
            "datasets": ["WMT 2014"],
            "code_links": ["https://github.com/tensorflow/tensor2tensor"],
            "results": [{"metric": "BLEU", "value": "28.4", "task": "WMT 2014 En-De"}]
        }"#;
        let meta = ExtractedMetadata::from_llm_json(body).unwrap();
        assert_eq!(meta.title, "Attention Is All You Need");
        assert_eq!(meta.tasks, vec!["Machine Translation"]);
        assert_eq!(meta.results.len(), 1);
        assert_eq!(meta.results[0].metric, "BLEU");
        assert!(meta.has_code());
    }

    #[test]
    fn test_extracted_metadata_missing_keys_default() {
        let meta = ExtractedMetadata::from_llm_json(r#"{"title": "Only a Title"}"#).unwrap();
        assert_eq!(meta.title, "Only a Title");
        assert_eq!(meta.abstract_text, "");
        assert_eq!(meta.contribution, "");
        assert!(meta.tasks.is_empty());
        assert!(meta.methods.is_empty());
        assert!(meta.datasets.is_empty());
        assert!(meta.code_links.is_empty());
        assert!(meta.results.is_empty());
        assert!(!meta.has_code());
    }

    #[test]
    fn test_extracted_metadata_rejects_non_json() {
        let err = ExtractedMetadata::from_llm_json("Sure! Here is the JSON you asked for:")
            .unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_extracted_metadata_rejects_array_top_level() {
        let err = ExtractedMetadata::from_llm_json(r#"[{"title": "x"}]"#).unwrap_err();
        match err {
            Error::MalformedExtraction(msg) => assert!(msg.contains("array")),
            other => panic!("expected MalformedExtraction, got {:?}", other),
        }
    }

    #[test]
    fn test_extracted_metadata_rejects_string_top_level() {
        let err = ExtractedMetadata::from_llm_json(r#""just a string""#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_extracted_metadata_rejects_wrong_field_shape() {
        // tasks must be a list of strings, not a single string
        let err =
            ExtractedMetadata::from_llm_json(r#"{"tasks": "Machine Translation"}"#).unwrap_err();
        assert!(matches!(err, Error::MalformedExtraction(_)));
    }

    #[test]
    fn test_search_page_totals() {
        let page: SearchPage<i32> = SearchPage::new(25, 1, 12, vec![]);
        assert_eq!(page.total_pages, 3);

        let exact: SearchPage<i32> = SearchPage::new(24, 1, 12, vec![]);
        assert_eq!(exact.total_pages, 2);

        let empty: SearchPage<i32> = SearchPage::empty(3, 12);
        assert_eq!(empty.total_items, 0);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.page, 3);
    }

    #[test]
    fn test_job_status_round_trip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::from_str_lossy(status.as_str()), status);
        }
    }

    #[test]
    fn test_paper_serde_uses_abstract_key() {
        let meta = ExtractedMetadata {
            abstract_text: "text".into(),
            ..Default::default()
        };
        let json = serde_json::to_value(&meta).unwrap();
        assert!(json.get("abstract").is_some());
        assert!(json.get("abstract_text").is_none());
    }
}
