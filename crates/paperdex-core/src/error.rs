//! Error types for paperdex.

use thiserror::Error;

/// Result type alias using paperdex's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for paperdex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Paper not found in the relational store
    #[error("Paper not found: {0}")]
    PaperNotFound(String),

    /// Document source fetch failed (retryable by resubmission)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// No text recoverable from the document
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// The extraction model returned non-JSON or invalid-shape output
    #[error("Malformed extraction output: {0}")]
    MalformedExtraction(String),

    /// Embedding generation failed or input was degenerate
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Vector index operation failed
    #[error("Index error: {0}")]
    Index(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether a fresh submission for the same identifier can reasonably
    /// succeed without new input bytes.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::SourceUnavailable(_)
                | Error::MalformedExtraction(_)
                | Error::Embedding(_)
                | Error::Database(_)
                | Error::Index(_)
                | Error::Request(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_paper_not_found() {
        let err = Error::PaperNotFound("2403.01234".to_string());
        assert_eq!(err.to_string(), "Paper not found: 2403.01234");
    }

    #[test]
    fn test_error_display_source_unavailable() {
        let err = Error::SourceUnavailable("connection reset".to_string());
        assert_eq!(err.to_string(), "Source unavailable: connection reset");
    }

    #[test]
    fn test_error_display_extraction() {
        let err = Error::Extraction("zero extractable characters".to_string());
        assert_eq!(
            err.to_string(),
            "Extraction error: zero extractable characters"
        );
    }

    #[test]
    fn test_error_display_malformed_extraction() {
        let err = Error::MalformedExtraction("top-level value is an array".to_string());
        assert_eq!(
            err.to_string(),
            "Malformed extraction output: top-level value is an array"
        );
    }

    #[test]
    fn test_error_display_embedding() {
        let err = Error::Embedding("empty input after normalization".to_string());
        assert_eq!(
            err.to_string(),
            "Embedding error: empty input after normalization"
        );
    }

    #[test]
    fn test_error_display_index() {
        let err = Error::Index("upsert failed".to_string());
        assert_eq!(err.to_string(), "Index error: upsert failed");
    }

    #[test]
    fn test_error_display_job() {
        let err = Error::Job("queue unavailable".to_string());
        assert_eq!(err.to_string(), "Job error: queue unavailable");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::SourceUnavailable("timeout".into()).is_retryable());
        assert!(Error::MalformedExtraction("not json".into()).is_retryable());
        assert!(Error::Embedding("degenerate".into()).is_retryable());
        assert!(Error::Index("unreachable".into()).is_retryable());
        // Needs different input bytes, not a retry
        assert!(!Error::Extraction("no text".into()).is_retryable());
        assert!(!Error::PaperNotFound("x".into()).is_retryable());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_result_type_ok() {
        fn get_result() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(get_result().unwrap(), 42);
    }
}
