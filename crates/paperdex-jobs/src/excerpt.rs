//! Bounded text excerpting from PDFs using `pdftotext` (poppler-utils).
//!
//! The excerpt takes the head and tail of the document verbatim and drops the
//! middle. The head covers the title page, abstract, and introduction; the
//! tail covers conclusions and references, where code links and dataset names
//! cluster. A truncation marker separates the two only when pages were
//! actually dropped.

use std::io::Write;

use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::{debug, warn};

use paperdex_core::defaults::{
    EXTRACTION_CMD_TIMEOUT_SECS, PAGES_FROM_END, PAGES_FROM_START, TRUNCATION_MARKER,
};
use paperdex_core::{Error, Result};

/// Page ranges (1-based, inclusive) selected for one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExcerptPlan {
    /// Head range, always starting at page 1.
    pub head: (usize, usize),
    /// Tail range, absent when the head already covers the document.
    pub tail: Option<(usize, usize)>,
    /// Whether pages were dropped between head and tail.
    pub truncated: bool,
}

impl ExcerptPlan {
    /// Plan the excerpt for a document with `total_pages` pages.
    pub fn for_pages(total_pages: usize) -> Self {
        if total_pages <= PAGES_FROM_START {
            return Self {
                head: (1, total_pages.max(1)),
                tail: None,
                truncated: false,
            };
        }

        let tail_start = (total_pages - PAGES_FROM_END + 1).max(PAGES_FROM_START + 1);
        Self {
            head: (1, PAGES_FROM_START),
            tail: Some((tail_start, total_pages)),
            truncated: tail_start > PAGES_FROM_START + 1,
        }
    }
}

/// Parse the `Pages:` line of `pdfinfo` output.
fn parse_page_count(output: &str) -> Option<usize> {
    output.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        if key.trim() == "Pages" {
            value.trim().parse().ok()
        } else {
            None
        }
    })
}

/// Run a command with a timeout, returning stdout as a string.
async fn run_cmd_with_timeout(cmd: &mut Command, timeout_secs: u64) -> Result<String> {
    let output = tokio::time::timeout(std::time::Duration::from_secs(timeout_secs), cmd.output())
        .await
        .map_err(|_| {
            Error::Extraction(format!("External command timed out after {}s", timeout_secs))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "Command failed (exit {}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Extract text for a 1-based inclusive page range.
async fn extract_range(path: &str, first: usize, last: usize) -> Result<String> {
    run_cmd_with_timeout(
        Command::new("pdftotext")
            .arg("-f")
            .arg(first.to_string())
            .arg("-l")
            .arg(last.to_string())
            .arg(path)
            .arg("-"),
        EXTRACTION_CMD_TIMEOUT_SECS,
    )
    .await
}

/// Produce the bounded excerpt for a PDF document.
///
/// Fails with [`Error::Extraction`] when the data is not a PDF, cannot be
/// opened, or yields zero extractable characters. These failures need new
/// input bytes, not a retry.
pub async fn excerpt_pdf(data: &[u8]) -> Result<String> {
    if data.is_empty() {
        return Err(Error::Extraction("document is empty".to_string()));
    }

    if data.len() < 4 || &data[0..4] != b"%PDF" {
        return Err(Error::Extraction(
            "document is not a valid PDF (missing %PDF header)".to_string(),
        ));
    }

    // pdftotext reads from a file path
    let mut tmpfile = NamedTempFile::new()?;
    tmpfile.write_all(data)?;
    let tmp_path = tmpfile.path().to_string_lossy().to_string();

    let total_pages = match run_cmd_with_timeout(
        Command::new("pdfinfo").arg(&tmp_path),
        EXTRACTION_CMD_TIMEOUT_SECS,
    )
    .await
    {
        Ok(output) => parse_page_count(&output),
        Err(e) => {
            warn!(error = %e, "pdfinfo failed, extracting without a page plan");
            None
        }
    };

    let text = match total_pages {
        Some(pages) if pages > 0 => {
            let plan = ExcerptPlan::for_pages(pages);
            debug!(
                subsystem = "jobs",
                component = "excerpt",
                page_count = pages,
                truncated = plan.truncated,
                "Excerpting document"
            );

            let mut parts = vec![extract_range(&tmp_path, plan.head.0, plan.head.1).await?];
            if plan.truncated {
                parts.push(TRUNCATION_MARKER.to_string());
            }
            if let Some((first, last)) = plan.tail {
                parts.push(extract_range(&tmp_path, first, last).await?);
            }
            parts.join("")
        }
        // Page count unknown: take the whole document rather than guess.
        _ => {
            run_cmd_with_timeout(
                Command::new("pdftotext").arg(&tmp_path).arg("-"),
                EXTRACTION_CMD_TIMEOUT_SECS,
            )
            .await?
        }
    };

    if text.trim().is_empty() {
        return Err(Error::Extraction(
            "document yielded zero extractable characters".to_string(),
        ));
    }

    Ok(text)
}

/// Check that `pdftotext` is installed and runnable.
pub async fn health_check() -> Result<bool> {
    match Command::new("pdftotext").arg("-v").output().await {
        Ok(output) => {
            // pdftotext -v exits 0 or 99 depending on the version; both mean
            // the binary exists.
            Ok(output.status.success() || output.status.code() == Some(99))
        }
        Err(_) => Ok(false),
    }
}
