//! arXiv document source: metadata via the export Atom API, bytes via the
//! PDF endpoint.

use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use tracing::{debug, instrument, warn};

use paperdex_core::defaults::{ARXIV_API_URL, ARXIV_PDF_URL, SOURCE_TIMEOUT_SECS};
use paperdex_core::{DocumentSource, Error, Result, SourceDocument};

/// Document source backed by the arXiv export API.
pub struct ArxivSource {
    client: Client,
    api_url: String,
    pdf_url: String,
}

impl ArxivSource {
    /// Create a source against the public arXiv endpoints.
    pub fn new() -> Self {
        Self::with_urls(ARXIV_API_URL.to_string(), ARXIV_PDF_URL.to_string())
    }

    /// Create a source against custom endpoints (used by tests).
    pub fn with_urls(api_url: String, pdf_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(SOURCE_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_url,
            pdf_url,
        }
    }

    async fn fetch_feed(&self, id: &str) -> Result<String> {
        let url = format!("{}?id_list={}&max_results=1", self.api_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("arXiv API request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "arXiv API returned {}",
                response.status()
            )));
        }

        response
            .text()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("arXiv API read failed: {}", e)))
    }

    async fn fetch_pdf(&self, id: &str) -> Result<Vec<u8>> {
        let url = format!("{}/{}.pdf", self.pdf_url, id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("PDF download failed: {}", e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("no PDF for identifier {}", id)));
        }
        if !response.status().is_success() {
            return Err(Error::SourceUnavailable(format!(
                "PDF endpoint returned {}",
                response.status()
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::SourceUnavailable(format!("PDF download read failed: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

impl Default for ArxivSource {
    fn default() -> Self {
        Self::new()
    }
}

/// Pull the ordered author names out of an Atom feed entry.
fn parse_authors(feed: &str) -> Vec<String> {
    // The export API nests exactly one <name> per <author>.
    let re = Regex::new(r"<name>\s*([^<]+?)\s*</name>").expect("static regex");
    re.captures_iter(feed)
        .map(|c| c[1].to_string())
        .collect()
}

/// Whether the feed carries a real entry for the requested identifier.
///
/// The export API answers unknown identifiers with an entry whose title is
/// literally "Error", not with an HTTP error.
fn feed_has_entry(feed: &str) -> bool {
    feed.contains("<entry>") && !feed.contains("<title>Error</title>")
}

#[async_trait]
impl DocumentSource for ArxivSource {
    #[instrument(skip(self), fields(subsystem = "jobs", component = "source", op = "fetch", paper_id = id))]
    async fn fetch(&self, id: &str) -> Result<SourceDocument> {
        let feed = self.fetch_feed(id).await?;

        if !feed_has_entry(&feed) {
            return Err(Error::NotFound(format!(
                "arXiv has no paper with identifier {}",
                id
            )));
        }

        let authors = parse_authors(&feed);
        if authors.is_empty() {
            warn!(paper_id = id, "Feed entry carries no authors");
        }

        let bytes = self.fetch_pdf(id).await?;
        debug!(
            paper_id = id,
            author_count = authors.len(),
            byte_count = bytes.len(),
            "Fetched source document"
        );

        Ok(SourceDocument { bytes, authors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED_OK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/abs/1706.03762v7</id>
    <title>Attention Is All You Need</title>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
  </entry>
</feed>"#;

    const FEED_NO_ENTRY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <totalResults>0</totalResults>
</feed>"#;

    const FEED_ERROR_ENTRY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format</id>
    <title>Error</title>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_authors_preserves_order() {
        assert_eq!(
            parse_authors(FEED_OK),
            vec!["Ashish Vaswani".to_string(), "Noam Shazeer".to_string()]
        );
    }

    #[test]
    fn test_parse_authors_trims_whitespace() {
        let feed = "<author><name>\n  Jane Doe \n</name></author>";
        assert_eq!(parse_authors(feed), vec!["Jane Doe".to_string()]);
    }

    #[test]
    fn test_feed_entry_detection() {
        assert!(feed_has_entry(FEED_OK));
        assert!(!feed_has_entry(FEED_NO_ENTRY));
        assert!(!feed_has_entry(FEED_ERROR_ENTRY));
    }

    async fn source_for(server: &MockServer) -> ArxivSource {
        ArxivSource::with_urls(
            format!("{}/api/query", server.uri()),
            format!("{}/pdf", server.uri()),
        )
    }

    #[tokio::test]
    async fn test_fetch_happy_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .and(query_param("id_list", "1706.03762"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_OK))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pdf/1706.03762.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.0 fake".to_vec()))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let doc = source.fetch("1706.03762").await.unwrap();
        assert_eq!(doc.authors.len(), 2);
        assert!(doc.bytes.starts_with(b"%PDF"));
    }

    #[tokio::test]
    async fn test_fetch_unknown_id_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_ERROR_ENTRY))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source.fetch("bogus").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_api_outage_is_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source.fetch("1706.03762").await.unwrap_err();
        assert!(matches!(err, Error::SourceUnavailable(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_fetch_missing_pdf_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/query"))
            .respond_with(ResponseTemplate::new(200).set_body_string(FEED_OK))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/pdf/1706.03762.pdf"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let source = source_for(&server).await;
        let err = source.fetch("1706.03762").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
