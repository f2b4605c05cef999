//! Hybrid query planner: semantic candidate retrieval plus lexical
//! re-scoring.
//!
//! The candidate set comes from the vector index alone. A keyword that never
//! co-occurs semantically with the query does not resurrect rows the index
//! ruled out; with zero candidates the result is an empty page, never a
//! lexical full-table scan.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, instrument};

use paperdex_core::{
    defaults, CandidateRecord, EmbeddingBackend, ListPapersRequest, PaperRepository, PaperSummary,
    Result, SearchPage, VectorIndex,
};

/// Lexical score for a candidate whose title matches the query.
const SCORE_TITLE: u8 = 3;
/// Lexical score for a candidate whose abstract (but not title) matches.
const SCORE_ABSTRACT: u8 = 2;
/// Lexical score for a semantic-only candidate.
const SCORE_SEMANTIC: u8 = 1;

/// A search request. Page numbers are 1-based.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub query: Option<String>,
    pub has_code: Option<bool>,
    pub page: i64,
    pub per_page: i64,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            query: None,
            has_code: None,
            page: 1,
            per_page: defaults::PAGE_SIZE,
        }
    }
}

impl SearchRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_has_code(mut self, has_code: bool) -> Self {
        self.has_code = Some(has_code);
        self
    }

    pub fn with_page(mut self, page: i64) -> Self {
        self.page = page;
        self
    }

    pub fn with_per_page(mut self, per_page: i64) -> Self {
        self.per_page = per_page;
        self
    }

    /// Clamp page and page size into their valid ranges.
    fn normalized(&self) -> (i64, i64) {
        let page = self.page.clamp(1, defaults::PAGE_MAX);
        let per_page = self.per_page.clamp(1, defaults::PAGE_SIZE_MAX);
        (page, per_page)
    }

    /// The trimmed query, `None` when absent or blank.
    fn effective_query(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Hybrid search over the vector index and the relational store.
pub struct HybridQueryPlanner {
    papers: Arc<dyn PaperRepository>,
    vectors: Arc<dyn VectorIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
    candidate_limit: usize,
}

impl HybridQueryPlanner {
    pub fn new(
        papers: Arc<dyn PaperRepository>,
        vectors: Arc<dyn VectorIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            papers,
            vectors,
            embedder,
            candidate_limit: defaults::SEMANTIC_CANDIDATES,
        }
    }

    /// Override the semantic candidate set size.
    pub fn with_candidate_limit(mut self, limit: usize) -> Self {
        self.candidate_limit = limit;
        self
    }

    /// Run a search request.
    #[instrument(skip(self, req), fields(subsystem = "search", component = "planner", op = "search", has_query = req.effective_query().is_some()))]
    pub async fn search(&self, req: SearchRequest) -> Result<SearchPage<PaperSummary>> {
        let (page, per_page) = req.normalized();

        match req.effective_query() {
            Some(query) => self.search_hybrid(query, req.has_code, page, per_page).await,
            None => self.list_all(req.has_code, page, per_page).await,
        }
    }

    /// No-query path: deterministic listing straight from the relational
    /// store (title descending).
    async fn list_all(
        &self,
        has_code: Option<bool>,
        page: i64,
        per_page: i64,
    ) -> Result<SearchPage<PaperSummary>> {
        let (items, total) = self
            .papers
            .list(ListPapersRequest {
                has_code,
                limit: per_page,
                offset: (page - 1) * per_page,
            })
            .await?;

        Ok(SearchPage::new(total, page, per_page, items))
    }

    /// Query path: nearest-neighbor candidates, lexical re-scoring, filter,
    /// paginate.
    async fn search_hybrid(
        &self,
        query: &str,
        has_code: Option<bool>,
        page: i64,
        per_page: i64,
    ) -> Result<SearchPage<PaperSummary>> {
        let mut query_vectors = self.embedder.embed_texts(&[query.to_string()]).await?;
        let query_vector = match query_vectors.pop() {
            Some(v) => v,
            None => return Ok(SearchPage::empty(page, per_page)),
        };

        let neighbors = self
            .vectors
            .nearest(&query_vector, self.candidate_limit)
            .await?;
        if neighbors.is_empty() {
            return Ok(SearchPage::empty(page, per_page));
        }

        // Semantic rank by position; closer matches first.
        let rank_of: HashMap<&str, usize> = neighbors
            .iter()
            .enumerate()
            .map(|(rank, n)| (n.id.as_str(), rank))
            .collect();
        let ids: Vec<String> = neighbors.iter().map(|n| n.id.clone()).collect();

        let candidates = self.papers.candidates(&ids).await?;

        let mut scored: Vec<(u8, usize, CandidateRecord)> = candidates
            .into_iter()
            .filter_map(|c| {
                // Candidates whose vector row outlived its relational row are
                // already absent here; rank lookup can only miss if the
                // repository returned an id we did not ask for.
                let rank = *rank_of.get(c.id.as_str())?;
                Some((lexical_score(query, &c.title, &c.abstract_text), rank, c))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

        let filtered: Vec<&CandidateRecord> = scored
            .iter()
            .filter(|(_, _, c)| match has_code {
                Some(wanted) => c.has_code == wanted,
                None => true,
            })
            .map(|(_, _, c)| c)
            .collect();

        let total = filtered.len() as i64;
        let start = ((page - 1) * per_page) as usize;
        let items: Vec<PaperSummary> = filtered
            .into_iter()
            .skip(start)
            .take(per_page as usize)
            .map(|c| PaperSummary {
                id: c.id.clone(),
                title: c.title.clone(),
                authors: c.authors.clone(),
            })
            .collect();

        debug!(
            candidate_count = ids.len(),
            result_count = items.len(),
            total_items = total,
            "Hybrid search complete"
        );
        Ok(SearchPage::new(total, page, per_page, items))
    }
}

/// Score a candidate against the query: title match beats abstract match
/// beats semantic-only. Case-insensitive substring semantics.
fn lexical_score(query: &str, title: &str, abstract_text: &str) -> u8 {
    let query = query.to_lowercase();
    if title.to_lowercase().contains(&query) {
        SCORE_TITLE
    } else if abstract_text.to_lowercase().contains(&query) {
        SCORE_ABSTRACT
    } else {
        SCORE_SEMANTIC
    }
}
