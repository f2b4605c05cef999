//! Relational paper repository implementation.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use paperdex_core::{
    CandidateRecord, Error, ExtractedMetadata, ListPapersRequest, Paper, PaperRepository,
    PaperSummary, ProcessingState, Result,
};

/// PostgreSQL implementation of [`PaperRepository`].
#[derive(Clone)]
pub struct PgPaperRepository {
    pool: Pool<Postgres>,
}

impl PgPaperRepository {
    /// Create a new repository over the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Build the SQL predicate for the code-link filter.
    fn code_filter_clause(has_code: Option<bool>) -> &'static str {
        match has_code {
            Some(true) => "AND cardinality(code_links) > 0",
            Some(false) => "AND cardinality(code_links) = 0",
            None => "",
        }
    }

    /// Parse the JSONB results column behind a single accessor, per the
    /// schema's one-opaque-column exception.
    fn parse_results(value: serde_json::Value) -> Vec<paperdex_core::ReportedResult> {
        serde_json::from_value(value).unwrap_or_default()
    }

    fn parse_paper_row(row: sqlx::postgres::PgRow) -> Paper {
        Paper {
            id: row.get("id"),
            title: row.get("title"),
            abstract_text: row.get("abstract"),
            authors: row.get("authors"),
            contribution: row.get("contribution"),
            tasks: row.get("tasks"),
            methods: row.get("methods"),
            datasets: row.get("datasets"),
            code_links: row.get("code_links"),
            results: Self::parse_results(row.get("results")),
            state: ProcessingState::from_str_lossy(row.get("state")),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl PaperRepository for PgPaperRepository {
    async fn ensure_pending(&self, id: &str) -> Result<()> {
        sqlx::query("INSERT INTO paper (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn mark_processing(&self, id: &str) -> Result<()> {
        // Guarded so a concurrent resubmission can never regress a row that
        // already reached the terminal success marker.
        sqlx::query(
            "UPDATE paper SET state = 'processing', updated_at = now()
             WHERE id = $1 AND state <> 'completed'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn store_extracted(
        &self,
        id: &str,
        authors: &[String],
        meta: &ExtractedMetadata,
    ) -> Result<()> {
        let results = serde_json::to_value(&meta.results)?;

        // Insert-or-overwrite-all-fields: on conflict every field takes the
        // new value, never merged field-by-field. Concurrent duplicate
        // submissions are idempotent; the last writer's data wins. The state
        // stays at `processing` here — only the dual-store writer flips it to
        // `completed`, after the vector write succeeds.
        sqlx::query(
            "INSERT INTO paper (
                id, title, abstract, authors, contribution,
                tasks, methods, datasets, code_links, results, state, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'processing', now())
            ON CONFLICT (id) DO UPDATE SET
                title = excluded.title,
                abstract = excluded.abstract,
                authors = excluded.authors,
                contribution = excluded.contribution,
                tasks = excluded.tasks,
                methods = excluded.methods,
                datasets = excluded.datasets,
                code_links = excluded.code_links,
                results = excluded.results,
                updated_at = now()",
        )
        .bind(id)
        .bind(&meta.title)
        .bind(&meta.abstract_text)
        .bind(authors)
        .bind(&meta.contribution)
        .bind(&meta.tasks)
        .bind(&meta.methods)
        .bind(&meta.datasets)
        .bind(&meta.code_links)
        .bind(results)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "papers",
            op = "store_extracted",
            paper_id = id,
            "Stored extracted fields"
        );
        Ok(())
    }

    async fn set_state(&self, id: &str, state: ProcessingState) -> Result<()> {
        // Monotonicity guard: a completed row is never regressed.
        sqlx::query(
            "UPDATE paper SET state = $2, updated_at = now()
             WHERE id = $1 AND (state <> 'completed' OR $2 = 'completed')",
        )
        .bind(id)
        .bind(state.as_str())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn state_of(&self, id: &str) -> Result<Option<ProcessingState>> {
        let row = sqlx::query("SELECT state FROM paper WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|r| ProcessingState::from_str_lossy(r.get("state"))))
    }

    async fn fetch(&self, id: &str) -> Result<Paper> {
        let row = sqlx::query(
            "SELECT id, title, abstract, authors, contribution, tasks, methods,
                    datasets, code_links, results, state, created_at, updated_at
             FROM paper WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_paper_row)
            .ok_or_else(|| Error::PaperNotFound(id.to_string()))
    }

    async fn list(&self, req: ListPapersRequest) -> Result<(Vec<PaperSummary>, i64)> {
        let filter = Self::code_filter_clause(req.has_code);

        let count_query = format!(
            "SELECT COUNT(*) FROM paper WHERE state = 'completed' {}",
            filter
        );
        let total: (i64,) = sqlx::query_as(&count_query)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let list_query = format!(
            "SELECT id, title, authors FROM paper
             WHERE state = 'completed' {}
             ORDER BY title DESC
             LIMIT $1 OFFSET $2",
            filter
        );
        let rows = sqlx::query(&list_query)
            .bind(req.limit)
            .bind(req.offset)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let summaries = rows
            .into_iter()
            .map(|row| PaperSummary {
                id: row.get("id"),
                title: row.get("title"),
                authors: row.get("authors"),
            })
            .collect();

        Ok((summaries, total.0))
    }

    async fn candidates(&self, ids: &[String]) -> Result<Vec<CandidateRecord>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query(
            "SELECT id, title, abstract, authors, cardinality(code_links) > 0 AS has_code
             FROM paper WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| CandidateRecord {
                id: row.get("id"),
                title: row.get("title"),
                abstract_text: row.get("abstract"),
                authors: row.get("authors"),
                has_code: row.get("has_code"),
            })
            .collect())
    }

    async fn fetch_summaries(&self, ids: &[String]) -> Result<Vec<PaperSummary>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let rows = sqlx::query("SELECT id, title, authors FROM paper WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(Error::Database)?;

        let mut by_id: HashMap<String, PaperSummary> = rows
            .into_iter()
            .map(|row| {
                let summary = PaperSummary {
                    id: row.get("id"),
                    title: row.get("title"),
                    authors: row.get("authors"),
                };
                (summary.id.clone(), summary)
            })
            .collect();

        // Preserve the caller's order; ids without a row are silently dropped.
        Ok(ids.iter().filter_map(|id| by_id.remove(id)).collect())
    }
}
