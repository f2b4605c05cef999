//! pgvector-backed vector index.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;

use paperdex_core::{defaults, Error, Neighbor, Result, VectorIndex};

/// PostgreSQL implementation of [`VectorIndex`] over the `paper_vector` table.
///
/// Distances are cosine (`<=>`), matching the HNSW index operator class.
#[derive(Clone)]
pub struct PgVectorIndex {
    pool: Pool<Postgres>,
    model: String,
}

impl PgVectorIndex {
    /// Create a new index handle recording embeddings under the default model.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_model(pool, defaults::EMBED_MODEL)
    }

    /// Create a new index handle recording embeddings under a specific model
    /// name. The stored name is provenance only; lookups ignore it.
    pub fn with_model(pool: Pool<Postgres>, model: impl Into<String>) -> Self {
        Self {
            pool,
            model: model.into(),
        }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(&self, id: &str, vector: &Vector) -> Result<()> {
        sqlx::query(
            "INSERT INTO paper_vector (paper_id, embedding, model, updated_at)
             VALUES ($1, $2, $3, now())
             ON CONFLICT (paper_id) DO UPDATE SET
                embedding = excluded.embedding,
                model = excluded.model,
                updated_at = now()",
        )
        .bind(id)
        .bind(vector)
        .bind(&self.model)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "vectors",
            op = "upsert",
            paper_id = id,
            model = %self.model,
            "Upserted embedding"
        );
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<Vector>> {
        let row = sqlx::query("SELECT embedding FROM paper_vector WHERE paper_id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(|r| r.get("embedding")))
    }

    async fn nearest(&self, query: &Vector, k: usize) -> Result<Vec<Neighbor>> {
        let rows = sqlx::query(
            "SELECT paper_id, (embedding <=> $1)::float8 AS distance
             FROM paper_vector
             ORDER BY embedding <=> $1
             LIMIT $2",
        )
        .bind(query)
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows
            .into_iter()
            .map(|row| Neighbor {
                id: row.get("paper_id"),
                distance: row.get("distance"),
            })
            .collect())
    }

    async fn remove(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM paper_vector WHERE paper_id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
