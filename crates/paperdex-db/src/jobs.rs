//! Ingestion job queue backed by PostgreSQL.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` so any number of worker tasks can
//! poll the same table without handing the same job to two of them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};
use uuid::Uuid;

use paperdex_core::{Error, IngestQueue, IngestionJob, JobStatus, Result};

/// PostgreSQL implementation of [`IngestQueue`] over the `ingest_job` table.
#[derive(Clone)]
pub struct PgIngestQueue {
    pool: Pool<Postgres>,
}

impl PgIngestQueue {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> IngestionJob {
        IngestionJob {
            id: row.get("id"),
            paper_id: row.get("paper_id"),
            status: JobStatus::from_str_lossy(row.get("status")),
            error_message: row.get("error_message"),
            submitted_at: row.get("submitted_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        }
    }
}

const JOB_COLUMNS: &str =
    "id, paper_id, status, error_message, submitted_at, started_at, completed_at";

#[async_trait]
impl IngestQueue for PgIngestQueue {
    async fn enqueue(&self, paper_id: &str) -> Result<Uuid> {
        let job_id = Uuid::now_v7();

        sqlx::query("INSERT INTO ingest_job (id, paper_id) VALUES ($1, $2)")
            .bind(job_id)
            .bind(paper_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        debug!(
            subsystem = "jobs",
            component = "queue",
            op = "enqueue",
            job_id = %job_id,
            paper_id = paper_id,
            "Enqueued ingestion job"
        );
        Ok(job_id)
    }

    async fn claim_next(&self) -> Result<Option<IngestionJob>> {
        let query = format!(
            "UPDATE ingest_job
             SET status = 'running', started_at = now()
             WHERE id = (
                 SELECT id FROM ingest_job
                 WHERE status = 'pending'
                 ORDER BY submitted_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        );

        let row = sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn complete(&self, job_id: Uuid) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_job SET status = 'completed', completed_at = now()
             WHERE id = $1",
        )
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ingest_job
             SET status = 'failed', error_message = $2, completed_at = now()
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<IngestionJob>> {
        let query = format!("SELECT {JOB_COLUMNS} FROM ingest_job WHERE id = $1");

        let row = sqlx::query(&query)
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(row.map(Self::parse_row))
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM ingest_job WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count.0)
    }

    async fn reap_stale(&self, cutoff: DateTime<Utc>) -> Result<i64> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let rows = sqlx::query(
            "UPDATE ingest_job
             SET status = 'failed',
                 error_message = 'worker lost before completion',
                 completed_at = now()
             WHERE status = 'running' AND started_at < $1
             RETURNING paper_id",
        )
        .bind(cutoff)
        .fetch_all(&mut *tx)
        .await
        .map_err(Error::Database)?;

        let paper_ids: Vec<String> = rows.into_iter().map(|r| r.get("paper_id")).collect();

        if !paper_ids.is_empty() {
            // A paper stuck in `processing` with no live job would otherwise
            // never become resubmittable. Completed rows are left alone.
            sqlx::query(
                "UPDATE paper SET state = 'failed', updated_at = now()
                 WHERE id = ANY($1) AND state = 'processing'",
            )
            .bind(&paper_ids)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;

        let reaped = paper_ids.len() as i64;
        if reaped > 0 {
            warn!(
                subsystem = "jobs",
                component = "queue",
                op = "reap_stale",
                reaped = reaped,
                "Reaped stale running jobs"
            );
        }
        Ok(reaped)
    }
}
