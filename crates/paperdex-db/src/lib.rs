//! # paperdex-db
//!
//! PostgreSQL store layer for paperdex.
//!
//! This crate provides:
//! - Connection pool management
//! - The relational paper repository (structured extracted fields + state)
//! - The pgvector-backed vector index
//! - The ingestion job queue with SKIP LOCKED claiming
//!
//! The paper table and the vector table share identifiers but carry no
//! foreign key between them; the ingestion pipeline owns their consistency.
//!
//! ## Example
//!
//! ```rust,ignore
//! use paperdex_db::Database;
//! use paperdex_core::PaperRepository;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/paperdex").await?;
//!     db.papers.ensure_pending("2403.01234").await?;
//!     let job_id = db.jobs.enqueue("2403.01234").await?;
//!     println!("queued: {}", job_id);
//!     Ok(())
//! }
//! ```

pub mod jobs;
pub mod papers;
pub mod pool;
pub mod vectors;

// Re-export core types
pub use paperdex_core::*;

pub use jobs::PgIngestQueue;
pub use papers::PgPaperRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};
pub use vectors::PgVectorIndex;

/// Bundle of store handles sharing one connection pool.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Relational paper repository.
    pub papers: PgPaperRepository,
    /// Vector index over paper embeddings.
    pub vectors: PgVectorIndex,
    /// Ingestion job queue.
    pub jobs: PgIngestQueue,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Connect with a custom pool configuration.
    pub async fn connect_with_config(database_url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(database_url, config).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build store handles over an existing pool.
    pub fn from_pool(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            papers: PgPaperRepository::new(pool.clone()),
            vectors: PgVectorIndex::new(pool.clone()),
            jobs: PgIngestQueue::new(pool.clone()),
            pool,
        }
    }

    /// Run pending schema migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(e.into()))?;
        Ok(())
    }
}

