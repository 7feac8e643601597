//! # mend-db
//!
//! Document stores for the mend backfill engine.
//!
//! This crate provides:
//! - Connection pool management
//! - [`PgDocumentSource`]: collections stored as PostgreSQL JSONB rows
//! - [`MemoryDocumentSource`]: an in-process store with failure injection
//!
//! ## Example
//!
//! ```rust,ignore
//! use mend_db::{Database, PoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect_with_config("postgres://localhost/mend", PoolConfig::from_env()).await?;
//!     let n = db.documents.count("matches").await?;
//!     println!("{} matches", n);
//!     Ok(())
//! }
//! ```
pub mod documents;
pub mod memory;
pub mod pool;

// Test fixtures for integration tests
// Note: Always compiled so integration tests (in tests/) can use DEFAULT_TEST_DATABASE_URL
pub mod test_fixtures;

// Re-export core types
pub use mend_core::*;

pub use documents::PgDocumentSource;
pub use memory::{CommitRecord, MemoryDocumentSource};
pub use pool::{create_pool_with_config, log_pool_metrics, PoolConfig};

/// Combined database context.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// JSONB document collections.
    pub documents: PgDocumentSource,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            documents: PgDocumentSource::new(pool.clone()),
            pool,
        }
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
