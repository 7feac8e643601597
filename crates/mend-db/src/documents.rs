//! PostgreSQL document source: collections stored as JSONB rows.

use std::time::Instant;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde_json::Value;
use sqlx::{postgres::PgRow, Pool, Postgres, Row};
use tracing::{debug, info};

use mend_core::{Batch, Document, DocumentSource, Error, Result};

/// PostgreSQL implementation of [`DocumentSource`].
///
/// Each document is one row of the `document` table keyed by
/// `(collection, id)`; its fields live in a JSONB object. Patches are
/// applied with the JSONB `||` operator, which merges top-level keys and
/// leaves every other key in place.
#[derive(Clone)]
pub struct PgDocumentSource {
    pool: Pool<Postgres>,
}

impl PgDocumentSource {
    /// Create a new PgDocumentSource with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Insert a document, replacing any existing one with the same id.
    pub async fn upsert(&self, collection: &str, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO document (collection, id, fields)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id)
            DO UPDATE SET fields = EXCLUDED.fields, updated_at = now()
            "#,
        )
        .bind(collection)
        .bind(&doc.id)
        .bind(Value::Object(doc.fields.clone()))
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    /// Fetch one document by id.
    pub async fn fetch(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        let row = sqlx::query("SELECT id, fields FROM document WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(row_to_document).transpose()
    }

    /// Number of documents in a collection.
    pub async fn count(&self, collection: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM document WHERE collection = $1")
            .bind(collection)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    /// Delete every document of a collection, returning how many were removed.
    pub async fn delete_collection(&self, collection: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM document WHERE collection = $1")
            .bind(collection)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected())
    }
}

fn row_to_document(row: PgRow) -> Result<Document> {
    let id: String = row.try_get("id").map_err(Error::Database)?;
    let fields: Value = row.try_get("fields").map_err(Error::Database)?;
    Document::from_value(id, fields)
}

#[async_trait]
impl DocumentSource for PgDocumentSource {
    fn scan_collection<'a>(&'a self, collection: &'a str) -> BoxStream<'a, Result<Document>> {
        debug!(
            subsystem = "db",
            component = "pg_source",
            op = "scan",
            collection,
            "Streaming collection"
        );

        sqlx::query("SELECT id, fields FROM document WHERE collection = $1")
            .bind(collection)
            .fetch(&self.pool)
            .map(|row| row.map_err(Error::Database).and_then(row_to_document))
            .boxed()
    }

    async fn commit_batch(&self, collection: &str, batch: &Batch) -> Result<()> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for entry in &batch.entries {
            let result = sqlx::query(
                r#"
                UPDATE document
                SET fields = fields || $3::jsonb, updated_at = now()
                WHERE collection = $1 AND id = $2
                "#,
            )
            .bind(collection)
            .bind(&entry.id)
            .bind(entry.patch.to_value())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            // Dropping the transaction rolls back the entries already applied.
            if result.rows_affected() == 0 {
                return Err(Error::DocumentNotFound(entry.id.clone()));
            }
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            subsystem = "db",
            component = "pg_source",
            op = "commit",
            collection,
            batch_index = batch.index,
            batch_size = batch.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Batch committed"
        );
        Ok(())
    }
}
