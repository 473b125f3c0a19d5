//! Chunk embeddings in the `Vectors` table (pgvector)

use async_trait::async_trait;
use pgvector::Vector;
use serde::{Deserialize, Serialize};

use super::Database;
use crate::error::{Error, Result, StatusCode};
use crate::utils::clean_table_text;

/// One chunk ready for insertion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorRecord {
    pub chunk_id: String,
    pub filename: String,
    pub chunk: String,
    pub embedding: Vec<f32>,
}

/// One chunk returned by a similarity search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub filename: String,
    pub chunk: String,
}

/// Nearest-neighbour index over chunk embeddings
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Drop and recreate the index for `dimension`-sized embeddings
    async fn reset(&self, dimension: usize) -> Result<()>;

    /// Insert one chunk
    async fn insert(&self, record: &VectorRecord) -> Result<()>;

    /// Up to `k` chunks ordered by cosine distance to `embedding`
    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>>;
}

/// `VectorIndex` on PostgreSQL with the pgvector extension
#[derive(Debug, Clone)]
pub struct PgVectorIndex {
    db: Database,
}

impl PgVectorIndex {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn reset(&self, dimension: usize) -> Result<()> {
        tracing::debug!("Initializing vector table");

        let steps = [
            (
                StatusCode::VECTOR_DROP,
                "DROP TABLE IF EXISTS Vectors CASCADE".to_string(),
                "Error while dropping vector table",
            ),
            (
                StatusCode::VECTOR_EXTENSION,
                "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
                "Failure at creating vector extension",
            ),
            (
                StatusCode::VECTOR_CREATE,
                format!(
                    "CREATE TABLE Vectors (
                        chunk_id    VARCHAR(100) PRIMARY KEY,
                        filename    TEXT,
                        chunk       TEXT,
                        embedding   vector({dimension})
                    )"
                ),
                "Error while creating vector table",
            ),
        ];

        for (code, sql, message) in steps {
            let client = self.db.client(code).await?;
            client
                .batch_execute(&sql)
                .await
                .map_err(|e| Error::database_with_source(code, message, e))?;
        }

        Ok(())
    }

    async fn insert(&self, record: &VectorRecord) -> Result<()> {
        let client = self.db.client(StatusCode::VECTOR_INSERT).await?;
        let chunk = clean_table_text(&record.chunk);
        let embedding = Vector::from(record.embedding.clone());

        client
            .execute(
                "INSERT INTO Vectors (chunk_id, filename, chunk, embedding) VALUES ($1, $2, $3, $4)",
                &[&record.chunk_id, &record.filename, &chunk, &embedding],
            )
            .await
            .map_err(|e| {
                Error::database_with_source(
                    StatusCode::VECTOR_INSERT,
                    "Error while inserting in vector table",
                    e,
                )
            })?;

        tracing::debug!(chunk_id = %record.chunk_id, "Inserted chunk embedding");
        Ok(())
    }

    async fn nearest(&self, embedding: &[f32], k: usize) -> Result<Vec<RetrievedChunk>> {
        let client = self.db.client(StatusCode::UNKNOWN).await?;
        let query = Vector::from(embedding.to_vec());
        let limit = i64::try_from(k).unwrap_or(i64::MAX);

        let rows = client
            .query(
                "SELECT chunk_id, filename, chunk FROM Vectors ORDER BY embedding <=> $1 LIMIT $2",
                &[&query, &limit],
            )
            .await
            .map_err(|e| {
                Error::database_with_source(StatusCode::UNKNOWN, "Cosine vector search failed", e)
            })?;

        Ok(rows
            .iter()
            .map(|row| RetrievedChunk {
                chunk_id: row.get(0),
                filename: row.get::<_, Option<String>>(1).unwrap_or_default(),
                chunk: row.get::<_, Option<String>>(2).unwrap_or_default(),
            })
            .collect())
    }
}
