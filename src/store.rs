//! SQLite-backed vector index.
//!
//! Records live in a single `records` table keyed by collection name, with
//! embeddings stored as little-endian f32 BLOBs. The collection's vector
//! dimension is established by the first upsert and enforced on every write
//! and query after that. Similarity search is exact: every record in the
//! collection is scored with cosine similarity and the top `k` returned.

use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{Error, Result};
use crate::models::{Chunk, IndexedRecord, RetrievalResult};

/// Stable record id for a chunk: hash of its source path and position.
fn chunk_id(source_path: &str, chunk_index: usize) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source_path.as_bytes());
    hasher.update(chunk_index.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

#[derive(Clone)]
pub struct VectorStore {
    pool: SqlitePool,
    collection: String,
}

impl VectorStore {
    /// Open a collection, creating the schema and the collection row if
    /// they do not exist yet.
    pub async fn open(pool: SqlitePool, collection: &str) -> Result<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS collections (
                name       TEXT PRIMARY KEY,
                dims       INTEGER,
                metric     TEXT NOT NULL,
                created_at INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS records (
                id            TEXT PRIMARY KEY,
                collection    TEXT NOT NULL,
                content       TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                embedding     BLOB NOT NULL,
                created_at    INTEGER NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_collection ON records(collection)")
            .execute(&pool)
            .await?;

        // dims stays NULL until the first upsert establishes it.
        sqlx::query(
            "INSERT OR IGNORE INTO collections (name, dims, metric, created_at)
             VALUES (?, NULL, 'cosine', ?)",
        )
        .bind(collection)
        .bind(chrono::Utc::now().timestamp())
        .execute(&pool)
        .await?;

        Ok(Self {
            pool,
            collection: collection.to_string(),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The collection's established vector dimension, or `None` if nothing
    /// has been indexed yet.
    pub async fn dims(&self) -> Result<Option<usize>> {
        let row = sqlx::query("SELECT dims FROM collections WHERE name = ?")
            .bind(&self.collection)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row
            .and_then(|r| r.get::<Option<i64>, _>("dims"))
            .map(|d| d as usize))
    }

    /// Insert or replace records. The first write to an empty collection
    /// establishes its dimension; after that any vector of a different
    /// length is rejected with [`Error::DimensionMismatch`] before any
    /// write happens.
    pub async fn upsert(&self, records: &[IndexedRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let dims = match self.dims().await? {
            Some(dims) => dims,
            None => {
                let dims = records[0].vector.len();
                sqlx::query("UPDATE collections SET dims = ? WHERE name = ?")
                    .bind(dims as i64)
                    .bind(&self.collection)
                    .execute(&self.pool)
                    .await?;
                dims
            }
        };

        for record in records {
            if record.vector.len() != dims {
                return Err(Error::DimensionMismatch {
                    expected: dims,
                    actual: record.vector.len(),
                });
            }
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "INSERT OR REPLACE INTO records
                 (id, collection, content, metadata_json, embedding, created_at)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&record.id)
            .bind(&self.collection)
            .bind(&record.content)
            .bind(record.metadata.to_string())
            .bind(vec_to_blob(&record.vector))
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(records.len() as u64)
    }

    /// Index chunks with their embeddings, pairing them positionally.
    /// Fails with [`Error::LengthMismatch`] if the slices differ in length.
    ///
    /// Record ids are derived from the source path and chunk position, so
    /// re-ingesting the same file replaces its records instead of
    /// duplicating them.
    pub async fn add_documents(
        &self,
        chunks: &[Chunk],
        embeddings: &[Vec<f32>],
    ) -> Result<u64> {
        if chunks.len() != embeddings.len() {
            return Err(Error::LengthMismatch {
                chunks: chunks.len(),
                embeddings: embeddings.len(),
            });
        }

        let records: Vec<IndexedRecord> = chunks
            .iter()
            .zip(embeddings.iter())
            .map(|(chunk, vector)| {
                Ok(IndexedRecord {
                    id: chunk_id(&chunk.metadata.source_path, chunk.metadata.chunk_index),
                    vector: vector.clone(),
                    content: chunk.content.clone(),
                    metadata: serde_json::to_value(&chunk.metadata)?,
                })
            })
            .collect::<Result<_>>()?;

        self.upsert(&records).await
    }

    /// Top-`k` records by cosine similarity to `query_vector`, descending.
    /// An empty collection returns an empty list; a query vector of the
    /// wrong dimension is [`Error::DimensionMismatch`].
    pub async fn query(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievalResult>> {
        let dims = match self.dims().await? {
            Some(dims) => dims,
            None => return Ok(Vec::new()),
        };

        if query_vector.len() != dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: query_vector.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT content, metadata_json, embedding FROM records WHERE collection = ?",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await?;

        let mut results: Vec<RetrievalResult> = rows
            .into_iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let metadata_json: String = row.get("metadata_json");
                let metadata =
                    serde_json::from_str(&metadata_json).unwrap_or(serde_json::Value::Null);
                RetrievalResult {
                    content: row.get("content"),
                    metadata,
                    relevance_score: cosine_similarity(query_vector, &blob_to_vec(&blob)),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);

        Ok(results)
    }

    /// Delete every record whose metadata field `key` equals `value`.
    /// Returns the number of records removed.
    pub async fn delete_by_metadata(&self, key: &str, value: &str) -> Result<u64> {
        let path = format!("$.{}", key);
        let result = sqlx::query(
            "DELETE FROM records
             WHERE collection = ? AND json_extract(metadata_json, ?) = ?",
        )
        .bind(&self.collection)
        .bind(&path)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    /// Remove every record, keeping the collection row (and its dims) so a
    /// re-ingest with the same model does not re-establish the dimension.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(&self.collection)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<u64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM records WHERE collection = ?")
            .bind(&self.collection)
            .fetch_one(&self.pool)
            .await?;

        Ok(row.get::<i64, _>("n") as u64)
    }
}
