//! Core data models used throughout docquery.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the ingestion and query pipelines, plus the per-user
//! conversation records held by the memory store.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document loaded from disk, before chunking.
#[derive(Debug, Clone)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

/// Source metadata attached to a loaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_path: String,
    pub filename: String,
    pub file_type: String,
}

/// A bounded-length window of a document's text, the atomic unit of indexing.
/// Immutable after creation.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// Parent document metadata plus the chunk's position within it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source_path: String,
    pub filename: String,
    pub file_type: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
}

/// A record stored in the vector index: embedding vector plus the chunk
/// text and metadata it was derived from. All records in one collection
/// share the same vector dimension.
#[derive(Debug, Clone)]
pub struct IndexedRecord {
    pub id: String,
    pub vector: Vec<f32>,
    pub content: String,
    pub metadata: serde_json::Value,
}

/// One ranked match returned by a similarity query. Ephemeral; produced
/// per query and never persisted.
///
/// `relevance_score` is the cosine similarity between the query vector and
/// the stored vector, in `[-1.0, 1.0]` (equivalently `1 - cosine distance`).
/// Higher means more semantically similar. The value is only meaningful for
/// the cosine metric the collection was created with.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub content: String,
    pub metadata: serde_json::Value,
    pub relevance_score: f32,
}

/// One question/answer turn in a user's conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Interaction {
    pub timestamp: DateTime<Utc>,
    pub user: String,
    pub assistant: String,
    pub retrieved_docs: usize,
}

/// A user's conversation history. `messages` never exceeds the store's
/// configured `max_history`; the oldest interactions are evicted first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRecord {
    pub user_id: String,
    pub messages: VecDeque<Interaction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationRecord {
    /// An empty record for a user with no stored history.
    pub fn empty(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            messages: VecDeque::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
