//! Error taxonomy shared across the ingestion and query pipelines.
//!
//! Per-file extraction failures during ingestion are recovered locally
//! (logged and skipped); everything else aborts the current pipeline run
//! and propagates to the caller unmodified.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Text submitted for embedding was empty after normalization.
    #[error("text is empty after normalization")]
    EmptyInput,

    /// File extension is not one of the supported document formats.
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),

    /// Ingestion source directory does not exist.
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// A vector's dimension does not match the collection's established
    /// dimension. Mixing dimensions in one collection corrupts search.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Chunk and embedding sequences passed to the store differ in length.
    #[error("length mismatch: {chunks} chunks vs {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },

    /// Extraction failed for a single file (corrupt PDF, bad encoding).
    /// The ingestion pipeline catches this per file and continues.
    #[error("extraction failed for {path}: {reason}")]
    Extraction { path: PathBuf, reason: String },

    /// A remote provider call exceeded its configured timeout.
    #[error("provider request timed out after {0:?}")]
    ProviderTimeout(Duration),

    /// A remote provider (embedding or index) failed after retries.
    #[error("provider error: {0}")]
    Provider(String),

    /// Answer synthesis failed after retries.
    #[error("generation failed: {0}")]
    GenerationFailed(String),

    /// A user id that cannot name a conversation file.
    #[error("invalid user id: {0:?}")]
    InvalidUserId(String),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
