//! Ingestion pipeline: load -> chunk -> embed -> store.
//!
//! Per-file extraction failures are logged and skipped inside
//! [`extract::load_documents`]; embedding and storage failures abort the
//! run and propagate. An empty source directory is a successful no-op that
//! touches neither the provider nor the store.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::chunk::chunk_documents;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::extract::load_documents;
use crate::store::VectorStore;

pub struct IngestionPipeline {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    chunk_size: usize,
    chunk_overlap: usize,
    batch_size: usize,
}

impl IngestionPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        chunk_size: usize,
        chunk_overlap: usize,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            chunk_size,
            chunk_overlap,
            batch_size,
        }
    }

    /// Ingest every supported document under `directory`. Returns the
    /// number of chunks indexed.
    pub async fn run(&self, directory: &Path) -> Result<usize> {
        let documents = load_documents(directory)?;
        if documents.is_empty() {
            info!(directory = %directory.display(), "no documents to ingest");
            return Ok(0);
        }
        info!(documents = documents.len(), "loaded documents");

        let chunks = chunk_documents(&documents, self.chunk_size, self.chunk_overlap);
        if chunks.is_empty() {
            return Ok(0);
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            embeddings.extend(vectors);
        }
        info!(
            embeddings = embeddings.len(),
            model = self.embedder.model_name(),
            "embedded chunks"
        );

        // Drop any previous records for these files first, so a file that
        // shrank does not leave stale chunks behind.
        let mut sources: Vec<&str> = chunks.iter().map(|c| c.metadata.source_path.as_str()).collect();
        sources.sort_unstable();
        sources.dedup();
        for source in sources {
            self.store.delete_by_metadata("source_path", source).await?;
        }

        let stored = self.store.add_documents(&chunks, &embeddings).await?;
        info!(stored, collection = self.store.collection(), "indexed chunks");

        Ok(stored as usize)
    }
}
