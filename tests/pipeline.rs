//! End-to-end pipeline tests over a temporary SQLite database, using
//! deterministic in-process embedding and generation so no network or
//! provider credentials are needed.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use docquery::config::{DbConfig, MemoryConfig};
use docquery::db;
use docquery::embedding::{normalize, Embedder};
use docquery::error::{Error, Result};
use docquery::generation::Generator;
use docquery::ingest::IngestionPipeline;
use docquery::memory::ConversationStore;
use docquery::models::IndexedRecord;
use docquery::query::QueryPipeline;
use docquery::store::VectorStore;

const DIMS: usize = 8;

/// Deterministic embedder: buckets byte values into a fixed-size frequency
/// histogram, so similar texts get similar vectors and the same text always
/// gets the same vector.
struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        texts
            .iter()
            .map(|text| {
                let cleaned = normalize(text);
                if cleaned.is_empty() {
                    return Err(Error::EmptyInput);
                }
                let mut vector = vec![0.0f32; DIMS];
                for byte in cleaned.bytes() {
                    vector[(byte as usize) % DIMS] += 1.0;
                }
                Ok(vector)
            })
            .collect()
    }
}

/// Generator that records every prompt it sees and echoes a canned answer.
struct RecordingGenerator {
    prompts: Arc<Mutex<Vec<String>>>,
}

impl RecordingGenerator {
    fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let prompts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                prompts: prompts.clone(),
            },
            prompts,
        )
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording-test"
    }

    async fn complete(&self, _system: &str, user: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(user.to_string());
        Ok(format!("answer #{}", self.prompts.lock().unwrap().len()))
    }
}

async fn open_store(tmp: &TempDir) -> VectorStore {
    let pool = db::connect(&DbConfig {
        path: tmp.path().join("index.sqlite"),
        collection: "rag_documents".to_string(),
    })
    .await
    .unwrap();
    VectorStore::open(pool, "rag_documents").await.unwrap()
}

async fn open_memory(tmp: &TempDir, max_history: usize) -> Arc<ConversationStore> {
    Arc::new(
        ConversationStore::open(&MemoryConfig {
            path: tmp.path().join("conversations"),
            max_history,
            context_turns: 3,
        })
        .await
        .unwrap(),
    )
}

fn query_pipeline(
    store: VectorStore,
    memory: Arc<ConversationStore>,
) -> (QueryPipeline, Arc<Mutex<Vec<String>>>) {
    let (generator, prompts) = RecordingGenerator::new();
    let pipeline = QueryPipeline::new(
        Arc::new(HashEmbedder),
        store,
        memory,
        Box::new(generator),
        3,
    );
    (pipeline, prompts)
}

#[tokio::test]
async fn ingest_chunks_and_indexes_documents() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("rust.txt"),
        "Rust is fast. Rust is safe. Rust is productive.",
    )
    .unwrap();

    let store = open_store(&tmp).await;
    let pipeline = IngestionPipeline::new(Arc::new(HashEmbedder), store.clone(), 40, 10, 16);

    let indexed = pipeline.run(&docs).await.unwrap();
    assert!(indexed >= 2, "expected the text to split into >= 2 chunks");
    assert_eq!(store.count().await.unwrap(), indexed as u64);
    assert_eq!(store.dims().await.unwrap(), Some(DIMS));
}

#[tokio::test]
async fn reingesting_the_same_directory_does_not_duplicate() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("a.txt"), "stable content").unwrap();

    let store = open_store(&tmp).await;
    let pipeline = IngestionPipeline::new(Arc::new(HashEmbedder), store.clone(), 1000, 200, 16);

    pipeline.run(&docs).await.unwrap();
    let first = store.count().await.unwrap();
    pipeline.run(&docs).await.unwrap();
    assert_eq!(store.count().await.unwrap(), first);
}

#[tokio::test]
async fn ingest_of_empty_directory_is_a_noop() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("empty");
    std::fs::create_dir_all(&docs).unwrap();

    let store = open_store(&tmp).await;
    let pipeline = IngestionPipeline::new(Arc::new(HashEmbedder), store.clone(), 1000, 200, 16);

    assert_eq!(pipeline.run(&docs).await.unwrap(), 0);
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.dims().await.unwrap(), None);
}

#[tokio::test]
async fn ingest_missing_directory_fails() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let pipeline = IngestionPipeline::new(Arc::new(HashEmbedder), store, 1000, 200, 16);

    let err = pipeline
        .run(&PathBuf::from(tmp.path().join("nope")))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DirectoryNotFound(_)));
}

#[tokio::test]
async fn query_returns_descending_scores_bounded_by_k() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    for i in 0..4 {
        std::fs::write(
            docs.join(format!("doc{}.txt", i)),
            format!("Document number {} talks about topic {}.", i, i),
        )
        .unwrap();
    }

    let store = open_store(&tmp).await;
    IngestionPipeline::new(Arc::new(HashEmbedder), store.clone(), 1000, 200, 16)
        .run(&docs)
        .await
        .unwrap();

    let embedder = HashEmbedder;
    let vector = embedder.embed("Document number 2").await.unwrap();
    let results = store.query(&vector, 2).await.unwrap();
    assert_eq!(results.len(), 2);
    assert!(results[0].relevance_score >= results[1].relevance_score);
}

#[tokio::test]
async fn query_rejects_wrong_dimension() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&[IndexedRecord {
            id: "a".to_string(),
            vector: vec![1.0; DIMS],
            content: "x".to_string(),
            metadata: serde_json::json!({}),
        }])
        .await
        .unwrap();

    let err = store.query(&vec![1.0; DIMS + 1], 5).await.unwrap_err();
    assert!(matches!(
        err,
        Error::DimensionMismatch {
            expected: DIMS,
            actual
        } if actual == DIMS + 1
    ));
}

#[tokio::test]
async fn upsert_rejects_mixed_dimensions() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&[IndexedRecord {
            id: "a".to_string(),
            vector: vec![1.0; DIMS],
            content: "x".to_string(),
            metadata: serde_json::json!({}),
        }])
        .await
        .unwrap();

    let err = store
        .upsert(&[IndexedRecord {
            id: "b".to_string(),
            vector: vec![1.0; DIMS - 2],
            content: "y".to_string(),
            metadata: serde_json::json!({}),
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { .. }));
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn delete_by_source_path_removes_only_that_file() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("keep.txt"), "keep this document").unwrap();
    std::fs::write(docs.join("drop.txt"), "drop this document").unwrap();

    let store = open_store(&tmp).await;
    IngestionPipeline::new(Arc::new(HashEmbedder), store.clone(), 1000, 200, 16)
        .run(&docs)
        .await
        .unwrap();
    assert_eq!(store.count().await.unwrap(), 2);

    let drop_path = docs.join("drop.txt").display().to_string();
    let removed = store
        .delete_by_metadata("source_path", &drop_path)
        .await
        .unwrap();
    assert_eq!(removed, 1);
    assert_eq!(store.count().await.unwrap(), 1);
}

#[tokio::test]
async fn clear_empties_index_but_keeps_dimension() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;

    store
        .upsert(&[IndexedRecord {
            id: "a".to_string(),
            vector: vec![1.0; DIMS],
            content: "x".to_string(),
            metadata: serde_json::json!({}),
        }])
        .await
        .unwrap();

    assert_eq!(store.clear().await.unwrap(), 1);
    assert_eq!(store.count().await.unwrap(), 0);
    assert_eq!(store.dims().await.unwrap(), Some(DIMS));
}

#[tokio::test]
async fn ask_with_empty_index_still_answers() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let memory = open_memory(&tmp, 10).await;
    let (pipeline, prompts) = query_pipeline(store, memory);

    let outcome = pipeline.answer("alice", "What is Rust?", 5).await.unwrap();
    assert!(outcome.retrieved.is_empty());
    assert_eq!(outcome.answer, "answer #1");

    let prompts = prompts.lock().unwrap();
    assert!(prompts[0].contains("No relevant context was found in the knowledge base."));
    assert!(prompts[0].contains("Current question: What is Rust?"));
}

#[tokio::test]
async fn ask_rejects_blank_questions() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let memory = open_memory(&tmp, 10).await;
    let (pipeline, prompts) = query_pipeline(store, memory);

    let err = pipeline.answer("alice", "   \n ", 5).await.unwrap_err();
    assert!(matches!(err, Error::EmptyInput));
    assert!(prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn follow_up_question_sees_previous_exchange() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let memory = open_memory(&tmp, 10).await;
    let (pipeline, prompts) = query_pipeline(store, memory.clone());

    pipeline
        .answer("bob", "What is ownership?", 5)
        .await
        .unwrap();
    pipeline.answer("bob", "And borrowing?", 5).await.unwrap();

    let prompts = prompts.lock().unwrap();
    assert!(!prompts[0].contains("Previous conversation:"));
    assert!(prompts[1].contains("Previous conversation:"));
    assert!(prompts[1].contains("User: What is ownership?"));
    assert!(prompts[1].contains("Assistant: answer #1"));

    let record = memory.get("bob").await.unwrap();
    assert_eq!(record.messages.len(), 2);
}

#[tokio::test]
async fn ask_retrieves_relevant_chunks_into_the_prompt() {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("ownership.md"), "Ownership moves values.").unwrap();

    let store = open_store(&tmp).await;
    IngestionPipeline::new(Arc::new(HashEmbedder), store.clone(), 1000, 200, 16)
        .run(&docs)
        .await
        .unwrap();

    let memory = open_memory(&tmp, 10).await;
    let (pipeline, prompts) = query_pipeline(store, memory);

    let outcome = pipeline
        .answer("carol", "Ownership moves values.", 3)
        .await
        .unwrap();
    assert_eq!(outcome.retrieved.len(), 1);
    assert!(outcome.retrieved[0].relevance_score > 0.99);

    let prompts = prompts.lock().unwrap();
    assert!(prompts[0].contains("[Document 1] (Source: ownership.md"));
    assert!(prompts[0].contains("Ownership moves values."));
}

#[tokio::test]
async fn memory_is_bounded_across_many_questions() {
    let tmp = TempDir::new().unwrap();
    let store = open_store(&tmp).await;
    let memory = open_memory(&tmp, 10).await;
    let (pipeline, _prompts) = query_pipeline(store, memory.clone());

    for i in 0..15 {
        pipeline
            .answer("dave", &format!("question {}", i), 5)
            .await
            .unwrap();
    }

    let record = memory.get("dave").await.unwrap();
    assert_eq!(record.messages.len(), 10);
    assert_eq!(record.messages.front().unwrap().user, "question 5");
}
