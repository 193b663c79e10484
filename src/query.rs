//! Query pipeline: embed -> retrieve -> assemble -> generate -> remember.
//!
//! Each question is embedded, matched against the vector index, and turned
//! into a prompt that carries the retrieved passages plus the user's recent
//! conversation turns. The provider's answer is appended to the user's
//! memory before it is returned, so the next question sees this exchange.

use std::sync::Arc;

use tracing::debug;

use crate::embedding::Embedder;
use crate::error::{Error, Result};
use crate::generation::Generator;
use crate::memory::ConversationStore;
use crate::models::RetrievalResult;
use crate::store::VectorStore;

/// System instruction sent with every completion request.
pub const SYSTEM_PROMPT: &str = "\
You are a helpful AI assistant with access to a knowledge base. \
Your task is to answer questions based on the provided context.

Guidelines:
1. Base your answers primarily on the provided context
2. If the context doesn't contain relevant information, say so clearly
3. Be concise but thorough
4. Cite the source documents when possible
5. If asked about previous conversation, refer to the chat history
6. Maintain a professional and friendly tone";

/// An answered question plus the passages that informed it.
#[derive(Debug)]
pub struct QueryOutcome {
    pub answer: String,
    pub retrieved: Vec<RetrievalResult>,
}

pub struct QueryPipeline {
    embedder: Arc<dyn Embedder>,
    store: VectorStore,
    memory: Arc<ConversationStore>,
    generator: Box<dyn Generator>,
    context_turns: usize,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: VectorStore,
        memory: Arc<ConversationStore>,
        generator: Box<dyn Generator>,
        context_turns: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            memory,
            generator,
            context_turns,
        }
    }

    /// Answer `query` for `user_id`, retrieving up to `top_k` passages.
    /// A blank query is rejected before any provider call.
    pub async fn answer(&self, user_id: &str, query: &str, top_k: usize) -> Result<QueryOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::EmptyInput);
        }

        let (query_vector, history) = tokio::join!(
            self.embedder.embed(query),
            self.memory.recent_context(user_id, self.context_turns),
        );
        let query_vector = query_vector?;
        let history = history?;

        let retrieved = self.store.query(&query_vector, top_k).await?;
        debug!(
            retrieved = retrieved.len(),
            top = retrieved.first().map(|r| r.relevance_score as f64),
            "similarity search complete"
        );

        let context = build_context(&retrieved);
        let prompt = build_user_prompt(&history, &context, query);

        let answer = self.generator.complete(SYSTEM_PROMPT, &prompt).await?;

        self.memory
            .append(user_id, query, &answer, retrieved.len())
            .await?;

        Ok(QueryOutcome { answer, retrieved })
    }
}

/// Render retrieved passages as a numbered context block, or a sentinel
/// line when nothing matched.
pub fn build_context(results: &[RetrievalResult]) -> String {
    if results.is_empty() {
        return "No relevant context was found in the knowledge base.".to_string();
    }

    let mut out = String::new();
    for (i, result) in results.iter().enumerate() {
        let source = result
            .metadata
            .get("filename")
            .and_then(|v| v.as_str())
            .unwrap_or("unknown");
        out.push_str(&format!(
            "[Document {}] (Source: {}, Relevance: {:.2})\n{}\n\n",
            i + 1,
            source,
            result.relevance_score,
            result.content
        ));
    }
    out.trim_end().to_string()
}

/// Assemble the user message: recent history, retrieved context, then the
/// current question.
pub fn build_user_prompt(history: &str, context: &str, query: &str) -> String {
    let mut prompt = String::new();
    if !history.is_empty() {
        prompt.push_str(history);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "Context from knowledge base:\n{}\n\nCurrent question: {}\n\n\
         Please provide a helpful answer based on the context above.",
        context, query
    ));
    prompt
}
