//! Embedding provider abstraction and implementations.
//!
//! Defines the [`Embedder`] trait and two HTTP-backed implementations:
//! - **[`OpenAiEmbedder`]** — calls the OpenAI embeddings API.
//! - **[`OllamaEmbedder`]** — calls a local Ollama instance's `/api/embed`.
//!
//! Both providers normalize input (newlines collapsed to spaces, trimmed),
//! reject empty texts, and wrap every request in bounded exponential
//! backoff: HTTP 429 and 5xx retry, other 4xx fail immediately, network
//! errors retry, and an elapsed timeout surfaces as
//! [`Error::ProviderTimeout`].
//!
//! Also provides vector utilities shared with the store:
//! [`cosine_similarity`], [`vec_to_blob`], and [`blob_to_vec`].

use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::{Error, Result};

const OPENAI_EMBED_URL: &str = "https://api.openai.com/v1/embeddings";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Maps text to fixed-dimension vectors. All vectors produced by one
/// embedder share dimension [`dims`](Embedder::dims); callers must not mix
/// vectors from different models in one collection.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;

    /// Embed a batch of texts, order-preserving: `embed_batch(texts)[i]`
    /// corresponds to `texts[i]`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::Provider("empty embedding response".to_string()))
    }
}

/// Collapse newlines to spaces and trim, matching what embedding models
/// are trained on.
pub fn normalize(text: &str) -> String {
    text.replace(['\n', '\r'], " ").trim().to_string()
}

/// Normalize a batch, failing with [`Error::EmptyInput`] if any text is
/// empty after normalization.
fn normalize_batch(texts: &[String]) -> Result<Vec<String>> {
    texts
        .iter()
        .map(|t| {
            let cleaned = normalize(t);
            if cleaned.is_empty() {
                Err(Error::EmptyInput)
            } else {
                Ok(cleaned)
            }
        })
        .collect()
}

/// Create the configured embedder.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiEmbedder::new(config)?)),
        "ollama" => Ok(Box::new(OllamaEmbedder::new(config)?)),
        other => Err(Error::Provider(format!(
            "unknown embedding provider: {}",
            other
        ))),
    }
}

// ============ Shared HTTP plumbing ============

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::Provider(e.to_string()))
}

/// POST a JSON body with bounded exponential backoff (1s, 2s, 4s, ...
/// capped at 32s). Retries 429, 5xx, and network errors; fails fast on
/// other client errors. A request that times out on the final attempt
/// surfaces as [`Error::ProviderTimeout`].
pub(crate) async fn post_json_with_retry(
    client: &reqwest::Client,
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    timeout_secs: u64,
) -> Result<serde_json::Value> {
    let mut last_err: Option<Error> = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|e| Error::Provider(e.to_string()));
                }

                let body_text = response.text().await.unwrap_or_default();
                let message = format!("{} returned {}: {}", url, status, body_text);

                // Rate limited or server error: retry.
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(Error::Provider(message));
                    continue;
                }

                return Err(Error::Provider(message));
            }
            Err(e) if e.is_timeout() => {
                last_err = Some(Error::ProviderTimeout(Duration::from_secs(timeout_secs)));
                continue;
            }
            Err(e) => {
                last_err = Some(Error::Provider(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| Error::Provider("request failed after retries".to_string())))
}

// ============ OpenAI ============

/// Embedding provider using the OpenAI API (`POST /v1/embeddings`).
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| Error::Provider("OPENAI_API_KEY environment variable not set".into()))?;

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_EMBED_URL.to_string()),
            api_key,
            client: build_client(config.timeout_secs)?,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cleaned = normalize_batch(texts)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": cleaned,
        });

        let json = post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            self.timeout_secs,
        )
        .await?;

        parse_openai_embeddings(&json, texts.len())
    }
}

/// Extract `data[].embedding` arrays in input order.
fn parse_openai_embeddings(json: &serde_json::Value, expected: usize) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Provider("invalid response: missing data array".to_string()))?;

    if data.len() != expected {
        return Err(Error::Provider(format!(
            "invalid response: expected {} embeddings, got {}",
            expected,
            data.len()
        )));
    }

    let mut embeddings = vec![Vec::new(); expected];
    for (i, item) in data.iter().enumerate() {
        let index = item.get("index").and_then(|v| v.as_u64()).unwrap_or(i as u64) as usize;
        let vector: Vec<f32> = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| Error::Provider("invalid response: missing embedding".to_string()))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        if index >= expected {
            return Err(Error::Provider(format!(
                "invalid response: embedding index {} out of range",
                index
            )));
        }
        embeddings[index] = vector;
    }

    Ok(embeddings)
}

// ============ Ollama ============

/// Embedding provider using a local Ollama instance (`POST /api/embed`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    client: reqwest::Client,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model: config.model.clone(),
            dims: config.dims,
            url: format!("{}/api/embed", base.trim_end_matches('/')),
            client: build_client(config.timeout_secs)?,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let cleaned = normalize_batch(texts)?;
        let body = serde_json::json!({
            "model": self.model,
            "input": cleaned,
        });

        let json = post_json_with_retry(
            &self.client,
            &self.url,
            None,
            &body,
            self.max_retries,
            self.timeout_secs,
        )
        .await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                Error::Provider("invalid response: missing embeddings array".to_string())
            })?;

        embeddings
            .iter()
            .map(|embedding| {
                embedding
                    .as_array()
                    .ok_or_else(|| {
                        Error::Provider("invalid response: embedding is not an array".to_string())
                    })
                    .map(|values| values.iter().map(|v| v.as_f64().unwrap_or(0.0) as f32).collect())
            })
            .collect()
    }
}

// ============ Vector utilities ============

/// Encode a float vector as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB produced by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors, in `[-1.0, 1.0]`. Returns `0.0`
/// for empty vectors or vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_newlines_and_trims() {
        assert_eq!(normalize("  a\nb\r\nc  "), "a b  c");
        assert_eq!(normalize("\n\n"), "");
        assert_eq!(normalize("plain"), "plain");
    }

    #[test]
    fn normalize_batch_rejects_blank_texts() {
        let texts = vec!["fine".to_string(), "\n \n".to_string()];
        assert!(matches!(
            normalize_batch(&texts).unwrap_err(),
            Error::EmptyInput
        ));
    }

    #[test]
    fn parse_openai_embeddings_preserves_input_order() {
        // Response data deliberately out of order; `index` restores it.
        let json = serde_json::json!({
            "data": [
                { "index": 1, "embedding": [3.0, 4.0] },
                { "index": 0, "embedding": [1.0, 2.0] },
            ]
        });
        let vectors = parse_openai_embeddings(&json, 2).unwrap();
        assert_eq!(vectors[0], vec![1.0, 2.0]);
        assert_eq!(vectors[1], vec![3.0, 4.0]);
    }

    #[test]
    fn parse_openai_embeddings_rejects_wrong_count() {
        let json = serde_json::json!({ "data": [ { "index": 0, "embedding": [1.0] } ] });
        assert!(parse_openai_embeddings(&json, 2).is_err());
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_similarity(&a, &b) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_mismatched_lengths_is_zero() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }
}
