//! Chat completion providers for answer synthesis.
//!
//! Mirrors the embedding layer: a [`Generator`] trait with OpenAI and
//! Ollama implementations sharing the retry/backoff plumbing. Provider
//! failures that survive the retries surface as
//! [`Error::GenerationFailed`]; timeouts stay distinguishable as
//! [`Error::ProviderTimeout`].

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::embedding::post_json_with_retry;
use crate::error::{Error, Result};

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";
const OLLAMA_DEFAULT_URL: &str = "http://localhost:11434";

/// Synthesizes an answer from a system instruction and a user prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Create the configured generator.
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn Generator>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAiGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => Err(Error::GenerationFailed(format!(
            "unknown generation provider: {}",
            other
        ))),
    }
}

fn build_client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::GenerationFailed(e.to_string()))
}

/// Provider errors become [`Error::GenerationFailed`]; timeouts pass
/// through so callers can tell a stalled provider from a broken one.
fn map_provider_error(e: Error) -> Error {
    match e {
        Error::Provider(message) => Error::GenerationFailed(message),
        other => other,
    }
}

/// Chat completion via the OpenAI API (`POST /v1/chat/completions`).
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiGenerator {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            Error::GenerationFailed("OPENAI_API_KEY environment variable not set".into())
        })?;

        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| OPENAI_CHAT_URL.to_string()),
            api_key,
            client: build_client(config.timeout_secs)?,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let json = post_json_with_retry(
            &self.client,
            &self.url,
            Some(&self.api_key),
            &body,
            self.max_retries,
            self.timeout_secs,
        )
        .await
        .map_err(map_provider_error)?;

        json.pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::GenerationFailed("invalid response: missing message content".to_string())
            })
    }
}

/// Chat completion via a local Ollama instance (`POST /api/chat`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    client: reqwest::Client,
    temperature: f32,
    max_tokens: u32,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let base = config
            .url
            .clone()
            .unwrap_or_else(|| OLLAMA_DEFAULT_URL.to_string());

        Ok(Self {
            model: config.model.clone(),
            url: format!("{}/api/chat", base.trim_end_matches('/')),
            client: build_client(config.timeout_secs)?,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "stream": false,
            "options": {
                "temperature": self.temperature,
                "num_predict": self.max_tokens,
            },
        });

        let json = post_json_with_retry(
            &self.client,
            &self.url,
            None,
            &body,
            self.max_retries,
            self.timeout_secs,
        )
        .await
        .map_err(map_provider_error)?;

        json.pointer("/message/content")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                Error::GenerationFailed("invalid response: missing message content".to_string())
            })
    }
}
