// file: src/knowledge/embeddings.rs
// description: OpenAI-compatible embeddings endpoint client with deterministic fallback
// reference: https://github.com/ollama/ollama/blob/main/docs/openai.md

use crate::config::KnowledgeConfig;
use crate::error::{DocsKbError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    input: Vec<&'a str>,
    model: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

pub struct EmbeddingClient {
    client: Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
}

impl EmbeddingClient {
    pub fn new(config: &KnowledgeConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DocsKbError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: config.embedding_url.clone(),
            model: config.embedding_model.clone(),
            api_key: config.embedding_api_key.clone(),
            dim: config.embedding_dim,
        })
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let request = EmbeddingRequest {
            input: vec![text],
            model: &self.model,
        };

        debug!("Requesting embedding from {} for {} chars", self.url, text.len());

        let mut builder = self.client.post(&self.url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            DocsKbError::BackendUnavailable(format!("Embedding request failed: {}", e))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(DocsKbError::BackendUnavailable(format!(
                "Embedding endpoint returned {}: {}",
                status, error_text
            )));
        }

        let parsed: EmbeddingResponse = response.json().await.map_err(|e| {
            DocsKbError::BackendUnavailable(format!("Failed to parse embedding response: {}", e))
        })?;

        parsed
            .data
            .into_iter()
            .next()
            .map(|data| data.embedding)
            .ok_or_else(|| {
                DocsKbError::BackendUnavailable("Embedding endpoint returned no data".to_string())
            })
    }

    /// Endpoint embedding when it answers with the configured dimension,
    /// otherwise the deterministic fallback.
    pub async fn embed(&self, text: &str) -> Vec<f32> {
        match self.generate_embedding(text).await {
            Ok(embedding) if embedding.len() == self.dim => embedding,
            Ok(embedding) => {
                warn!(
                    "Embedding endpoint returned dimension {}, expected {}. Using fallback.",
                    embedding.len(),
                    self.dim
                );
                Self::generate_fallback_embedding(text, self.dim)
            }
            Err(e) => {
                warn!("{}. Using fallback embedding.", e);
                Self::generate_fallback_embedding(text, self.dim)
            }
        }
    }

    /// Hashed bag-of-words vector, L2-normalised.
    pub fn generate_fallback_embedding(text: &str, dim: usize) -> Vec<f32> {
        let mut vector = vec![0.0f32; dim.max(1)];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let hash = token
                .to_lowercase()
                .bytes()
                .fold(0xcbf29ce484222325u64, |acc, b| {
                    (acc ^ b as u64).wrapping_mul(0x100000001b3)
                });
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector.truncate(dim);
        vector
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_embedding_shape() {
        let embedding = EmbeddingClient::generate_fallback_embedding("install the cli", 384);
        assert_eq!(embedding.len(), 384);
        let norm: f32 = embedding.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_fallback_embedding_deterministic_and_case_insensitive() {
        let a = EmbeddingClient::generate_fallback_embedding("Same Text", 128);
        let b = EmbeddingClient::generate_fallback_embedding("same text", 128);
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_embedding_empty_text() {
        let embedding = EmbeddingClient::generate_fallback_embedding("", 16);
        assert_eq!(embedding.len(), 16);
        assert!(embedding.iter().all(|&v| v == 0.0));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_falls_back() {
        let mut config = crate::config::Config::default_config().knowledge;
        config.embedding_url = "http://127.0.0.1:9/v1/embeddings".to_string();
        config.embedding_dim = 32;
        let client = EmbeddingClient::new(&config).unwrap();

        assert!(client.generate_embedding("hello").await.is_err());
        assert_eq!(
            client.embed("hello").await,
            EmbeddingClient::generate_fallback_embedding("hello", 32)
        );
    }
}
