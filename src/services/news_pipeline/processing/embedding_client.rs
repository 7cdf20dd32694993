//! Produces embedding vectors for articles and category anchors.
//!
//! Defaults to a local, in-process `fastembed` model so the pipeline has no
//! hard external dependency for its hottest-path call. When
//! `EMBEDDING_SERVICE_ENDPOINT` is configured, requests are instead sent to
//! a remote embedding service — useful for swapping in a larger hosted
//! model without a redeploy.

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::EmbeddingServiceConfig;
use crate::error::{AppError, Result};

/// BGE-small-en-v1.5 embedding dimension, used both by the local model and
/// assumed of any configured remote service.
pub const EMBEDDING_DIMENSION: usize = 384;

const EMBED_TIMEOUT_SECS: u64 = 10;
/// `title + " " + summary`, truncated to this many characters before
/// embedding (matches the categorizer's semantic-phase input window).
pub const MAX_EMBED_CHARS: usize = 1_200;

enum Backend {
    Local(Arc<RwLock<Option<TextEmbedding>>>),
    Remote { http: Client, endpoint: String, api_key: Option<String> },
}

pub struct EmbeddingClient {
    config: EmbeddingServiceConfig,
    backend: Backend,
}

#[derive(Serialize)]
struct RemoteEmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct RemoteEmbedResponse {
    data: Vec<RemoteEmbedDatum>,
}

#[derive(Deserialize)]
struct RemoteEmbedDatum {
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingServiceConfig) -> Self {
        let backend = match &config.endpoint {
            Some(endpoint) => Backend::Remote {
                http: Client::builder()
                    .timeout(Duration::from_secs(EMBED_TIMEOUT_SECS))
                    .build()
                    .expect("failed to build embedding HTTP client"),
                endpoint: endpoint.clone(),
                api_key: config.api_key.clone(),
            },
            None => Backend::Local(Arc::new(RwLock::new(None))),
        };
        Self { config, backend }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let truncated = truncate_at_char_boundary(text, MAX_EMBED_CHARS);
        match &self.backend {
            Backend::Local(model) => self.embed_local(model, &truncated).await,
            Backend::Remote { http, endpoint, api_key } => {
                self.embed_remote(http, endpoint, api_key.as_deref(), &truncated)
                    .await
            }
        }
    }

    async fn embed_local(
        &self,
        model: &Arc<RwLock<Option<TextEmbedding>>>,
        text: &str,
    ) -> Result<Vec<f32>> {
        {
            let guard = model.read().await;
            if guard.is_none() {
                drop(guard);
                self.initialize_local(model).await?;
            }
        }

        let guard = model.read().await;
        let embedder = guard
            .as_ref()
            .ok_or_else(|| AppError::fatal("embedding model not initialized"))?;

        let mut embeddings = embedder
            .embed(vec![text.to_string()], None)
            .map_err(|e| AppError::fatal(format!("embedding inference failed: {e}")))?;

        embeddings
            .pop()
            .ok_or_else(|| AppError::fatal("embedding model returned no vectors"))
    }

    async fn initialize_local(&self, model: &Arc<RwLock<Option<TextEmbedding>>>) -> Result<()> {
        let mut guard = model.write().await;
        if guard.is_some() {
            return Ok(());
        }

        tracing::info!(model = %self.config.model_id, "initializing local embedding model");
        let options = InitOptions::new(EmbeddingModel::BGESmallENV15).with_show_download_progress(true);
        let embedder = TextEmbedding::try_new(options)
            .map_err(|e| AppError::fatal(format!("failed to initialize embedding model: {e}")))?;
        *guard = Some(embedder);
        Ok(())
    }

    async fn embed_remote(
        &self,
        http: &Client,
        endpoint: &str,
        api_key: Option<&str>,
        text: &str,
    ) -> Result<Vec<f32>> {
        let mut request = http.post(endpoint).json(&RemoteEmbedRequest {
            model: &self.config.model_id,
            input: text,
        });
        if let Some(key) = api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(AppError::from)?;
        if response.status().is_server_error() || response.status() == 429 {
            return Err(AppError::transient(
                "embedding",
                format!("http {}", response.status()),
            ));
        }
        if !response.status().is_success() {
            return Err(AppError::permanent(
                "embedding",
                format!("http {}", response.status()),
            ));
        }

        let parsed: RemoteEmbedResponse = response.json().await.map_err(AppError::from)?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| AppError::permanent("embedding", "empty data array"))
    }
}

fn truncate_at_char_boundary(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Cosine similarity between two equal-length embedding vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_similarity_orthogonal_vectors_is_zero() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "a".repeat(2_000);
        assert_eq!(truncate_at_char_boundary(&text, MAX_EMBED_CHARS).len(), MAX_EMBED_CHARS);
    }
}
