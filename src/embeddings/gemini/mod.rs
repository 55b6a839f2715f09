
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::Embedder;
use crate::RagError;
use crate::config::GeminiConfig;
use crate::gemini::{Content, GeminiClient};

/// Largest batch accepted by `batchEmbedContents`
pub const MAX_BATCH_SIZE: usize = 100;

#[derive(Debug, Clone)]
pub struct GeminiEmbedder {
    client: GeminiClient,
    model: String,
    batch_size: usize,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedContentRequest<'a>>,
}

#[derive(Debug, Serialize)]
struct EmbedContentRequest<'a> {
    model: &'a str,
    content: Content<'a>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    #[serde(default)]
    values: Vec<f32>,
}

impl GeminiEmbedder {
    #[inline]
    pub fn new(config: &GeminiConfig) -> Result<Self> {
        let client = GeminiClient::new(config)?;
        Ok(Self::with_client(
            client,
            &config.embedding_model,
            config.batch_size as usize,
        ))
    }

    #[inline]
    pub fn with_client(client: GeminiClient, model: &str, batch_size: usize) -> Self {
        Self {
            client,
            model: GeminiClient::model_resource(model),
            batch_size: batch_size.clamp(1, MAX_BATCH_SIZE),
        }
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Embed texts, splitting them into provider-sized batches
    #[inline]
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "Embedding {} texts in batches of {} with {}",
            texts.len(),
            self.batch_size,
            self.model
        );

        let mut vectors = Vec::with_capacity(texts.len());
        for (batch_idx, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!("Processing batch {} ({} texts)", batch_idx + 1, batch.len());
            let batch_vectors = self
                .embed_batch(batch)
                .with_context(|| format!("Failed to embed batch {}", batch_idx + 1))?;
            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }

    fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self
            .client
            .model_method_url(&self.model, "batchEmbedContents")?;

        let request = BatchEmbedRequest {
            requests: batch
                .iter()
                .map(|text| EmbedContentRequest {
                    model: &self.model,
                    content: Content::text(text),
                })
                .collect(),
        };

        let response: BatchEmbedResponse = self.client.post_json(&url, &request)?;

        if response.embeddings.len() != batch.len() {
            anyhow::bail!(
                "Expected {} embeddings, got {}",
                batch.len(),
                response.embeddings.len()
            );
        }

        let vectors: Vec<Vec<f32>> = response
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect();

        if let Some(first) = vectors.first() {
            let dimension = first.len();
            if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
                anyhow::bail!("Provider returned embeddings of inconsistent dimension");
            }
        }

        Ok(vectors)
    }
}

impl Embedder for GeminiEmbedder {
    #[inline]
    fn embed(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        self.embed_texts(texts)
            .map_err(|e| RagError::Embedding(format!("{:#}", e)))
    }
}
