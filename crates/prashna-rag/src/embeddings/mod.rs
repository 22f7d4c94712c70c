use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::{HttpConfig, LlmConfig};
use crate::error::{RagError, Result};
use crate::llm::decode_json;

/// Embedding model seam. Ingestion batches documents; queries embed a single
/// string. All vectors from one model share a dimension.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, returning vectors in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("endpoint returned no vectors".into()))
    }

    /// Dimension observed on the first successful call, if any yet.
    fn dimension(&self) -> Option<usize>;
}

/// OpenAI-compatible embeddings client. The vector dimension is discovered on
/// first use and every later response is checked against it, so a model swap
/// mid-flight surfaces as an error instead of corrupting the collection.
pub struct EmbeddingClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dimension: RwLock<Option<usize>>,
}

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

impl EmbeddingClient {
    pub fn new(llm: &LlmConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: crate::llm::http_client(http).map_err(RagError::Embedding)?,
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            api_key: llm.api_key.clone(),
            model: llm.model_embed.clone(),
            dimension: RwLock::new(None),
        })
    }

    fn check_dimensions(&self, vectors: &[Vec<f32>]) -> Result<()> {
        let Some(first) = vectors.first() else {
            return Ok(());
        };

        if vectors.iter().any(|v| v.len() != first.len()) {
            return Err(RagError::Embedding(
                "endpoint returned vectors of mixed dimension".into(),
            ));
        }

        let mut recorded = self.dimension.write();
        match *recorded {
            None => {
                tracing::info!(model = %self.model, dimension = first.len(), "Embedding dimension discovered");
                *recorded = Some(first.len());
            }
            Some(expected) if expected != first.len() => {
                return Err(RagError::Embedding(format!(
                    "embedding dimension changed from {} to {}; was the model swapped?",
                    expected,
                    first.len()
                )));
            }
            Some(_) => {}
        }
        Ok(())
    }
}

#[async_trait]
impl Embedder for EmbeddingClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let endpoint = format!("{}/embeddings", self.base_url);
        let request = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("request to {} failed: {}", endpoint, e)))?;

        let parsed: EmbeddingsResponse = decode_json(response, &endpoint)
            .await
            .map_err(RagError::Embedding)?;

        if parsed.data.len() != texts.len() {
            return Err(RagError::Embedding(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // The wire order is not guaranteed; `index` is authoritative.
        let mut data = parsed.data;
        data.sort_by_key(|d| d.index);
        let vectors: Vec<Vec<f32>> = data.into_iter().map(|d| d.embedding).collect();

        self.check_dimensions(&vectors)?;
        Ok(vectors)
    }

    fn dimension(&self) -> Option<usize> {
        *self.dimension.read()
    }
}
