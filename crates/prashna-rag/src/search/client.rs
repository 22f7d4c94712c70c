use async_trait::async_trait;

use super::{IndexReceipt, LexicalIndex, SearchRequest, SearchResults};
use crate::config::HttpConfig;
use crate::error::{RagError, Result};
use crate::llm::decode_json;
use crate::types::{Bm25Hit, ChunkRecord};

/// Client for the search node's HTTP API, used by the ingestion and query
/// nodes. Speaks the same wire types the node itself serves.
pub struct SearchServiceClient {
    http: reqwest::Client,
    base_url: String,
}

impl SearchServiceClient {
    pub fn new(base_url: &str, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: crate::llm::http_client(http).map_err(RagError::Search)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LexicalIndex for SearchServiceClient {
    async fn index(&self, chunk: &ChunkRecord) -> Result<IndexReceipt> {
        let endpoint = format!("{}/index", self.base_url);

        let response = self
            .http
            .post(&endpoint)
            .json(chunk)
            .send()
            .await
            .map_err(|e| RagError::Search(format!("search node unreachable: {}", e)))?;

        decode_json(response, &endpoint).await.map_err(RagError::Search)
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
        sources: Option<&[String]>,
    ) -> Result<Vec<Bm25Hit>> {
        let endpoint = format!("{}/search", self.base_url);
        let request = SearchRequest {
            query: query.to_string(),
            top_k: Some(top_k),
            document_ids: document_ids.map(<[String]>::to_vec),
            sources: sources.map(<[String]>::to_vec),
        };

        let response = self
            .http
            .post(&endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Search(format!("search node unreachable: {}", e)))?;

        let results: SearchResults = decode_json(response, &endpoint)
            .await
            .map_err(RagError::Search)?;

        Ok(results.hits)
    }
}
