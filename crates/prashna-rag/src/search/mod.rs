pub mod bm25_index;
pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{Bm25Hit, ChunkRecord};

pub use bm25_index::Bm25Index;
pub use client::SearchServiceClient;

/// Upper bound on lexical result counts; requests are clamped into
/// `[1, MAX_SEARCH_TOP_K]`.
pub const MAX_SEARCH_TOP_K: usize = 50;

pub fn clamp_top_k(top_k: usize) -> usize {
    top_k.clamp(1, MAX_SEARCH_TOP_K)
}

/// Lexical index seam. Implemented directly over OpenSearch by
/// [`Bm25Index`] (the search node) and over the search node's HTTP API by
/// [`SearchServiceClient`] (the ingestion and query nodes).
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Index one chunk. Id generation is delegated to the store; BM25 ids
    /// are never used for neighbor arithmetic.
    async fn index(&self, chunk: &ChunkRecord) -> Result<IndexReceipt>;

    /// BM25 search with optional term-level filters, hits sorted by
    /// descending score.
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
        sources: Option<&[String]>,
    ) -> Result<Vec<Bm25Hit>>;
}

/// `POST /search` request body of the search node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_ids: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// `POST /search` response body of the search node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<Bm25Hit>,
    pub total: usize,
}

/// Acknowledgement for a single indexed chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexReceipt {
    pub index: String,
    pub id: String,
    pub result: String,
}
