use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{clamp_top_k, IndexReceipt, LexicalIndex};
use crate::config::{HttpConfig, OpenSearchConfig};
use crate::error::{RagError, Result};
use crate::llm::decode_json;
use crate::types::{Bm25Hit, ChunkRecord};

/// Typed facade over the OpenSearch REST API. Owns the single lexical index
/// and its mapping; the index is lazily ensured on startup and on every
/// write path, which is idempotent and safe under concurrent writers.
pub struct Bm25Index {
    http: reqwest::Client,
    base_url: String,
    index: String,
    auth: Option<(String, String)>,
}

#[derive(Deserialize)]
struct OsIndexResponse {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id")]
    id: String,
    result: String,
}

#[derive(Deserialize)]
struct OsSearchResponse {
    hits: OsHits,
}

#[derive(Deserialize)]
struct OsHits {
    hits: Vec<OsHit>,
}

#[derive(Deserialize)]
struct OsHit {
    #[serde(rename = "_score")]
    score: Option<f32>,
    #[serde(rename = "_source")]
    source: OsDocument,
}

#[derive(Deserialize)]
struct OsDocument {
    document_id: String,
    chunk_id: u32,
    source: String,
    page: Option<u32>,
    text: String,
    #[serde(default)]
    tags: Vec<String>,
}

impl Bm25Index {
    pub fn new(config: &OpenSearchConfig, http: &HttpConfig) -> Result<Self> {
        let auth = match (&config.user, &config.password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Ok(Self {
            http: crate::llm::http_client(http).map_err(RagError::Search)?,
            base_url: config.base_url(),
            index: config.index.clone(),
            auth,
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some((user, password)) = &self.auth {
            builder = builder.basic_auth(user, Some(password));
        }
        builder
    }

    /// Create the index with its mapping if it does not exist yet. A racing
    /// creator is fine: `resource_already_exists_exception` counts as
    /// success.
    pub async fn ensure_index(&self) -> Result<()> {
        let head = self
            .request(reqwest::Method::HEAD, &format!("/{}", self.index))
            .send()
            .await
            .map_err(|e| RagError::Search(format!("OpenSearch unreachable: {}", e)))?;

        if head.status().is_success() {
            return Ok(());
        }
        if head.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(RagError::Search(format!(
                "index existence check returned HTTP {}",
                head.status()
            )));
        }

        let response = self
            .request(reqwest::Method::PUT, &format!("/{}", self.index))
            .json(&index_mapping())
            .send()
            .await
            .map_err(|e| RagError::Search(format!("index creation request failed: {}", e)))?;

        if response.status().is_success() {
            tracing::info!(index = %self.index, "Created BM25 index");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        if body.contains("resource_already_exists_exception") {
            return Ok(());
        }
        Err(RagError::Search(format!("index creation failed: {}", body)))
    }

    /// Liveness probe against the cluster root, for health reporting.
    pub async fn ping(&self) -> bool {
        match self.request(reqwest::Method::GET, "/").send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn index_name(&self) -> &str {
        &self.index
    }
}

fn index_mapping() -> Value {
    json!({
        "mappings": {
            "properties": {
                "document_id": { "type": "keyword" },
                "chunk_id":    { "type": "integer" },
                "source":      { "type": "keyword" },
                "page":        { "type": "integer" },
                "text":        { "type": "text" },
                "tags":        { "type": "keyword" },
            }
        }
    })
}

/// Build the `_search` body: a `match` on the analyzed text plus `terms`
/// filters for any supplied document/source restrictions.
pub(crate) fn search_body(
    query: &str,
    size: usize,
    document_ids: Option<&[String]>,
    sources: Option<&[String]>,
) -> Value {
    let mut filter = Vec::new();
    if let Some(ids) = document_ids {
        if !ids.is_empty() {
            filter.push(json!({ "terms": { "document_id": ids } }));
        }
    }
    if let Some(sources) = sources {
        if !sources.is_empty() {
            filter.push(json!({ "terms": { "source": sources } }));
        }
    }

    json!({
        "size": size,
        "query": {
            "bool": {
                "must": [{ "match": { "text": query } }],
                "filter": filter,
            }
        }
    })
}

#[async_trait]
impl LexicalIndex for Bm25Index {
    async fn index(&self, chunk: &ChunkRecord) -> Result<IndexReceipt> {
        self.ensure_index().await?;

        let body = json!({
            "document_id": chunk.document_id,
            "chunk_id": chunk.chunk_id,
            "source": chunk.source,
            "page": chunk.page,
            "text": chunk.text,
            "tags": chunk.tags,
        });

        let endpoint = format!("/{}/_doc?refresh=true", self.index);
        let response = self
            .request(reqwest::Method::POST, &endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Search(format!("index request failed: {}", e)))?;

        let parsed: OsIndexResponse = decode_json(response, &endpoint)
            .await
            .map_err(RagError::Search)?;

        Ok(IndexReceipt {
            index: parsed.index,
            id: parsed.id,
            result: parsed.result,
        })
    }

    async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: Option<&[String]>,
        sources: Option<&[String]>,
    ) -> Result<Vec<Bm25Hit>> {
        self.ensure_index().await?;

        let body = search_body(query, clamp_top_k(top_k), document_ids, sources);
        let endpoint = format!("/{}/_search", self.index);

        let response = self
            .request(reqwest::Method::POST, &endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| RagError::Search(format!("search request failed: {}", e)))?;

        let parsed: OsSearchResponse = decode_json(response, &endpoint)
            .await
            .map_err(RagError::Search)?;

        Ok(parsed
            .hits
            .hits
            .into_iter()
            .map(|hit| Bm25Hit {
                document_id: hit.source.document_id,
                chunk_id: hit.source.chunk_id,
                source: hit.source.source,
                page: hit.source.page,
                text: hit.source.text,
                tags: hit.source.tags,
                score: hit.score.unwrap_or(0.0),
            })
            .collect())
    }
}
