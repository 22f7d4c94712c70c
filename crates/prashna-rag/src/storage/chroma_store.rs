use async_trait::async_trait;
use chromadb::client::{ChromaClient, ChromaClientOptions};
use chromadb::collection::{ChromaCollection, CollectionEntries, GetOptions, QueryOptions};
use serde_json::{json, Map, Value};

use super::VectorStore;
use crate::config::ChromaConfig;
use crate::error::{RagError, Result};
use crate::types::{parse_chunk_key, EmbeddedChunk, VectorHit};

/// Chroma-backed vector store. One named collection holds every chunk, keyed
/// by the deterministic `{document_id}::{chunk_id}` id.
pub struct ChromaStore {
    collection: ChromaCollection,
}

impl ChromaStore {
    pub async fn connect(config: &ChromaConfig) -> Result<Self> {
        let options = ChromaClientOptions {
            url: Some(config.url.clone()),
            ..Default::default()
        };

        let client = ChromaClient::new(options)
            .await
            .map_err(|e| RagError::VectorStore(format!("failed to connect to Chroma at {}: {}", config.url, e)))?;

        let collection = client
            .get_or_create_collection(&config.collection, None)
            .await
            .map_err(|e| {
                RagError::VectorStore(format!(
                    "failed to open collection '{}': {}",
                    config.collection, e
                ))
            })?;

        tracing::info!(url = %config.url, collection = %config.collection, "Connected to Chroma");
        Ok(Self { collection })
    }
}

/// Flatten a chunk's metadata to the scalar-only shape the vector store
/// accepts: no nulls (absent `page` is dropped), and the `tags` list joined
/// with `","`. The lexical store keeps the richer list shape.
pub(crate) fn metadata_for(chunk: &EmbeddedChunk, created_at: i64) -> Map<String, Value> {
    let record = &chunk.record;
    let mut map = Map::new();
    map.insert("document_id".to_string(), json!(record.document_id));
    map.insert("chunk_id".to_string(), json!(record.chunk_id));
    map.insert("source".to_string(), json!(record.source));
    if let Some(page) = record.page {
        map.insert("page".to_string(), json!(page));
    }
    map.insert("tags".to_string(), json!(record.tags.join(",")));
    if let Some(version) = &record.version {
        map.insert("version".to_string(), json!(version));
    }
    map.insert("created_at".to_string(), json!(created_at));
    map
}

/// Rebuild a hit from a stored id + document + metadata triple. The metadata
/// fields are authoritative; the id is only a fallback for legacy rows.
pub(crate) fn hit_from_parts(
    id: &str,
    document: Option<String>,
    metadata: Option<Map<String, Value>>,
    embedding: Option<Vec<f32>>,
    distance: Option<f32>,
) -> Option<VectorHit> {
    let metadata = metadata.unwrap_or_default();

    let (fallback_doc, fallback_chunk) = match parse_chunk_key(id) {
        Some((d, c)) => (Some(d), Some(c)),
        None => (None, None),
    };

    let document_id = metadata
        .get("document_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .or(fallback_doc)?;
    let chunk_id = metadata
        .get("chunk_id")
        .and_then(|v| v.as_u64())
        .map(|v| v as u32)
        .or(fallback_chunk)?;

    let tags = metadata
        .get("tags")
        .and_then(|v| v.as_str())
        .map(|joined| {
            joined
                .split(',')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Some(VectorHit {
        document_id,
        chunk_id,
        text: document.unwrap_or_default(),
        page: metadata.get("page").and_then(|v| v.as_u64()).map(|p| p as u32),
        source: metadata
            .get("source")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        tags,
        embedding,
        distance,
    })
}

#[async_trait]
impl VectorStore for ChromaStore {
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let created_at = chrono::Utc::now().timestamp();

        let ids_owned: Vec<String> = chunks.iter().map(|c| c.record.key()).collect();
        let ids: Vec<&str> = ids_owned.iter().map(String::as_str).collect();
        let documents: Vec<&str> = chunks.iter().map(|c| c.record.text.as_str()).collect();
        let embeddings: Vec<Vec<f32>> = chunks.iter().map(|c| c.embedding.clone()).collect();
        let metadatas: Vec<Map<String, Value>> = chunks
            .iter()
            .map(|c| metadata_for(c, created_at))
            .collect();

        let entries = CollectionEntries {
            ids,
            embeddings: Some(embeddings),
            metadatas: Some(metadatas),
            documents: Some(documents),
        };

        self.collection
            .upsert(entries, None)
            .await
            .map_err(|e| RagError::VectorStore(format!("upsert failed: {}", e)))?;

        tracing::debug!(chunks = chunks.len(), "Upserted chunks into Chroma");
        Ok(())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorHit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let options = GetOptions {
            ids: ids.to_vec(),
            where_metadata: None,
            limit: None,
            offset: None,
            where_document: None,
            include: Some(vec![
                "documents".to_string(),
                "metadatas".to_string(),
                "embeddings".to_string(),
            ]),
        };

        let result = self
            .collection
            .get(options)
            .await
            .map_err(|e| RagError::VectorStore(format!("get by ids failed: {}", e)))?;

        let mut hits = Vec::with_capacity(result.ids.len());
        for (i, id) in result.ids.iter().enumerate() {
            let document = result
                .documents
                .as_ref()
                .and_then(|d| d.get(i))
                .and_then(|d| d.clone());
            let metadata = result
                .metadatas
                .as_ref()
                .and_then(|m| m.get(i))
                .and_then(|m| m.clone());
            let embedding = result
                .embeddings
                .as_ref()
                .and_then(|e| e.get(i))
                .and_then(|e| e.clone());

            if let Some(hit) = hit_from_parts(id, document, metadata, embedding, None) {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    async fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let where_metadata = document_id.map(|d| json!({ "document_id": d }));

        let options = QueryOptions {
            query_texts: None,
            query_embeddings: Some(vec![vector.to_vec()]),
            n_results: Some(top_k),
            where_metadata,
            where_document: None,
            include: Some(vec!["documents", "metadatas", "distances"]),
        };

        let result = self
            .collection
            .query(options, None)
            .await
            .map_err(|e| RagError::VectorStore(format!("vector query failed: {}", e)))?;

        // Chroma groups results per query embedding; we always send one.
        let ids = result.ids.into_iter().next().unwrap_or_default();
        let documents = result
            .documents
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();
        let metadatas = result
            .metadatas
            .and_then(|m| m.into_iter().next())
            .unwrap_or_default();
        let distances = result
            .distances
            .and_then(|d| d.into_iter().next())
            .unwrap_or_default();

        let mut hits = Vec::with_capacity(ids.len());
        for (i, id) in ids.iter().enumerate() {
            let hit = hit_from_parts(
                id,
                documents.get(i).cloned(),
                metadatas.get(i).and_then(|m| m.clone()),
                None,
                distances.get(i).copied(),
            );
            if let Some(hit) = hit {
                hits.push(hit);
            }
        }
        Ok(hits)
    }

    async fn get_where(&self, field: &str, value: &str) -> Result<Vec<VectorHit>> {
        let options = GetOptions {
            ids: Vec::new(),
            where_metadata: Some(json!({ field: value })),
            limit: None,
            offset: None,
            where_document: None,
            include: Some(vec!["documents".to_string(), "metadatas".to_string()]),
        };

        let result = self
            .collection
            .get(options)
            .await
            .map_err(|e| RagError::VectorStore(format!("filtered get failed: {}", e)))?;

        let mut hits = Vec::with_capacity(result.ids.len());
        for (i, id) in result.ids.iter().enumerate() {
            let document = result
                .documents
                .as_ref()
                .and_then(|d| d.get(i))
                .and_then(|d| d.clone());
            let metadata = result
                .metadatas
                .as_ref()
                .and_then(|m| m.get(i))
                .and_then(|m| m.clone());

            if let Some(hit) = hit_from_parts(id, document, metadata, None, None) {
                hits.push(hit);
            }
        }
        Ok(hits)
    }
}
