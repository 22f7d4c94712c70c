//! In-memory fakes for the external collaborators, shared by the pipeline
//! tests across modules.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::llm::{ChatCompletion, ChatMessage, ChatModel};
use crate::retrieval::fusion::cosine_similarity;
use crate::search::{IndexReceipt, LexicalIndex};
use crate::storage::VectorStore;
use crate::types::{chunk_key, Bm25Hit, ChunkRecord, EmbeddedChunk, VectorHit};

/// Deterministic embedder: every text maps to the x unit vector, so stored
/// chunks rank by how closely their fake embeddings align with x.
pub struct FakeEmbedder {
    fail: bool,
}

impl FakeEmbedder {
    pub fn unit_x() -> Self {
        Self { fail: false }
    }

    pub fn failing() -> Self {
        Self { fail: true }
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            return Err(RagError::Embedding("embedding endpoint down".into()));
        }
        Ok(texts.iter().map(|_| vec![1.0, 0.0, 0.0]).collect())
    }

    fn dimension(&self) -> Option<usize> {
        Some(3)
    }
}

/// Embedding assigned to chunk `i` of a fake document: alignment with the
/// x axis decays as `i` grows, so dense ranking follows chunk order.
fn fake_embedding(chunk_id: u32) -> Vec<f32> {
    vec![1.0, chunk_id as f32 * 0.1, 0.0]
}

#[derive(Default)]
pub struct FakeVectorStore {
    chunks: Mutex<HashMap<String, VectorHit>>,
}

impl FakeVectorStore {
    pub fn with_document(document_id: &str, chunk_count: u32) -> Self {
        let store = Self::default();
        store.add_document(document_id, chunk_count);
        store
    }

    pub fn add_document(&self, document_id: &str, chunk_count: u32) {
        let mut chunks = self.chunks.lock();
        for chunk_id in 0..chunk_count {
            chunks.insert(
                chunk_key(document_id, chunk_id),
                VectorHit {
                    document_id: document_id.to_string(),
                    chunk_id,
                    text: format!("text of {} chunk {}", document_id, chunk_id),
                    page: Some(1),
                    source: format!("{}.pdf", document_id),
                    tags: Vec::new(),
                    embedding: Some(fake_embedding(chunk_id)),
                    distance: None,
                },
            );
        }
    }

    /// A BM25 hit consistent with a stored chunk.
    pub fn bm25_hit(&self, document_id: &str, chunk_id: u32, score: f32) -> Bm25Hit {
        let chunks = self.chunks.lock();
        let hit = chunks
            .get(&chunk_key(document_id, chunk_id))
            .expect("bm25_hit requires a stored chunk");
        Bm25Hit {
            document_id: hit.document_id.clone(),
            chunk_id: hit.chunk_id,
            source: hit.source.clone(),
            page: hit.page,
            text: hit.text.clone(),
            tags: hit.tags.clone(),
            score,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.lock().len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.chunks.lock().contains_key(key)
    }
}

#[async_trait]
impl VectorStore for FakeVectorStore {
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()> {
        let mut stored = self.chunks.lock();
        for chunk in chunks {
            stored.insert(
                chunk.record.key(),
                VectorHit {
                    document_id: chunk.record.document_id.clone(),
                    chunk_id: chunk.record.chunk_id,
                    text: chunk.record.text.clone(),
                    page: chunk.record.page,
                    source: chunk.record.source.clone(),
                    tags: chunk.record.tags.clone(),
                    embedding: Some(chunk.embedding.clone()),
                    distance: None,
                },
            );
        }
        Ok(())
    }

    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorHit>> {
        let chunks = self.chunks.lock();
        Ok(ids.iter().filter_map(|id| chunks.get(id).cloned()).collect())
    }

    async fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<VectorHit>> {
        let chunks = self.chunks.lock();
        let mut hits: Vec<VectorHit> = chunks
            .values()
            .filter(|hit| document_id.map_or(true, |d| hit.document_id == d))
            .cloned()
            .map(|mut hit| {
                let cosine =
                    cosine_similarity(vector, hit.embedding.as_deref().unwrap_or_default());
                hit.distance = Some(1.0 - cosine);
                hit
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn get_where(&self, field: &str, value: &str) -> Result<Vec<VectorHit>> {
        if field != "document_id" {
            return Err(RagError::VectorStore(format!(
                "fake store cannot filter on '{}'",
                field
            )));
        }
        let chunks = self.chunks.lock();
        Ok(chunks
            .values()
            .filter(|hit| hit.document_id == value)
            .cloned()
            .collect())
    }
}

pub struct FakeLexical {
    hits: Vec<Bm25Hit>,
    pub indexed: Mutex<Vec<ChunkRecord>>,
}

impl FakeLexical {
    pub fn with_hits(hits: Vec<Bm25Hit>) -> Self {
        Self {
            hits,
            indexed: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LexicalIndex for FakeLexical {
    async fn index(&self, chunk: &ChunkRecord) -> Result<IndexReceipt> {
        self.indexed.lock().push(chunk.clone());
        Ok(IndexReceipt {
            index: "docs_bm25".into(),
            id: chunk.key(),
            result: "created".into(),
        })
    }

    async fn search(
        &self,
        _query: &str,
        top_k: usize,
        _document_ids: Option<&[String]>,
        _sources: Option<&[String]>,
    ) -> Result<Vec<Bm25Hit>> {
        let mut hits = self.hits.clone();
        hits.truncate(top_k);
        Ok(hits)
    }
}

/// Lexical backend that is unreachable, for degradation tests.
pub struct FailingLexical;

#[async_trait]
impl LexicalIndex for FailingLexical {
    async fn index(&self, _chunk: &ChunkRecord) -> Result<IndexReceipt> {
        Err(RagError::Search("search node down".into()))
    }

    async fn search(
        &self,
        _query: &str,
        _top_k: usize,
        _document_ids: Option<&[String]>,
        _sources: Option<&[String]>,
    ) -> Result<Vec<Bm25Hit>> {
        Err(RagError::Search("search node down".into()))
    }
}

pub struct FakeChat {
    reply: String,
    pub calls: AtomicUsize,
}

impl FakeChat {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChatModel for FakeChat {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        model_override: Option<&str>,
    ) -> Result<ChatCompletion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ChatCompletion {
            text: self.reply.clone(),
            model: model_override.unwrap_or("fake-chat").to_string(),
        })
    }

    fn default_model(&self) -> &str {
        "fake-chat"
    }
}
