use serde::{Deserialize, Serialize};

/// Build the deterministic physical id for a chunk. This exact string is the
/// vector store's primary key; neighbor expansion fetches adjacent chunks by
/// constructing these ids, never by range query.
pub fn chunk_key(document_id: &str, chunk_id: u32) -> String {
    format!("{}::{}", document_id, chunk_id)
}

/// Inverse of [`chunk_key`]. Splits on the last `::` so document ids that
/// themselves contain `::` still round-trip.
pub fn parse_chunk_key(key: &str) -> Option<(String, u32)> {
    let (document_id, chunk_id) = key.rsplit_once("::")?;
    let chunk_id = chunk_id.parse().ok()?;
    Some((document_id.to_string(), chunk_id))
}

/// The atomic retrieval unit. `(document_id, chunk_id)` is globally unique
/// and `chunk_id` values are dense `[0, N)` within one document, assigned in
/// reading order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub document_id: String,
    pub chunk_id: u32,
    pub text: String,
    pub page: Option<u32>,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl ChunkRecord {
    pub fn key(&self) -> String {
        chunk_key(&self.document_id, self.chunk_id)
    }
}

/// A chunk paired with its embedding, ready for the vector store.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub record: ChunkRecord,
    pub embedding: Vec<f32>,
}

/// A chunk as returned by the vector store. `distance` is set only for
/// similarity queries; `embedding` only when requested.
#[derive(Debug, Clone)]
pub struct VectorHit {
    pub document_id: String,
    pub chunk_id: u32,
    pub text: String,
    pub page: Option<u32>,
    pub source: String,
    pub tags: Vec<String>,
    pub embedding: Option<Vec<f32>>,
    pub distance: Option<f32>,
}

impl VectorHit {
    pub fn key(&self) -> String {
        chunk_key(&self.document_id, self.chunk_id)
    }

    /// Cosine similarity normalized from the store's cosine distance.
    pub fn cosine(&self) -> Option<f32> {
        self.distance.map(|d| 1.0 - d)
    }
}

/// A lexical search hit, sorted by descending BM25 score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bm25Hit {
    pub document_id: String,
    pub chunk_id: u32,
    pub source: String,
    pub page: Option<u32>,
    pub text: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub score: f32,
}

/// A ranked citation entry. `chunk_id` is serialized as a string on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub document_id: String,
    pub chunk_id: String,
    pub source: String,
    pub page: Option<u32>,
    pub snippet: String,
}

/// The query node's answer payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub sources: Vec<Source>,
    pub context_used: usize,
    pub model_used: String,
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
