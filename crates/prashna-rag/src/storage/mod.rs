pub mod chroma_store;

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EmbeddedChunk, VectorHit};

pub use chroma_store::ChromaStore;

/// Vector store seam. The store is the source of truth for chunk identity:
/// records are keyed by the deterministic `{document_id}::{chunk_id}` string,
/// which is what makes neighbor expansion a batch get and re-ingestion
/// idempotent.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Write chunks with their embeddings and flattened scalar metadata.
    async fn upsert(&self, chunks: &[EmbeddedChunk]) -> Result<()>;

    /// Batch fetch by deterministic id; ids not present are simply omitted.
    async fn get_by_ids(&self, ids: &[String]) -> Result<Vec<VectorHit>>;

    /// Approximate nearest-neighbor search under cosine distance, optionally
    /// restricted to one document.
    async fn query_by_vector(
        &self,
        vector: &[f32],
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<VectorHit>>;

    /// All chunks whose metadata field equals `value`.
    async fn get_where(&self, field: &str, value: &str) -> Result<Vec<VectorHit>>;
}
