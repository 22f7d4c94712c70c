pub mod config;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod processing;
pub mod retrieval;
pub mod search;
pub mod storage;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export primary types for convenience
pub use config::RagConfig;
pub use engine::QueryEngine;
pub use error::{RagError, Result};
pub use ingest::{IngestOutcome, Ingestor};
pub use retrieval::HybridRetriever;
pub use types::{Answer, Bm25Hit, ChunkRecord, EmbeddedChunk, Source, VectorHit};
