use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::embeddings::Embedder;
use crate::error::{RagError, Result};
use crate::processing::{PageText, TokenChunker};
use crate::search::LexicalIndex;
use crate::storage::VectorStore;
use crate::types::{truncate_chars, ChunkRecord, EmbeddedChunk};

/// Result of one document ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub document_id: String,
    pub characters: usize,
    pub chunks: usize,
    pub embedding_dim: usize,
    pub preview: Option<String>,
}

/// Ingestion pipeline: chunk parsed pages, embed, then dual-write. The
/// vector-store write is authoritative and fatal on failure; BM25 indexing
/// is best-effort because the lexical index can always be rebuilt by
/// re-ingesting, while neighbor arithmetic depends on the vector store.
pub struct Ingestor {
    chunker: TokenChunker,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    lexical: Arc<dyn LexicalIndex>,
}

impl Ingestor {
    pub fn new(
        chunker: TokenChunker,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        lexical: Arc<dyn LexicalIndex>,
    ) -> Self {
        Self {
            chunker,
            embedder,
            store,
            lexical,
        }
    }

    pub async fn ingest(
        &self,
        document_id: &str,
        source: &str,
        version: Option<&str>,
        tags: &[String],
        pages: &[PageText],
    ) -> Result<IngestOutcome> {
        if document_id.trim().is_empty() {
            return Err(RagError::Validation("document_id must not be empty".into()));
        }

        let characters: usize = pages.iter().map(|p| p.text.chars().count()).sum();

        let page_chunks = self.chunker.chunk_pages(pages);
        if page_chunks.is_empty() {
            return Err(RagError::Validation(
                "document produced no chunks (no tokens found)".into(),
            ));
        }

        // chunk_id is positional across the whole document: dense [0, N).
        let records: Vec<ChunkRecord> = page_chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| ChunkRecord {
                document_id: document_id.to_string(),
                chunk_id: i as u32,
                text: chunk.text,
                page: chunk.page,
                source: source.to_string(),
                tags: tags.to_vec(),
                version: version.map(str::to_string),
            })
            .collect();

        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != records.len() {
            return Err(RagError::Embedding(format!(
                "embedded {} of {} chunks",
                embeddings.len(),
                records.len()
            )));
        }
        let embedding_dim = embeddings.first().map(Vec::len).unwrap_or(0);

        let embedded: Vec<EmbeddedChunk> = records
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(record, embedding)| EmbeddedChunk { record, embedding })
            .collect();

        // Deterministic ids make this upsert idempotent: re-ingesting the
        // same document_id replaces its chunks in place.
        self.store.upsert(&embedded).await?;

        let mut lexical_failures = 0usize;
        for record in &records {
            if let Err(e) = self.lexical.index(record).await {
                lexical_failures += 1;
                tracing::warn!(
                    document_id = %record.document_id,
                    chunk_id = record.chunk_id,
                    error = %e,
                    "BM25 indexing failed; vector store remains authoritative"
                );
            }
        }
        if lexical_failures > 0 {
            tracing::warn!(
                document_id,
                failed = lexical_failures,
                total = records.len(),
                "Document ingested with incomplete lexical coverage"
            );
        }

        tracing::info!(
            document_id,
            chunks = records.len(),
            characters,
            embedding_dim,
            "Document ingested"
        );

        Ok(IngestOutcome {
            document_id: document_id.to_string(),
            characters,
            chunks: records.len(),
            embedding_dim,
            preview: records.first().map(|r| truncate_chars(&r.text, 200)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{FailingLexical, FakeEmbedder, FakeLexical, FakeVectorStore};

    fn pages(token_count: usize) -> Vec<PageText> {
        let text = (0..token_count)
            .map(|i| format!("token{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        vec![PageText {
            number: None,
            text,
        }]
    }

    fn ingestor(
        embedder: FakeEmbedder,
        store: Arc<FakeVectorStore>,
        lexical: impl crate::search::LexicalIndex + 'static,
    ) -> Ingestor {
        Ingestor::new(
            TokenChunker::new(500, 50),
            Arc::new(embedder),
            store,
            Arc::new(lexical),
        )
    }

    #[tokio::test]
    async fn ingestion_writes_densely_numbered_chunks_to_both_stores() {
        let store = Arc::new(FakeVectorStore::default());
        let lexical = Arc::new(FakeLexical::with_hits(Vec::new()));
        let ingestor = Ingestor::new(
            TokenChunker::new(500, 50),
            Arc::new(FakeEmbedder::unit_x()),
            store.clone(),
            lexical.clone(),
        );

        let outcome = ingestor
            .ingest("d", "d.txt", None, &[], &pages(1200))
            .await
            .unwrap();

        assert_eq!(outcome.chunks, 3);
        assert_eq!(outcome.embedding_dim, 3);
        assert!(outcome.preview.as_deref().unwrap().starts_with("token0"));
        for chunk_id in 0..3 {
            assert!(store.contains(&format!("d::{}", chunk_id)));
        }
        let indexed = lexical.indexed.lock();
        let ids: Vec<u32> = indexed.iter().map(|r| r.chunk_id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn lexical_failure_is_swallowed_and_vector_write_stands() {
        let store = Arc::new(FakeVectorStore::default());
        let ingestor = ingestor(FakeEmbedder::unit_x(), store.clone(), FailingLexical);

        let outcome = ingestor
            .ingest("d", "d.txt", None, &[], &pages(100))
            .await
            .unwrap();

        assert_eq!(outcome.chunks, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_aborts_before_any_write() {
        let store = Arc::new(FakeVectorStore::default());
        let ingestor = ingestor(
            FakeEmbedder::failing(),
            store.clone(),
            FakeLexical::with_hits(Vec::new()),
        );

        let err = ingestor
            .ingest("d", "d.txt", None, &[], &pages(100))
            .await
            .unwrap_err();

        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn tokenless_document_is_a_validation_error() {
        let store = Arc::new(FakeVectorStore::default());
        let ingestor = ingestor(
            FakeEmbedder::unit_x(),
            store.clone(),
            FakeLexical::with_hits(Vec::new()),
        );

        let err = ingestor
            .ingest(
                "d",
                "d.txt",
                None,
                &[],
                &[PageText {
                    number: None,
                    text: "   ".into(),
                }],
            )
            .await
            .unwrap_err();

        assert!(err.is_client_error());
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn tags_and_version_ride_along_on_every_chunk() {
        let store = Arc::new(FakeVectorStore::default());
        let lexical = Arc::new(FakeLexical::with_hits(Vec::new()));
        let ingestor = Ingestor::new(
            TokenChunker::new(500, 50),
            Arc::new(FakeEmbedder::unit_x()),
            store,
            lexical.clone(),
        );

        ingestor
            .ingest("d", "d.txt", Some("v2"), &["aws".into()], &pages(600))
            .await
            .unwrap();

        let indexed = lexical.indexed.lock();
        assert!(indexed.len() > 1);
        assert!(indexed
            .iter()
            .all(|r| r.tags == vec!["aws".to_string()] && r.version.as_deref() == Some("v2")));
    }
}
