use std::collections::HashMap;
use std::sync::Arc;

use futures::future::try_join_all;

use super::fusion::{
    cosine_similarity, dedup_and_rank, fuse_scores, neighbor_keys, select_centers,
};
use super::{Candidate, EvidenceChunk};
use crate::config::HybridConfig;
use crate::embeddings::Embedder;
use crate::error::Result;
use crate::search::LexicalIndex;
use crate::storage::VectorStore;
use crate::types::{chunk_key, Bm25Hit, VectorHit};

/// The hybrid retrieval pipeline: BM25 candidate pull fused with dense
/// similarity, center selection, neighbor expansion, and evidence ranking.
///
/// Stage order within one call is fixed; only the query embedding and the
/// BM25 pull are independent and issued concurrently.
pub struct HybridRetriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    lexical: Arc<dyn LexicalIndex>,
    params: HybridConfig,
}

impl HybridRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn VectorStore>,
        lexical: Arc<dyn LexicalIndex>,
        params: HybridConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            lexical,
            params,
        }
    }

    /// Run the pipeline and return the ranked evidence set. An empty result
    /// is a valid outcome, not an error.
    pub async fn retrieve(
        &self,
        question: &str,
        top_k: usize,
        document_id: Option<&str>,
    ) -> Result<Vec<EvidenceChunk>> {
        // Restricted path: the document filter already narrows the corpus,
        // so the filtered dense query result is the final set.
        if let Some(document_id) = document_id {
            let query_vector = self.embedder.embed_query(question).await?;
            let hits = self
                .store
                .query_by_vector(&query_vector, top_k, Some(document_id))
                .await?;
            tracing::debug!(document_id, hits = hits.len(), "Restricted retrieval");
            return Ok(hits.into_iter().map(evidence_from_vector_hit).collect());
        }

        // The BM25 pull does not depend on the query vector; fire both at
        // once and join.
        let (query_vector, bm25_result) = tokio::join!(
            self.embedder.embed_query(question),
            self.lexical
                .search(question, self.params.bm25_chunks, None, None)
        );
        let query_vector = query_vector?;

        let bm25_hits = match bm25_result {
            Ok(hits) => hits,
            Err(e) => {
                tracing::warn!(error = %e, "BM25 search unavailable; degrading to dense-only retrieval");
                Vec::new()
            }
        };

        if bm25_hits.is_empty() {
            let hits = self
                .store
                .query_by_vector(&query_vector, top_k, None)
                .await?;
            return Ok(hits.into_iter().map(evidence_from_vector_hit).collect());
        }

        // Center fetch by deterministic id; ids missing from the vector
        // store (transient inconsistency between the stores) are dropped.
        let keys: Vec<String> = bm25_hits
            .iter()
            .map(|h| chunk_key(&h.document_id, h.chunk_id))
            .collect();
        let fetched = self.store.get_by_ids(&keys).await?;

        let mut candidates = join_candidates(&bm25_hits, fetched, &query_vector);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        fuse_scores(&mut candidates, self.params.fusion_alpha);
        let centers = select_centers(
            candidates,
            self.params.center_k,
            self.params.center_rel_threshold,
        );

        tracing::debug!(
            bm25 = bm25_hits.len(),
            centers = centers.len(),
            "Centers selected"
        );

        let expanded = self.expand_neighbors(&centers).await?;
        Ok(dedup_and_rank(
            expanded,
            self.params.distance_penalty,
            self.params.max_context_chunks,
        ))
    }

    /// Fetch each center's ±window neighbors by constructed id. Ids that
    /// fall before chunk 0 or past the end of the document simply miss.
    async fn expand_neighbors(&self, centers: &[Candidate]) -> Result<Vec<EvidenceChunk>> {
        let window = self.params.neighbor_window;

        let fetches = centers.iter().map(|center| {
            let keys = neighbor_keys(&center.document_id, center.chunk_id, window);
            async move { self.store.get_by_ids(&keys).await }
        });
        let neighborhoods = try_join_all(fetches).await?;

        let mut expanded = Vec::new();
        for (center, hits) in centers.iter().zip(neighborhoods) {
            for hit in hits {
                let distance = hit.chunk_id.abs_diff(center.chunk_id);
                expanded.push(EvidenceChunk {
                    document_id: hit.document_id,
                    chunk_id: hit.chunk_id,
                    text: hit.text,
                    page: hit.page,
                    source: hit.source,
                    distance_from_center: distance,
                    center_score: center.fused_score,
                    evidence_score: 0.0,
                });
            }
        }
        Ok(expanded)
    }
}

/// Join BM25 hits with their vector-store records, preserving BM25 rank.
/// Hits without a vector record (or without an embedding) are dropped.
fn join_candidates(
    bm25_hits: &[Bm25Hit],
    fetched: Vec<VectorHit>,
    query_vector: &[f32],
) -> Vec<Candidate> {
    let mut by_identity: HashMap<(String, u32), VectorHit> = fetched
        .into_iter()
        .map(|hit| ((hit.document_id.clone(), hit.chunk_id), hit))
        .collect();

    bm25_hits
        .iter()
        .enumerate()
        .filter_map(|(rank, hit)| {
            let vector_hit = by_identity.remove(&(hit.document_id.clone(), hit.chunk_id))?;
            let embedding = vector_hit.embedding.as_deref()?;
            Some(Candidate {
                cosine: cosine_similarity(query_vector, embedding),
                document_id: vector_hit.document_id.clone(),
                chunk_id: vector_hit.chunk_id,
                text: vector_hit.text.clone(),
                page: vector_hit.page,
                source: vector_hit.source.clone(),
                bm25_score: hit.score,
                bm25_rank: rank,
                fused_score: 0.0,
            })
        })
        .collect()
}

fn evidence_from_vector_hit(hit: VectorHit) -> EvidenceChunk {
    let score = hit.cosine().unwrap_or(0.0);
    EvidenceChunk {
        document_id: hit.document_id,
        chunk_id: hit.chunk_id,
        text: hit.text,
        page: hit.page,
        source: hit.source,
        distance_from_center: 0,
        center_score: score,
        evidence_score: score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RagConfig;
    use crate::test_support::{FailingLexical, FakeEmbedder, FakeLexical, FakeVectorStore};

    fn retriever(
        store: FakeVectorStore,
        lexical: impl LexicalIndex + 'static,
        params: HybridConfig,
    ) -> HybridRetriever {
        HybridRetriever::new(
            Arc::new(FakeEmbedder::unit_x()),
            Arc::new(store),
            Arc::new(lexical),
            params,
        )
    }

    fn default_params() -> HybridConfig {
        RagConfig::default().hybrid
    }

    #[tokio::test]
    async fn empty_stores_yield_an_empty_evidence_set() {
        let retriever = retriever(
            FakeVectorStore::default(),
            FakeLexical::with_hits(Vec::new()),
            default_params(),
        );
        let chunks = retriever.retrieve("anything?", 5, None).await.unwrap();
        assert!(chunks.is_empty());
    }

    #[tokio::test]
    async fn single_bm25_hit_expands_to_its_neighborhood() {
        // Ten-chunk document; BM25 surfaces only chunk 5.
        let store = FakeVectorStore::with_document("d", 10);
        let lexical = FakeLexical::with_hits(vec![store.bm25_hit("d", 5, 9.0)]);
        let retriever = retriever(store, lexical, default_params());

        let chunks = retriever.retrieve("needle", 5, None).await.unwrap();
        let mut ids: Vec<u32> = chunks.iter().map(|c| c.chunk_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![3, 4, 5, 6, 7]);

        // The center ranks first; its direct neighbors outrank the ±2 ring.
        assert_eq!(chunks[0].chunk_id, 5);
        assert_eq!(chunks[0].distance_from_center, 0);
        assert!(chunks
            .iter()
            .all(|c| c.evidence_score <= chunks[0].evidence_score));
    }

    #[tokio::test]
    async fn expansion_clips_at_document_boundaries() {
        let store = FakeVectorStore::with_document("d", 3);
        let lexical = FakeLexical::with_hits(vec![store.bm25_hit("d", 0, 5.0)]);
        let retriever = retriever(store, lexical, default_params());

        let chunks = retriever.retrieve("needle", 5, None).await.unwrap();
        let mut ids: Vec<u32> = chunks.iter().map(|c| c.chunk_id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn lexical_failure_degrades_to_dense_retrieval() {
        let store = FakeVectorStore::with_document("d", 4);
        let retriever = retriever(store, FailingLexical, default_params());

        let chunks = retriever.retrieve("needle", 2, None).await.unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.document_id == "d"));
    }

    #[tokio::test]
    async fn empty_bm25_result_falls_back_to_dense_retrieval() {
        let store = FakeVectorStore::with_document("d", 4);
        let retriever = retriever(store, FakeLexical::with_hits(Vec::new()), default_params());

        let chunks = retriever.retrieve("needle", 3, None).await.unwrap();
        assert_eq!(chunks.len(), 3);
    }

    #[tokio::test]
    async fn restricted_path_only_returns_the_requested_document() {
        let store = FakeVectorStore::with_document("a", 4);
        store.add_document("b", 4);
        // BM25 would surface both documents; the filter must win without it.
        let lexical = FakeLexical::with_hits(vec![store.bm25_hit("b", 0, 9.0)]);
        let retriever = retriever(store, lexical, default_params());

        let chunks = retriever.retrieve("vpc", 10, Some("a")).await.unwrap();
        assert!(!chunks.is_empty());
        assert!(chunks.iter().all(|c| c.document_id == "a"));
        // No neighbor expansion happened: every chunk is its own center.
        assert!(chunks.iter().all(|c| c.distance_from_center == 0));
    }

    #[tokio::test]
    async fn bm25_hits_missing_from_the_vector_store_are_dropped() {
        let store = FakeVectorStore::with_document("d", 3);
        let lexical = FakeLexical::with_hits(vec![
            store.bm25_hit("d", 1, 5.0),
            // Stale lexical entry for a document the vector store lost.
            Bm25Hit {
                document_id: "ghost".into(),
                chunk_id: 9,
                source: "ghost.pdf".into(),
                page: None,
                text: "gone".into(),
                tags: Vec::new(),
                score: 50.0,
            },
        ]);
        let retriever = retriever(store, lexical, default_params());

        let chunks = retriever.retrieve("needle", 5, None).await.unwrap();
        assert!(chunks.iter().all(|c| c.document_id == "d"));
        assert!(!chunks.is_empty());
    }

    #[tokio::test]
    async fn chunks_shared_by_two_centers_keep_the_minimum_distance() {
        // Centers 4 and 6 both reach chunk 5 at distance 1; chunk 5 must not
        // appear twice and must carry distance 1, not 2. Equal BM25 scores
        // keep both candidates above the (lowered) center threshold.
        let store = FakeVectorStore::with_document("d", 10);
        let lexical = FakeLexical::with_hits(vec![
            store.bm25_hit("d", 4, 9.0),
            store.bm25_hit("d", 6, 9.0),
        ]);
        let mut params = default_params();
        params.center_rel_threshold = 0.1;
        let retriever = retriever(store, lexical, params);

        let chunks = retriever.retrieve("needle", 5, None).await.unwrap();
        let fives: Vec<_> = chunks.iter().filter(|c| c.chunk_id == 5).collect();
        assert_eq!(fives.len(), 1);
        assert_eq!(fives[0].distance_from_center, 1);
    }
}
