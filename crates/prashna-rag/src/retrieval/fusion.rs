//! Pure stages of the hybrid pipeline: score fusion, center selection,
//! neighbor id construction, and evidence ranking. Keeping these free of I/O
//! lets each stage be property-tested on its own.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use super::{Candidate, EvidenceChunk};
use crate::types::chunk_key;

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Min-max normalization over the candidate set. A degenerate set (all
/// values equal) maps to 1.0 so a lone candidate is not zeroed out.
pub fn min_max_normalize(values: &[f32]) -> Vec<f32> {
    if values.is_empty() {
        return Vec::new();
    }
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(mn, mx), &v| {
            (mn.min(v), mx.max(v))
        });
    if max == min {
        return vec![1.0; values.len()];
    }
    values.iter().map(|v| (v - min) / (max - min)).collect()
}

/// Fused score: `α · cos_norm + (1 − α) · bm25_norm`, both normalized
/// independently over this candidate set.
pub fn fuse_scores(candidates: &mut [Candidate], alpha: f32) {
    let bm25: Vec<f32> = candidates.iter().map(|c| c.bm25_score).collect();
    let cosine: Vec<f32> = candidates.iter().map(|c| c.cosine).collect();
    let bm25_norm = min_max_normalize(&bm25);
    let cosine_norm = min_max_normalize(&cosine);

    for (i, candidate) in candidates.iter_mut().enumerate() {
        candidate.fused_score = alpha * cosine_norm[i] + (1.0 - alpha) * bm25_norm[i];
    }
}

/// Keep candidates whose fused score reaches `rel_threshold` of the top
/// score, capped at `center_k`. The BM25 rank-1 hit is always kept (evicting
/// the weakest center at the cap) so a dense-only winner cannot drown the
/// lexical signal entirely.
pub fn select_centers(
    mut candidates: Vec<Candidate>,
    center_k: usize,
    rel_threshold: f32,
) -> Vec<Candidate> {
    if candidates.is_empty() || center_k == 0 {
        return Vec::new();
    }

    candidates.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });

    let cutoff = rel_threshold * candidates[0].fused_score;
    let mut centers = Vec::with_capacity(center_k);
    let mut rest = Vec::new();

    for candidate in candidates {
        if centers.len() < center_k && candidate.fused_score >= cutoff {
            centers.push(candidate);
        } else {
            rest.push(candidate);
        }
    }

    if !centers.iter().any(|c| c.bm25_rank == 0) {
        if let Some(pos) = rest.iter().position(|c| c.bm25_rank == 0) {
            let top_bm25 = rest.swap_remove(pos);
            if centers.len() >= center_k {
                centers.pop();
            }
            centers.push(top_bm25);
        }
    }

    centers
}

/// The deterministic ids of a center's expansion set: the center itself plus
/// up to `window` chunks on each side, clipped at chunk 0. Ids past the end
/// of the document simply miss in the store and are dropped there.
pub fn neighbor_keys(document_id: &str, chunk_id: u32, window: u32) -> Vec<String> {
    let low = chunk_id.saturating_sub(window);
    let high = chunk_id.saturating_add(window);
    (low..=high).map(|c| chunk_key(document_id, c)).collect()
}

/// Deduplicate chunks reachable from several centers (minimum distance wins,
/// then the stronger center), apply the distance decay, and rank. Ties break
/// on ascending `(document_id, chunk_id)` so replays produce identical
/// orderings.
pub fn dedup_and_rank(
    expanded: Vec<EvidenceChunk>,
    distance_penalty: f32,
    max_chunks: usize,
) -> Vec<EvidenceChunk> {
    let mut best: HashMap<(String, u32), EvidenceChunk> = HashMap::new();

    for chunk in expanded {
        match best.entry((chunk.document_id.clone(), chunk.chunk_id)) {
            Entry::Occupied(mut slot) => {
                let kept = slot.get();
                if chunk.distance_from_center < kept.distance_from_center
                    || (chunk.distance_from_center == kept.distance_from_center
                        && chunk.center_score > kept.center_score)
                {
                    slot.insert(chunk);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(chunk);
            }
        }
    }

    let mut ranked: Vec<EvidenceChunk> = best
        .into_values()
        .map(|mut chunk| {
            chunk.evidence_score =
                chunk.center_score - chunk.distance_from_center as f32 * distance_penalty;
            chunk
        })
        .collect();

    ranked.sort_by(|a, b| {
        b.evidence_score
            .partial_cmp(&a.evidence_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    ranked.truncate(max_chunks);
    ranked
}
