//! Reciprocal rank fusion
//!
//! Pure rank combination: `score(doc) = Σ 1/(k + rank_in_list)` with 1-based
//! ranks. Commutative in its two input lists up to tie-breaking; ties break
//! by chunk id ascending so the output is deterministic.

use std::collections::HashMap;

use docqa_core::RankedHit;

/// Fuse a dense and a sparse result list into one ranking.
///
/// Per-path scores already attached to the hits are preserved and merged
/// when a chunk appears in both lists; `fused_score` and `final_score` are
/// set from the RRF sum.
pub fn reciprocal_rank_fusion(dense: &[RankedHit], sparse: &[RankedHit], k: f32) -> Vec<RankedHit> {
    let mut merged: HashMap<String, RankedHit> = HashMap::new();

    accumulate(&mut merged, dense, k);
    accumulate(&mut merged, sparse, k);

    let mut results: Vec<RankedHit> = merged.into_values().collect();
    for hit in &mut results {
        hit.final_score = hit.fused_score.unwrap_or(0.0);
    }
    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    results
}

fn accumulate(merged: &mut HashMap<String, RankedHit>, list: &[RankedHit], k: f32) {
    for (index, hit) in list.iter().enumerate() {
        let rrf = 1.0 / (k + (index + 1) as f32);
        match merged.get_mut(&hit.chunk_id) {
            Some(existing) => {
                existing.fused_score = Some(existing.fused_score.unwrap_or(0.0) + rrf);
                if existing.dense_score.is_none() {
                    existing.dense_score = hit.dense_score;
                }
                if existing.sparse_score.is_none() {
                    existing.sparse_score = hit.sparse_score;
                }
            }
            None => {
                let mut entry = hit.clone();
                entry.fused_score = Some(rrf);
                merged.insert(hit.chunk_id.clone(), entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_hit(id: &str, score: f32) -> RankedHit {
        RankedHit {
            chunk_id: id.into(),
            source: "doc1".into(),
            text: format!("text for {}", id),
            dense_score: Some(score),
            sparse_score: None,
            fused_score: None,
            rerank_score: None,
            final_score: score,
        }
    }

    fn sparse_hit(id: &str, score: f32) -> RankedHit {
        RankedHit {
            chunk_id: id.into(),
            source: "doc1".into(),
            text: format!("text for {}", id),
            dense_score: None,
            sparse_score: Some(score),
            fused_score: None,
            rerank_score: None,
            final_score: score,
        }
    }

    #[test]
    fn test_doc_in_both_lists_ranks_first() {
        // Dense ranks: c1=1, c2=2, c3=3. Sparse ranks: c2=1, c4=2, c1=3.
        // RRF sums with k=60: c2 = 1/62 + 1/61, c1 = 1/61 + 1/63,
        // c4 = 1/62, c3 = 1/63.
        let dense = vec![dense_hit("c1", 0.9), dense_hit("c2", 0.7), dense_hit("c3", 0.5)];
        let sparse = vec![sparse_hit("c2", 10.0), sparse_hit("c4", 8.0), sparse_hit("c1", 4.0)];

        let fused = reciprocal_rank_fusion(&dense, &sparse, 60.0);
        let ids: Vec<&str> = fused.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c2", "c1", "c4", "c3"]);

        let c2 = &fused[0];
        assert!((c2.final_score - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-6);
        // Per-path scores survive the merge
        assert_eq!(c2.dense_score, Some(0.7));
        assert_eq!(c2.sparse_score, Some(10.0));
    }

    #[test]
    fn test_commutative_up_to_tie_breaking() {
        let dense = vec![dense_hit("c1", 0.9), dense_hit("c2", 0.7)];
        let sparse = vec![sparse_hit("c3", 9.0), sparse_hit("c1", 2.0)];

        let ab = reciprocal_rank_fusion(&dense, &sparse, 60.0);
        let ba = reciprocal_rank_fusion(&sparse, &dense, 60.0);

        let mut ids_ab: Vec<&str> = ab.iter().map(|h| h.chunk_id.as_str()).collect();
        let mut ids_ba: Vec<&str> = ba.iter().map(|h| h.chunk_id.as_str()).collect();
        ids_ab.sort_unstable();
        ids_ba.sort_unstable();
        assert_eq!(ids_ab, ids_ba);

        for hit in &ab {
            let twin = ba.iter().find(|h| h.chunk_id == hit.chunk_id).unwrap();
            assert!((hit.final_score - twin.final_score).abs() < 1e-6);
        }
    }

    #[test]
    fn test_ties_break_by_chunk_id_ascending() {
        // c5 and c6 each appear only once at the same rank in one list
        let dense = vec![dense_hit("c6", 0.9)];
        let sparse = vec![sparse_hit("c5", 3.0)];

        let fused = reciprocal_rank_fusion(&dense, &sparse, 60.0);
        let ids: Vec<&str> = fused.iter().map(|h| h.chunk_id.as_str()).collect();
        assert_eq!(ids, vec!["c5", "c6"]);
    }

    #[test]
    fn test_empty_sides() {
        let dense = vec![dense_hit("c1", 0.9)];
        let fused = reciprocal_rank_fusion(&dense, &[], 60.0);
        assert_eq!(fused.len(), 1);
        assert!((fused[0].final_score - 1.0 / 61.0).abs() < 1e-6);

        assert!(reciprocal_rank_fusion(&[], &[], 60.0).is_empty());
    }
}
