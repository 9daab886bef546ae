//! Cosine distance and MMR (Maximal Marginal Relevance) diversification.
//!
//! Exact brute-force scoring only; ANN clustering lives in the storage
//! backend's index, not here (see `index_manager` for the parameter
//! bookkeeping and `docsearch-sqlite`'s `VectorIndex` for the scan itself).

use std::cmp::Ordering;

use crate::error::{StoreError, StoreResult};

/// Dot product of two equal-length vectors.
#[inline]
fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[inline]
fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// Cosine similarity in `[-1, 1]`. Fails on mismatched lengths or a
/// zero-norm input (undefined direction).
pub fn cosine_score(a: &[f32], b: &[f32]) -> StoreResult<f32> {
    if a.len() != b.len() {
        return Err(StoreError::invalid(
            "vector",
            format!("dimension mismatch: {} vs {}", a.len(), b.len()),
        ));
    }
    let (na, nb) = (norm(a), norm(b));
    if na == 0.0 || nb == 0.0 {
        return Err(StoreError::invalid("vector", "zero-norm vector"));
    }
    Ok(dot_product(a, b) / (na * nb))
}

/// `1 - cosine_score`, in `[0, 2]`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> StoreResult<f32> {
    cosine_score(a, b).map(|s| 1.0 - s)
}

/// A candidate passed into [`mmr_rerank`]: an opaque key, its query
/// similarity, and its embedding (needed to score similarity against
/// already-selected candidates).
#[derive(Debug, Clone)]
pub struct MmrCandidate<K> {
    pub key: K,
    pub query_similarity: f32,
    pub embedding: Vec<f32>,
}

/// Greedily select `k` candidates maximising
/// `MMR(i) = lambda * sim(q, i) - (1 - lambda) * max_{j in S} sim(i, j)`.
///
/// Candidates must already be the top-N by query similarity (the search
/// executor's over-fetch step); this function does not itself rank by
/// query similarity beyond the first pick. Ties in `MMR(i)` are broken by
/// higher raw `query_similarity`, then by input order (stable).
pub fn mmr_rerank<K: Clone>(
    candidates: &[MmrCandidate<K>],
    lambda: f32,
    k: usize,
) -> StoreResult<Vec<K>> {
    if !(0.0..=1.0).contains(&lambda) {
        return Err(StoreError::invalid("lambda", "must be within [0, 1]"));
    }
    if candidates.is_empty() {
        return Err(StoreError::invalid("candidates", "must be non-empty"));
    }
    let dim = candidates[0].embedding.len();
    if candidates.iter().any(|c| c.embedding.len() != dim) {
        return Err(StoreError::invalid(
            "candidates",
            "embeddings must share a dimension",
        ));
    }

    let k = k.min(candidates.len());
    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k && !remaining.is_empty() {
        let mut best_idx_in_remaining = 0;
        let mut best_mmr = f32::NEG_INFINITY;
        let mut best_redundancy = f32::INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let candidate = &candidates[idx];
            let max_sim_to_selected = if selected.is_empty() {
                0.0
            } else {
                selected
                    .iter()
                    .map(|&s| {
                        cosine_score(&candidate.embedding, &candidates[s].embedding)
                            .unwrap_or(0.0)
                    })
                    .fold(f32::NEG_INFINITY, f32::max)
            };
            let mmr = lambda * candidate.query_similarity - (1.0 - lambda) * max_sim_to_selected;

            // Ties favour the less redundant candidate (lower similarity to
            // what is already selected) — this is what "diversifies over"
            // means when two candidates score equally.
            let better = match mmr.partial_cmp(&best_mmr).unwrap_or(Ordering::Equal) {
                Ordering::Greater => true,
                Ordering::Equal => max_sim_to_selected < best_redundancy,
                Ordering::Less => false,
            };
            if better {
                best_mmr = mmr;
                best_redundancy = max_sim_to_selected;
                best_idx_in_remaining = pos;
            }
        }

        let chosen = remaining.remove(best_idx_in_remaining);
        selected.push(chosen);
    }

    Ok(selected.into_iter().map(|idx| candidates[idx].key.clone()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_score_identical_unit_vectors() {
        let v = [1.0, 0.0, 0.0];
        assert!((cosine_score(&v, &v).unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_score_orthogonal_vectors() {
        let a = [1.0, 0.0];
        let b = [0.0, 1.0];
        assert!(cosine_score(&a, &b).unwrap().abs() < 1e-6);
    }

    #[test]
    fn cosine_score_dimension_mismatch_is_invalid_input() {
        let a = [1.0, 0.0];
        let b = [1.0, 0.0, 0.0];
        assert!(matches!(
            cosine_score(&a, &b),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn cosine_score_zero_norm_is_invalid_input() {
        let a = [0.0, 0.0];
        let b = [1.0, 0.0];
        assert!(matches!(
            cosine_score(&a, &b),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    fn cand(key: &'static str, sim: f32, embedding: &[f32]) -> MmrCandidate<&'static str> {
        MmrCandidate {
            key,
            query_similarity: sim,
            embedding: embedding.to_vec(),
        }
    }

    // Scenario S5 from the spec: d3 diversifies over d2 under lambda=0.5.
    #[test]
    fn mmr_prefers_diverse_candidate_over_near_duplicate() {
        let candidates = vec![
            cand("d1", 1.0, &[1.0, 0.0, 0.0]),
            cand("d2", 0.993_883_7, &[0.9, 0.1, 0.0]),
            cand("d3", 0.0, &[0.0, 1.0, 0.0]),
        ];
        let result = mmr_rerank(&candidates, 0.5, 2).unwrap();
        assert_eq!(result, vec!["d1", "d3"]);
    }

    #[test]
    fn mmr_rejects_lambda_out_of_range() {
        let candidates = vec![cand("d1", 1.0, &[1.0, 0.0])];
        assert!(matches!(
            mmr_rerank(&candidates, 1.5, 1),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn mmr_rejects_empty_candidates() {
        let candidates: Vec<MmrCandidate<&str>> = Vec::new();
        assert!(matches!(
            mmr_rerank(&candidates, 0.5, 1),
            Err(StoreError::InvalidInput { .. })
        ));
    }

    #[test]
    fn mmr_result_never_exceeds_k_or_duplicates() {
        let candidates = vec![
            cand("a", 0.9, &[1.0, 0.0]),
            cand("b", 0.8, &[0.9, 0.1]),
            cand("c", 0.1, &[0.0, 1.0]),
        ];
        let result = mmr_rerank(&candidates, 0.5, 2).unwrap();
        assert_eq!(result.len(), 2);
        let unique: std::collections::HashSet<_> = result.iter().collect();
        assert_eq!(unique.len(), result.len());
    }

    // ─── Property tests ────────────────────────────────────────────────────

    mod proptest_distance {
        use super::*;
        use proptest::prelude::*;

        fn pt_config() -> ProptestConfig {
            ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            }
        }

        fn non_zero_vec(dim: usize) -> impl Strategy<Value = Vec<f32>> {
            proptest::collection::vec(-10.0f32..10.0, dim)
                .prop_filter("not all-zero", |v| v.iter().any(|x| x.abs() > 1e-3))
        }

        proptest! {
            #![proptest_config(pt_config())]

            /// Cosine score always lands in `[-1, 1]` (up to float slop).
            #[test]
            fn prop_cosine_score_is_bounded(a in non_zero_vec(4), b in non_zero_vec(4)) {
                let score = cosine_score(&a, &b).unwrap();
                prop_assert!(score >= -1.000_1 && score <= 1.000_1);
            }

            /// Cosine score is symmetric: `score(a, b) == score(b, a)`.
            #[test]
            fn prop_cosine_score_is_symmetric(a in non_zero_vec(4), b in non_zero_vec(4)) {
                let ab = cosine_score(&a, &b).unwrap();
                let ba = cosine_score(&b, &a).unwrap();
                prop_assert!((ab - ba).abs() < 1e-4);
            }

            /// A vector always scores ~1.0 against itself.
            #[test]
            fn prop_cosine_score_self_is_one(a in non_zero_vec(4)) {
                let score = cosine_score(&a, &a).unwrap();
                prop_assert!((score - 1.0).abs() < 1e-3);
            }

            /// `mmr_rerank` never returns more than `k` results, never
            /// duplicates a key, and always selects from the input set.
            #[test]
            fn prop_mmr_rerank_respects_k_and_uniqueness(
                sims in proptest::collection::vec(0.0f32..1.0, 2..6),
                k in 1usize..6,
            ) {
                let candidates: Vec<MmrCandidate<usize>> = sims
                    .iter()
                    .enumerate()
                    .map(|(i, &sim)| MmrCandidate {
                        key: i,
                        query_similarity: sim,
                        embedding: vec![sim, 1.0 - sim],
                    })
                    .collect();
                let result = mmr_rerank(&candidates, 0.5, k).unwrap();
                prop_assert!(result.len() <= k.min(candidates.len()));
                let unique: std::collections::HashSet<_> = result.iter().collect();
                prop_assert_eq!(unique.len(), result.len());
                prop_assert!(result.iter().all(|key| *key < candidates.len()));
            }
        }
    }
}
