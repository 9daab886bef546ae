//! Exact cosine-similarity scan over in-memory candidate rows, with
//! deterministic top-k tie-breaking.
//!
//! No native vector index extension is assumed; `list_count`/`probe_count`
//! are bookkeeping the vector index manager persists on the collection row,
//! not parameters this scan actually consumes — every scan is a full
//! brute-force pass over the candidate rows handed to it, filtered by the
//! compiled predicate first.

use std::cmp::Ordering;

use docsearch_core::error::StoreResult;
use docsearch_core::model::DocumentId;
use docsearch_core::predicate::{self, CompiledPredicate};
use docsearch_core::storage::ScanHit;

/// One candidate row pulled from storage before scoring.
pub struct ScanCandidate {
    pub id: DocumentId,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
}

/// Score descending, then id ascending for stable output across runs.
struct ScoredCandidate {
    id: DocumentId,
    score: f32,
}

impl Ord for ScoredCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        match other.score.partial_cmp(&self.score).unwrap_or(Ordering::Equal) {
            Ordering::Equal => self.id.cmp(&other.id),
            ord => ord,
        }
    }
}

impl PartialOrd for ScoredCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for ScoredCandidate {}

impl PartialEq for ScoredCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

/// Score and rank `candidates` against `query`, applying `predicate` (if
/// any) before scoring, and returning at most `limit` hits in descending
/// score order.
pub fn scan(
    query: &[f32],
    candidates: &[ScanCandidate],
    predicate: Option<&CompiledPredicate>,
    limit: usize,
) -> StoreResult<Vec<ScanHit>> {
    let mut scored = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        if let Some(pred) = predicate {
            if !predicate::evaluate(pred, &candidate.metadata) {
                continue;
            }
        }
        let score = docsearch_core::distance::cosine_score(query, &candidate.embedding)?;
        scored.push(ScoredCandidate {
            id: candidate.id,
            score,
        });
    }
    scored.sort();
    Ok(scored
        .into_iter()
        .take(limit)
        .map(|c| ScanHit {
            document: c.id,
            score: c.score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(id: u128, embedding: Vec<f32>) -> ScanCandidate {
        ScanCandidate {
            id: DocumentId::from_u128(id),
            embedding,
            metadata: json!({}),
        }
    }

    #[test]
    fn scan_orders_by_score_descending() {
        let candidates = vec![
            candidate(1, vec![0.0, 1.0]),
            candidate(2, vec![1.0, 0.0]),
        ];
        let hits = scan(&[1.0, 0.0], &candidates, None, 10).unwrap();
        assert_eq!(hits[0].document, DocumentId::from_u128(2));
        assert_eq!(hits[1].document, DocumentId::from_u128(1));
    }

    #[test]
    fn scan_breaks_ties_by_id_ascending() {
        let candidates = vec![
            candidate(5, vec![1.0, 0.0]),
            candidate(1, vec![1.0, 0.0]),
        ];
        let hits = scan(&[1.0, 0.0], &candidates, None, 10).unwrap();
        assert_eq!(hits[0].document, DocumentId::from_u128(1));
        assert_eq!(hits[1].document, DocumentId::from_u128(5));
    }

    #[test]
    fn scan_respects_limit() {
        let candidates = vec![
            candidate(1, vec![1.0, 0.0]),
            candidate(2, vec![1.0, 0.0]),
            candidate(3, vec![1.0, 0.0]),
        ];
        let hits = scan(&[1.0, 0.0], &candidates, None, 2).unwrap();
        assert_eq!(hits.len(), 2);
    }
}
