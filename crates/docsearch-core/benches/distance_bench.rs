//! Criterion benchmarks for the cosine scoring and MMR reranking hot paths.

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, Criterion};
use docsearch_core::distance::{cosine_score, mmr_rerank, MmrCandidate};

const DIM: usize = 384;
const CANDIDATES: usize = 200;

fn deterministic_vector(seed: usize, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|i| {
            let h = (seed.wrapping_mul(2_654_435_761) ^ i.wrapping_mul(40_503)) as u32;
            (f64::from(h % 2000) / 1000.0 - 1.0) as f32
        })
        .collect()
}

fn bench_cosine_score(c: &mut Criterion) {
    let a = deterministic_vector(1, DIM);
    let b = deterministic_vector(2, DIM);
    c.bench_function("cosine_score_384d", |bencher| {
        bencher.iter(|| black_box(cosine_score(black_box(&a), black_box(&b)).unwrap()));
    });
}

fn bench_mmr_rerank(c: &mut Criterion) {
    let candidates: Vec<MmrCandidate<usize>> = (0..CANDIDATES)
        .map(|i| MmrCandidate {
            key: i,
            query_similarity: 1.0 - (i as f32 / CANDIDATES as f32),
            embedding: deterministic_vector(i, 32),
        })
        .collect();

    c.bench_function("mmr_rerank_200_candidates_top_20", |bencher| {
        bencher.iter(|| black_box(mmr_rerank(black_box(&candidates), 0.5, 20).unwrap()));
    });
}

criterion_group!(benches, bench_cosine_score, bench_mmr_rerank);
criterion_main!(benches);
