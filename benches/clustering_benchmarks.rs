//! Benchmarks for the clustering hot path: cosine similarity over the
//! embedding dimension, and the all-pairs scan the merge pass runs across a
//! cluster's candidate pool.

use climate_river::services::news_pipeline::processing::{cosine_similarity, EMBEDDING_DIMENSION};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn fake_embedding(seed: u64, dim: usize) -> Vec<f32> {
    (0..dim)
        .map(|i| {
            let x = (seed.wrapping_mul(2654435761).wrapping_add(i as u64)) as f32;
            (x % 1000.0) / 1000.0 - 0.5
        })
        .collect()
}

fn cosine_similarity_benchmarks(c: &mut Criterion) {
    let a = fake_embedding(1, EMBEDDING_DIMENSION);
    let b = fake_embedding(2, EMBEDDING_DIMENSION);

    c.bench_function("cosine_similarity_384d", |bench| {
        bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
    });
}

fn merge_pass_scan_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_pass_all_pairs_scan");

    for cluster_count in [10usize, 50, 200] {
        let embeddings: Vec<Vec<f32>> = (0..cluster_count)
            .map(|i| fake_embedding(i as u64, EMBEDDING_DIMENSION))
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(cluster_count),
            &embeddings,
            |bench, embeddings| {
                bench.iter(|| {
                    let mut strong_pairs = 0u32;
                    for (i, a) in embeddings.iter().enumerate() {
                        for b in embeddings.iter().skip(i + 1) {
                            if cosine_similarity(a, b) >= 0.55 {
                                strong_pairs += 1;
                            }
                        }
                    }
                    black_box(strong_pairs)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, cosine_similarity_benchmarks, merge_pass_scan_benchmarks);
criterion_main!(benches);
