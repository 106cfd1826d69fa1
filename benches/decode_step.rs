//! Per-step decoding overhead benchmarks.
//!
//! Covers everything around the forward pass: draft selection, candidate
//! layout, verification, and cache compaction.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use samd_core::engine::{
    verify, Candidate, DraftSelector, DraftSource, GenerationConfig, Logits, SpeculativeConfig,
    TokenRecycleDrafter, TokenSampler, TreeDrafter,
};
use samd_core::memory::{KvCache, KvCacheConfig, LayeredKvCache};

const VOCAB: usize = 32_000;

fn one_hot_rows(tokens: &[u32], next: impl Fn(u32) -> u32) -> Logits {
    let rows = tokens
        .iter()
        .map(|&t| {
            let mut row = vec![0.0; VOCAB];
            row[next(t) as usize % VOCAB] = 10.0;
            row
        })
        .collect();
    Logits::from_rows(rows).expect("rows share one width")
}

fn bench_select(c: &mut Criterion) {
    let mut group = c.benchmark_group("draft_select");
    let history: Vec<u32> = (0..2_048).map(|i| (i * 31 % 97) as u32).collect();

    let mut selector = DraftSelector::new(SpeculativeConfig::default(), None, None);
    let row = vec![0.0f32; 8];
    let rows: Vec<&[f32]> = history.iter().map(|_| row.as_slice()).collect();
    selector.commit(&history, &rows);

    group.bench_function("sequence", |b| b.iter(|| selector.select(black_box(31))));
    group.finish();
}

fn bench_tree_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_layout");
    let config = SpeculativeConfig::default();
    let mut drafter = TokenRecycleDrafter::from_config(&config);
    let tokens: Vec<u32> = (0..512).collect();
    let rows: Vec<Vec<f32>> = tokens
        .iter()
        .map(|&t| (0..64).map(|i| ((t as usize * 7 + i) % 64) as f32).collect())
        .collect();
    let row_refs: Vec<&[f32]> = rows.iter().map(Vec::as_slice).collect();
    drafter.update(&tokens, &row_refs);

    for max_nodes in [16usize, 64] {
        group.throughput(Throughput::Elements(max_nodes as u64));
        group.bench_function(BenchmarkId::new("nodes", max_nodes), |b| {
            b.iter(|| Candidate::tree(&drafter.draft(black_box(3), max_nodes)))
        });
    }

    group.finish();
}

fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("verify");

    for drafted in [8usize, 40] {
        let predicted: Vec<u32> = (1..=drafted as u32).collect();
        let candidate = Candidate::sequence(0, &predicted, DraftSource::Dynamic);
        let logits = one_hot_rows(candidate.tokens(), |t| t + 1);

        group.throughput(Throughput::Elements(drafted as u64));
        group.bench_function(BenchmarkId::new("greedy", drafted), |b| {
            let mut sampler = TokenSampler::new(&GenerationConfig::default());
            b.iter(|| verify(black_box(&candidate), &logits, &mut sampler).expect("verifies"))
        });
        group.bench_function(BenchmarkId::new("sampled", drafted), |b| {
            let mut sampler = TokenSampler::new(&GenerationConfig::sampled(1.0, Some(1)));
            b.iter(|| verify(black_box(&candidate), &logits, &mut sampler).expect("verifies"))
        });
    }

    group.finish();
}

fn bench_compact(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache_compact");
    let config = KvCacheConfig {
        num_layers: 32,
        kv_width: 1024,
        capacity: 1024,
    };
    let batch = 41;
    let rows = vec![0.5f32; batch * config.kv_width];
    let accepted: Vec<usize> = (0..batch).step_by(4).collect();

    group.throughput(Throughput::Bytes(
        (2 * config.num_layers * accepted.len() * config.kv_width * 4) as u64,
    ));
    group.bench_function("interleaved", |b| {
        let mut cache = LayeredKvCache::<f32>::new(config);
        b.iter(|| {
            cache.reset();
            for layer in 0..config.num_layers {
                cache.append(layer, &rows, &rows).expect("fits");
            }
            cache.compact(black_box(&accepted)).expect("in range");
        })
    });

    group.finish();
}

criterion_group!(benches, bench_select, bench_tree_layout, bench_verify, bench_compact);
criterion_main!(benches);
