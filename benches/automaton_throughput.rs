//! Suffix automaton throughput benchmarks.
//!
//! Measures incremental construction, static lookups, and index loading.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use samd_core::automaton::{CorpusIndex, DynamicIndex, StaticIndex, SuffixAutomaton};

/// Token stream with repeated phrases, closer to real text than uniform noise.
fn phrase_stream(len: usize, vocab: u32) -> Vec<u32> {
    let mut rng = StdRng::seed_from_u64(17);
    let phrases: Vec<Vec<u32>> = (0..64)
        .map(|_| (0..rng.gen_range(3..12)).map(|_| rng.gen_range(1..vocab)).collect())
        .collect();
    let mut out = Vec::with_capacity(len);
    while out.len() < len {
        if rng.gen_bool(0.7) {
            out.extend_from_slice(&phrases[rng.gen_range(0..phrases.len())]);
        } else {
            out.push(rng.gen_range(1..vocab));
        }
    }
    out.truncate(len);
    out
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("automaton_build");

    for (name, len) in [("1k", 1_000), ("10k", 10_000), ("100k", 100_000)] {
        let stream = phrase_stream(len, 32_000);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_function(BenchmarkId::new("tokens", name), |b| {
            b.iter(|| SuffixAutomaton::from_tokens(black_box(&stream)))
        });
    }

    group.finish();
}

fn bench_dynamic_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_commit");
    let stream = phrase_stream(4_096, 32_000);

    for (name, chunk) in [("single", 1), ("accept_4", 4), ("accept_16", 16)] {
        group.throughput(Throughput::Elements(stream.len() as u64));
        group.bench_function(BenchmarkId::new("chunk", name), |b| {
            b.iter(|| {
                let mut index = DynamicIndex::new(40);
                for tokens in stream.chunks(chunk) {
                    index.commit_tokens(black_box(tokens));
                }
                index
            })
        });
    }

    group.finish();
}

fn bench_static_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("static_lookup");
    let corpus: Vec<Vec<u32>> = (0..50)
        .map(|i| phrase_stream(2_000 + i, 32_000))
        .collect();
    let index = Arc::new(CorpusIndex::build(&corpus, 2));
    let query = phrase_stream(256, 32_000);

    for horizon in [8usize, 40] {
        group.throughput(Throughput::Elements(query.len() as u64));
        group.bench_function(BenchmarkId::new("horizon", horizon), |b| {
            b.iter(|| {
                let mut view = StaticIndex::new(Arc::clone(&index), horizon);
                let mut matched = 0;
                for window in query.windows(2) {
                    matched += view.lookup(window[1]).match_length;
                    view.commit_tokens(&window[..1]);
                }
                black_box(matched)
            })
        });
    }

    group.finish();
}

fn bench_index_load(c: &mut Criterion) {
    let corpus: Vec<Vec<u32>> = (0..20).map(|i| phrase_stream(1_000 + i, 32_000)).collect();
    let bytes = CorpusIndex::build(&corpus, 2)
        .to_bytes()
        .expect("index encodes");

    c.bench_function("index_from_bytes", |b| {
        b.iter(|| CorpusIndex::from_bytes(black_box(&bytes)).expect("index decodes"))
    });
}

criterion_group!(
    benches,
    bench_build,
    bench_dynamic_commit,
    bench_static_lookup,
    bench_index_load,
);
criterion_main!(benches);
