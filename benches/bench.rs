//! Criterion benchmarks for hashdex.
//!
//! - Postings encoding and decoding
//! - Index builds (insert, flush, merge, cleanup) in memory
//! - Point lookups on a finalized index

use std::hint::black_box;
use std::sync::Arc;

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use hashdex::config::IndexConfig;
use hashdex::index::HashedIndex;
use hashdex::postings::{PostingsList, codec};
use hashdex::storage::memory::MemoryStorage;

/// Generate `(token, doc_id, offset)` occurrences over a small vocabulary.
fn generate_occurrences(docs: u32, doc_length: u32, vocabulary: u32) -> Vec<(String, u32, u32)> {
    let mut occurrences = Vec::with_capacity((docs * doc_length) as usize);
    for doc_id in 0..docs {
        for offset in 0..doc_length {
            let word = (doc_id * 7 + offset * 13) % vocabulary; // Pseudo-random distribution
            occurrences.push((format!("term{word}"), doc_id, offset));
        }
    }
    occurrences
}

fn bench_config() -> IndexConfig {
    IndexConfig {
        table_size: 16_411,
        flush_threshold: 5_000,
        max_concurrent_merges: 2,
        ..IndexConfig::default()
    }
}

fn build_index(occurrences: &[(String, u32, u32)]) -> HashedIndex {
    let mut index = HashedIndex::create(Arc::new(MemoryStorage::default()), bench_config()).unwrap();
    for (token, doc_id, offset) in occurrences {
        index.insert(token, *doc_id, *offset).unwrap();
    }
    index.cleanup().unwrap();
    index
}

fn bench_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("postings_codec");

    let mut list = PostingsList::new();
    for doc_id in 0..1_000 {
        for offset in (0..20).map(|o| o * 3) {
            list.add(doc_id, offset);
        }
    }
    let bytes = codec::encode(&list).unwrap();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("encode", |b| {
        b.iter(|| black_box(codec::encode(black_box(&list)).unwrap()))
    });
    group.bench_function("decode", |b| {
        b.iter(|| black_box(codec::decode(black_box(&bytes)).unwrap()))
    });

    group.finish();
}

fn bench_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_build");
    group.sample_size(10);

    let occurrences = generate_occurrences(200, 100, 2_000);
    group.throughput(Throughput::Elements(occurrences.len() as u64));
    group.bench_function("insert_and_cleanup", |b| {
        b.iter(|| black_box(build_index(&occurrences)))
    });

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("index_lookup");

    let occurrences = generate_occurrences(200, 100, 2_000);
    let index = build_index(&occurrences);
    let tokens: Vec<String> = (0..2_000).map(|w| format!("term{w}")).collect();

    group.throughput(Throughput::Elements(100));
    group.bench_function("get_postings_batch", |b| {
        b.iter_batched(
            || tokens.iter().step_by(20).cloned().collect::<Vec<_>>(),
            |batch| {
                for token in batch {
                    black_box(index.get_postings(&token).unwrap());
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.bench_function("get_postings_missing", |b| {
        b.iter(|| black_box(index.get_postings(black_box("absent")).unwrap()))
    });

    group.finish();
}

criterion_group!(benches, bench_codec, bench_build, bench_lookup);
criterion_main!(benches);
