//! Benchmarks for hashing and corpus matching.
//!
//! Benchmark targets:
//! - Hashing a 512x512 image: <10ms
//! - Top-25 query over 10,000 fingerprints: <50ms

// Criterion macros generate items without docs - this is expected for benchmarks
// Benchmarks use expect/unwrap for simplicity - panics are acceptable in benchmarks
#![allow(missing_docs)]
#![allow(clippy::expect_used, clippy::unwrap_used)]

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use image::{GrayImage, ImageFormat, Luma};
use std::hint::black_box;
use std::io::Cursor;

use reposentry::services::Matcher;
use reposentry::{
    DifferenceHasher, Fingerprint, FingerprintRecord, MediaStore, SqliteStore, SubmissionId,
};

fn gradient_png(side: u32) -> Vec<u8> {
    let img = GrayImage::from_fn(side, side, |x, y| {
        Luma([u8::try_from((x * 7 + y * 3) % 256).unwrap()])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("encode png");
    bytes
}

/// Fills an in-memory store with `size` pseudo-random fingerprints.
fn seeded_store(size: usize) -> SqliteStore {
    let store = SqliteStore::in_memory().expect("open store");
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    for i in 0..size {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        store
            .record(&FingerprintRecord {
                hash: Fingerprint::new(state),
                submission_id: SubmissionId::new(format!("s{i}")),
                community: "pics".to_string(),
                created_at: i64::try_from(i).unwrap(),
            })
            .expect("record");
    }
    store
}

fn bench_hashing(c: &mut Criterion) {
    let hasher = DifferenceHasher::new();
    let mut group = c.benchmark_group("hash_bytes");
    for side in [64u32, 512] {
        let bytes = gradient_png(side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &bytes, |b, bytes| {
            b.iter(|| hasher.hash_bytes(black_box(bytes)).unwrap());
        });
    }
    group.finish();
}

fn bench_top_matches(c: &mut Criterion) {
    let matcher = Matcher::default();
    let query = Fingerprint::new(0x0F0F_0F0F_0F0F_0F0F);
    let exclude = SubmissionId::new("query");

    let mut group = c.benchmark_group("top_matches");
    group.sample_size(20);
    for size in [1_000usize, 10_000] {
        let store = seeded_store(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &store, |b, store| {
            b.iter(|| {
                matcher
                    .top_matches(store, "pics", black_box(query), &exclude, 50)
                    .unwrap()
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_hashing, bench_top_matches);
criterion_main!(benches);
