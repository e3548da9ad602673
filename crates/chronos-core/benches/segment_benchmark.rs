//! Benchmark suite for segment get/put under varying load factors.
//!
//! Run with: `cargo bench --bench segment_benchmark`

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chronos_core::config::EvictionKind;
use chronos_core::entry::Entry;
use chronos_core::eviction::EvictionPolicy;
use chronos_core::segment::Segment;

fn populated_segment(entry_count: usize, budget_bytes: u64) -> Segment {
    let segment = Segment::new(budget_bytes, EvictionPolicy::from_kind(EvictionKind::Lru));
    for i in 0..entry_count {
        segment.put(format!("key:{i}"), Entry::new(vec![0u8; 64], 0, 56, 0));
    }
    segment
}

fn bench_segment_get_hit(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segment-get-hit");
    for size in [100, 1_000, 10_000] {
        let segment = populated_segment(size, u64::MAX);
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("entries", size), &size, |b, _| {
            b.iter(|| black_box(segment.get("key:0")));
        });
    }
    group.finish();
}

fn bench_segment_put_no_eviction(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segment-put");
    group.bench_function("insert_unbounded", |b| {
        let segment = Segment::new(u64::MAX, EvictionPolicy::from_kind(EvictionKind::Lru));
        let mut i = 0u64;
        b.iter(|| {
            segment.put(format!("key:{i}"), Entry::new(vec![0u8; 64], 0, 56, 0));
            i += 1;
        });
    });
    group.finish();
}

fn bench_segment_put_under_pressure(c: &mut Criterion) {
    let mut group = c.benchmark_group("Segment-put-eviction");
    // Budget only large enough for ~1000 entries; every insert past that
    // triggers LRU eviction, the hot path this benchmark targets.
    let budget = 1000 * (56 + 64);
    group.bench_function("insert_with_lru_eviction", |b| {
        let segment = Segment::new(budget as u64, EvictionPolicy::from_kind(EvictionKind::Lru));
        let mut i = 0u64;
        b.iter(|| {
            segment.put(format!("key:{i}"), Entry::new(vec![0u8; 64], 0, 56, 0));
            i += 1;
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_segment_get_hit,
    bench_segment_put_no_eviction,
    bench_segment_put_under_pressure
);
criterion_main!(benches);
