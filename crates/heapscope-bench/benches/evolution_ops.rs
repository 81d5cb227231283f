//! Criterion micro-benchmarks for window classification.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use heapscope_bench::{empty_heap, young_gc_trace};
use heapscope_evolution::{EvolutionTracker, WindowConfig};

/// Benchmark: classify a 10K-object young GC with 10% survivors.
fn bench_young_gc_window_10k(c: &mut Criterion) {
    let events = young_gc_trace(10_000, 10);
    c.bench_function("evolution_young_gc_10k", |b| {
        b.iter_batched(
            || events.clone(),
            |events| {
                let mut tracker =
                    EvolutionTracker::new(empty_heap(10_000), WindowConfig::new(0, i64::MAX))
                        .unwrap();
                for event in events {
                    tracker.apply(event).unwrap();
                }
                let data = tracker.finish().unwrap();
                black_box(data.died_object_count());
            },
            BatchSize::LargeInput,
        );
    });
}

/// Benchmark: the same window fed through a channel.
fn bench_drain_window_10k(c: &mut Criterion) {
    let events = young_gc_trace(10_000, 10);
    c.bench_function("evolution_drain_10k", |b| {
        b.iter_batched(
            || {
                let (tx, rx) = crossbeam_channel::unbounded();
                for event in events.iter().cloned() {
                    tx.send(event).unwrap();
                }
                rx
            },
            |rx| {
                let mut tracker =
                    EvolutionTracker::new(empty_heap(10_000), WindowConfig::new(0, i64::MAX))
                        .unwrap();
                tracker.drain(&rx).unwrap();
                black_box(tracker.finish().unwrap().perm_object_count());
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_young_gc_window_10k, bench_drain_window_10k);
criterion_main!(benches);
