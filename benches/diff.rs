//! Performance benchmarks for snapshot diffing and reconciliation.
//!
//! Run with: `cargo bench --bench diff`
//!
//! ## Performance Targets
//!
//! | Operation | Target | Notes |
//! |-----------|--------|-------|
//! | Diff, 10k links | <20ms | Pure, no store access |
//! | Fingerprint, 10k links | <30ms | Canonical JSON + xxh64 |
//! | In-place cycle, 1k links | <50ms | In-memory store |

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use topology_history::{
    DiffEngine, GraphSnapshot, HistoryConfig, InMemoryGraphStore, SnapshotLink, SnapshotNode,
    StaticFetcher, Topology, TopologyUpdater, UpdaterConfig,
};

/// A ring of `n` nodes with a chord every tenth node.
fn make_mesh(n: usize, cost: f64) -> GraphSnapshot {
    let address = |i: usize| format!("10.{}.{}.{}", i / 65536, (i / 256) % 256, i % 256);
    let mut builder = GraphSnapshot::builder("OLSR", "0.8", "ETX");
    for i in 0..n {
        builder.add_node(SnapshotNode::new(address(i)));
        builder.add_link(SnapshotLink::new(address(i), address((i + 1) % n), cost));
        if i % 10 == 0 {
            builder.add_link(SnapshotLink::new(address(i), address((i + n / 2) % n), cost * 2.0));
        }
    }
    builder.build()
}

fn bench_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("diff");

    for size in [100, 1_000, 10_000] {
        let old = make_mesh(size, 1.0);
        let new = make_mesh(size, 1.5);
        group.throughput(Throughput::Elements(old.link_count() as u64));
        group.bench_with_input(BenchmarkId::new("all_changed", size), &size, |b, _| {
            b.iter(|| DiffEngine::compute(black_box(&old), black_box(&new)))
        });
        group.bench_with_input(BenchmarkId::new("identical", size), &size, |b, _| {
            b.iter(|| DiffEngine::compute(black_box(&old), black_box(&old)))
        });
    }

    group.finish();
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");

    for size in [1_000, 10_000] {
        let snapshot = make_mesh(size, 1.0);
        group.throughput(Throughput::Elements(snapshot.link_count() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(&snapshot).fingerprint())
        });
    }

    group.finish();
}

fn bench_update_cycle(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    let mut group = c.benchmark_group("update_cycle");
    group.sample_size(20);

    for size in [100, 1_000] {
        let store = Arc::new(InMemoryGraphStore::new());
        let fetcher = Arc::new(StaticFetcher::new());
        let topology = Topology::new("bench", "netjson", "mem://bench");
        store.add_topology(topology.clone());
        let updater = TopologyUpdater::new(
            Arc::clone(&store),
            Arc::clone(&fetcher),
            UpdaterConfig::new(HistoryConfig::in_place()),
        );

        let meshes = [make_mesh(size, 1.0), make_mesh(size, 2.0)];
        let mut turn = 0usize;
        group.throughput(Throughput::Elements(meshes[0].link_count() as u64));
        group.bench_with_input(BenchmarkId::new("in_place", size), &size, |b, _| {
            b.iter(|| {
                fetcher.set("mem://bench", meshes[turn % 2].clone());
                turn += 1;
                runtime.block_on(updater.update(&topology.id)).unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_diff, bench_fingerprint, bench_update_cycle);
criterion_main!(benches);
