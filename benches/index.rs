// Copyright 2025 Ojima Abraham
// SPDX-License-Identifier: Apache-2.0

//! Benchmarks for the user-match index.

use std::time::Duration;

use arenadb::index::{IndexError, STATE_WIN};
use arenadb::UserStore;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use tempfile::TempDir;

const RETENTION: Duration = Duration::from_secs(30 * 365 * 86_400);

fn create_test_store() -> (UserStore, TempDir) {
    let dir = TempDir::new().unwrap();
    let store = UserStore::open(dir.path(), RETENTION).unwrap();
    (store, dir)
}

fn bench_add_match(c: &mut Criterion) {
    let (store, _dir) = create_test_store();

    let mut group = c.benchmark_group("index");
    group.throughput(Throughput::Elements(1));

    let counter = std::sync::atomic::AtomicU64::new(1);

    group.bench_function("add_match", |b| {
        b.iter(|| {
            let i = counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            let user = (i % 1000) as u32 + 1;
            store
                .transaction(true, |txn| txn.add_match(user, i << 22, STATE_WIN))
                .unwrap()
        })
    });

    group.finish();
}

fn bench_tail_read(c: &mut Criterion) {
    let (store, _dir) = create_test_store();

    // 100 users with 100 matches each.
    store
        .transaction(true, |txn| {
            for i in 0u64..10_000 {
                txn.add_match((i % 100) as u32 + 1, (i + 1) << 22, STATE_WIN)?;
            }
            Ok::<_, IndexError>(())
        })
        .unwrap();

    let mut group = c.benchmark_group("index");
    group.throughput(Throughput::Elements(1));

    group.bench_function("tail_read_20", |b| {
        b.iter_batched(
            || rand::random::<u32>() % 100 + 1,
            |user| store.get_last_user_matches(user, 0, 20).unwrap(),
            BatchSize::SmallInput,
        )
    });

    group.finish();
}

criterion_group!(benches, bench_add_match, bench_tail_read);
criterion_main!(benches);
