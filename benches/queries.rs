// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Predicate query throughput: a driven equality scan against a `like` scan
//! that must walk the full leaf chain, at a couple of tree sizes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ixbase::{Condition, MemoryStorage, NaturalComparator, Options, Order, Tree};

type BenchTree = Tree<u64, String, (), NaturalComparator, MemoryStorage<u64, String, ()>>;

fn build(count: u64) -> BenchTree {
    let tree: BenchTree = Tree::init(MemoryStorage::new(), NaturalComparator, Options::default(), 64, ()).unwrap();
    for i in 0..count {
        tree.insert(i, format!("value-{:08}", i)).unwrap();
    }
    tree.commit(None).unwrap();
    tree
}

fn equal_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("where_equal");

    for count in [1_000u64, 10_000, 100_000] {
        let tree = build(count);
        let target = format!("value-{:08}", count / 2);
        group.bench_with_input(BenchmarkId::new("driven", count), &count, |b, _| {
            b.iter(|| black_box(tree.where_(&Condition::new().equal(target.clone()), Order::Asc).unwrap()));
        });
    }

    group.finish();
}

fn like_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("where_like");

    for count in [1_000u64, 10_000] {
        let tree = build(count);
        group.bench_with_input(BenchmarkId::new("full_scan", count), &count, |b, _| {
            b.iter(|| black_box(tree.where_(&Condition::new().like("%0000%"), Order::Asc).unwrap()));
        });
    }

    group.finish();
}

fn range_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("where_range");

    let tree = build(50_000);
    group.bench_function("gte_lt_window", |b| {
        b.iter(|| {
            black_box(
                tree.where_(
                    &Condition::new().gte("value-00010000".to_string()).lt("value-00010100".to_string()),
                    Order::Asc,
                )
                .unwrap(),
            )
        });
    });

    group.finish();
}

criterion_group!(queries, equal_benchmarks, like_benchmarks, range_benchmarks);
criterion_main!(queries);
