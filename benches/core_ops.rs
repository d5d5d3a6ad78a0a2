// Copyright 2025 Vivian Voss. Licensed under the Apache License, Version 2.0.
// SPDX-License-Identifier: Apache-2.0

//! Insert/get/delete throughput at a few tree sizes, measuring split and
//! merge overhead as node counts grow past a single leaf.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ixbase::{MemoryStorage, NaturalComparator, Options, Tree};

type BenchTree = Tree<u64, u64, (), NaturalComparator, MemoryStorage<u64, u64, ()>>;

fn build(order: u32, count: u64) -> BenchTree {
    let tree: BenchTree = Tree::init(MemoryStorage::new(), NaturalComparator, Options::default(), order, ()).unwrap();
    for i in 0..count {
        tree.insert(i, i).unwrap();
    }
    tree.commit(None).unwrap();
    tree
}

fn insert_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for order in [8u32, 32, 128] {
        group.bench_with_input(BenchmarkId::new("sequential", order), &order, |b, &order| {
            let tree: BenchTree = Tree::init(MemoryStorage::new(), NaturalComparator, Options::default(), order, ()).unwrap();
            let mut next = 0u64;
            b.iter(|| {
                tree.insert(next, next).unwrap();
                next += 1;
                black_box(next)
            });
        });
    }

    group.finish();
}

fn get_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("get");

    for count in [1_000u64, 10_000, 100_000] {
        let tree = build(64, count);
        group.bench_with_input(BenchmarkId::new("hit", count), &count, |b, &count| {
            let key = count / 2;
            b.iter(|| black_box(tree.get(&key).unwrap()));
        });
        group.bench_with_input(BenchmarkId::new("miss", count), &count, |b, &count| {
            let key = count + 1;
            b.iter(|| black_box(tree.get(&key).unwrap()));
        });
    }

    group.finish();
}

fn delete_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("delete");

    group.bench_function("existing", |b| {
        b.iter_batched(
            || build(64, 2_000),
            |tree| {
                for i in 0..2_000u64 {
                    tree.delete(i, i).unwrap();
                }
                tree.commit(None).unwrap();
            },
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(core_ops, insert_benchmarks, get_benchmarks, delete_benchmarks);
criterion_main!(core_ops);
