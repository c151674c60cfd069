//! Benchmarks for tree navigation and delta encoding

use std::sync::Arc;

use cachepack::{encode, TypeContext, TypeTag, Value, ValueTree};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn uniform(size: usize) -> Vec<u8> {
    let items = (0..size as i64).map(Value::I64).collect();
    encode(&Value::UniformArray(TypeTag::I64, items)).unwrap()
}

fn mixed(size: usize) -> Vec<u8> {
    let items = (0..size)
        .map(|i| Value::Map(vec![(Value::from("id"), Value::U32(i as u32))]))
        .collect();
    encode(&Value::Array(items)).unwrap()
}

fn bench_sequential(c: &mut Criterion) {
    let context = Arc::new(TypeContext::new());
    let mut group = c.benchmark_group("sequential_children");

    for size in [10, 100, 1000].iter() {
        let buf: Arc<[u8]> = mixed(*size).into();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut tree = ValueTree::parse(buf.clone(), context.clone(), 0).unwrap();
                let root = tree.root();
                for i in 0..size {
                    black_box(tree.get_child(root, i).unwrap());
                }
                black_box(tree)
            });
        });
    }

    group.finish();
}

fn bench_last_child(c: &mut Criterion) {
    let context = Arc::new(TypeContext::new());
    let mut group = c.benchmark_group("last_child");

    for size in [10, 100, 1000].iter() {
        let buf: Arc<[u8]> = uniform(*size).into();
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut tree = ValueTree::parse(buf.clone(), context.clone(), 0).unwrap();
                let root = tree.root();
                let last = tree.get_child(root, size - 1).unwrap();
                black_box(tree.get_value(last).unwrap().clone())
            });
        });
    }

    group.finish();
}

fn bench_changes(c: &mut Criterion) {
    let context = Arc::new(TypeContext::new());
    let buf: Arc<[u8]> = uniform(1000).into();
    let mut group = c.benchmark_group("get_changes");

    for dirty in [1, 100, 900].iter() {
        let mut tree = ValueTree::parse(buf.clone(), context.clone(), 0).unwrap();
        let root = tree.root();
        for i in 0..*dirty {
            let child = tree.get_child(root, i).unwrap();
            tree.set_value(child, -1i64).unwrap();
        }
        group.bench_with_input(BenchmarkId::from_parameter(dirty), &tree, |b, tree| {
            b.iter(|| black_box(tree.get_changes(tree.root()).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sequential, bench_last_child, bench_changes);
criterion_main!(benches);
