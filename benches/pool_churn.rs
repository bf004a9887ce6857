//! Buffer pool rent/return churn and container reschema benchmarks.
//!
//! Run with: `cargo bench --bench pool_churn`

use criterion::{criterion_group, criterion_main, Criterion};
use scenegraph::pool::BufferPool;
use scenegraph::Storage;

fn bench_rent_return_steady_state(c: &mut Criterion) {
    let pool = BufferPool::new();
    c.bench_function("pool_rent_return_128b", |b| {
        b.iter(|| {
            let buf = pool.rent(100);
            pool.return_buffer(buf);
        })
    });
}

fn bench_rent_return_mixed_sizes(c: &mut Criterion) {
    let pool = BufferPool::new();
    let sizes = [50usize, 200, 50, 200, 1000, 50];
    c.bench_function("pool_rent_return_mixed", |b| {
        b.iter(|| {
            for &s in &sizes {
                let buf = pool.rent(s);
                pool.return_buffer(buf);
            }
        })
    });
}

fn bench_container_reschema_churn(c: &mut Criterion) {
    c.bench_function("container_write_triggers_reschema", |b| {
        b.iter(|| {
            let storage = Storage::new();
            let root = storage.root();
            root.write("hp", 1i32, true).unwrap();
            root.write("mana", 2i32, true).unwrap();
            root.write("speed", 3.0f32, true).unwrap();
        })
    });
}

criterion_group!(
    benches,
    bench_rent_return_steady_state,
    bench_rent_return_mixed_sizes,
    bench_container_reschema_churn
);
criterion_main!(benches);
