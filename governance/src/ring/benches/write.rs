use super::filled;
use criterion::{criterion_group, Criterion};
use std::hint::black_box;

fn bench_write(c: &mut Criterion) {
    for capacity in [10, 100, 1_000] {
        let label = format!("{}/capacity={}", module_path!(), capacity);
        c.bench_function(&label, |b| {
            let (mut store, ring) = filled(capacity, capacity as u64);
            let mut value = 0u64;
            b.iter(|| {
                value += 1;
                ring.write(&mut store, black_box(&value)).unwrap();
            });
        });
    }
}

criterion_group! {
    name = benches;
    config = Criterion::default().sample_size(10);
    targets = bench_write
}
