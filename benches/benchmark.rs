use criterion::{criterion_group, criterion_main};

mod benchmark_tree;

use benchmark_tree::{bench_function_codec, bench_function_hashing, bench_function_updates};

criterion_group!(
    benches,
    bench_function_hashing,
    bench_function_updates,
    bench_function_codec
);
criterion_main!(benches);
