use criterion::{criterion_group, criterion_main};

mod codec;

use codec::register_benchmarks as register_codec_benchmarks;
use record::register_benchmarks as register_record_benchmarks;
use shuffle::register_benchmarks as register_shuffle_benchmarks;

// Define the benchmark groups
criterion_group!(
    benches,
    register_record_benchmarks,
    register_codec_benchmarks,
    register_shuffle_benchmarks,
);

criterion_main!(benches);
