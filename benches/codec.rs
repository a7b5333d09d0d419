//! Benchmarks comparing JSON vs Bincode encoding of shuffle key/value pairs.

use chunklog_rs::shuffle::{JsonCodec, KeyValue, MessageCodec};
use criterion::Criterion;
use std::hint::black_box;

fn make_pair() -> KeyValue {
    KeyValue::new(b"user:000042".to_vec(), vec![7u8; 64])
}

pub fn register_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");

    let pair = make_pair();

    // ─── JSON ───────────────────────────────────────────────────────
    let json = JsonCodec::new();

    group.bench_function("json_encode_pair", |b| {
        b.iter(|| json.encode(black_box(&pair)))
    });

    let json_bytes = json
        .encode(&pair)
        .expect("json encoding must succeed in bench setup");

    group.bench_function("json_decode_pair", |b| {
        b.iter(|| json.decode::<KeyValue>(black_box(&json_bytes)))
    });

    // ─── Bincode ────────────────────────────────────────────────────
    #[cfg(feature = "bincode")]
    {
        use chunklog_rs::shuffle::BincodeCodec;

        let bincode = BincodeCodec::new();

        group.bench_function("bincode_encode_pair", |b| {
            b.iter(|| bincode.encode(black_box(&pair)))
        });

        let bincode_bytes = bincode
            .encode(&pair)
            .expect("bincode encoding must succeed in bench setup");

        group.bench_function("bincode_decode_pair", |b| {
            b.iter(|| bincode.decode::<KeyValue>(black_box(&bincode_bytes)))
        });
    }

    group.finish();
}
