//! Criterion benchmarks for the acquisition hot paths.
//!
//! Key metrics:
//! - Batch apply throughput in steady state (append, filter, evict)
//! - Refilter latency for a full window
//! - Frame decoding and parsing throughput
//!
//! Run with: cargo bench --bench windowed_buffer

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use picova::adapters::{FrameDecoder, SimulatedMeter};
use picova::data::{FilterKind, WindowedBuffer};
use picova::measurement::{parse_record, Measurement};
use std::io::Read;
use std::time::Duration;

/// One second of 1 kHz samples as 10 batches of 100 ms.
fn batches(start_us: u64) -> Vec<Vec<Measurement>> {
    (0..10u64)
        .map(|b| {
            (0..100u64)
                .map(|i| {
                    let t = start_us + (b * 100 + i) * 1_000;
                    Measurement::new(t, 5.0, 200.0 + (i % 7) as f32, 1000.0)
                })
                .collect()
        })
        .collect()
}

/// Apply batches to a buffer whose window is already full, so every batch evicts.
fn steady_state_batches(c: &mut Criterion) {
    let mut group = c.benchmark_group("windowed_buffer_add");
    group.throughput(Throughput::Elements(1_000));

    for (name, kind) in [("identity", FilterKind::Identity), ("median7", FilterKind::median())] {
        let mut buffer = WindowedBuffer::with_settings(kind, Duration::from_secs(5)).unwrap();
        let mut start = 0u64;
        for _ in 0..6 {
            for batch in batches(start) {
                buffer.add_measurements(&batch);
            }
            start += 1_000_000;
        }

        group.bench_with_input(BenchmarkId::new("one_second", name), &kind, |b, _| {
            b.iter(|| {
                for batch in batches(start) {
                    black_box(buffer.add_measurements(&batch));
                }
                start += 1_000_000;
            });
        });
    }

    group.finish();
}

/// Replay a full 5 s window at 1 kHz through fresh filters.
fn refilter_full_window(c: &mut Criterion) {
    let mut buffer = WindowedBuffer::with_settings(FilterKind::median(), Duration::from_secs(5)).unwrap();
    for second in 0..5u64 {
        for batch in batches(second * 1_000_000) {
            buffer.add_measurements(&batch);
        }
    }

    c.bench_function("windowed_buffer_refilter_5000", |b| {
        b.iter(|| {
            buffer.refilter();
            black_box(buffer.len());
        });
    });
}

/// Decode and parse a simulated stream.
fn decode_and_parse(c: &mut Criterion) {
    let mut bytes = Vec::new();
    SimulatedMeter::new()
        .with_seed(1)
        .with_samples(10_000)
        .read_to_end(&mut bytes)
        .unwrap();

    let mut group = c.benchmark_group("ingest");
    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("decode_parse_10k_lines", |b| {
        b.iter(|| {
            let mut decoder = FrameDecoder::new();
            let mut parsed = 0usize;
            for chunk in bytes.chunks(64) {
                for line in decoder.feed(chunk).unwrap() {
                    if parse_record(&line).is_ok() {
                        parsed += 1;
                    }
                }
            }
            black_box(parsed)
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    steady_state_batches,
    refilter_full_window,
    decode_and_parse
);
criterion_main!(benches);
