//! Benchmarks for the PDO bit/byte codec.

use std::hint::black_box;

use criterion::{Criterion, criterion_group, criterion_main};

use ecat_common::telem::{DataType, SampleValue};
use ecat_engine::codec;

fn bench_extract(c: &mut Criterion) {
    let mut group = c.benchmark_group("extract");
    let buf = [0xA5u8; 16];

    group.bench_function("sub_byte", |b| {
        b.iter(|| codec::extract(black_box(&buf), 3, 4, DataType::Uint8))
    });
    group.bench_function("int16", |b| {
        b.iter(|| codec::extract(black_box(&buf), 0, 16, DataType::Int16))
    });
    group.bench_function("int24_shifted", |b| {
        b.iter(|| codec::extract(black_box(&buf), 5, 24, DataType::Int32))
    });
    group.bench_function("uint64", |b| {
        b.iter(|| codec::extract(black_box(&buf), 0, 64, DataType::Uint64))
    });
    group.finish();
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");
    let mut buf = [0u8; 16];

    group.bench_function("sub_byte", |b| {
        b.iter(|| codec::insert(black_box(&mut buf), 3, 4, SampleValue::Uint8(0xF)))
    });
    group.bench_function("int16", |b| {
        b.iter(|| codec::insert(black_box(&mut buf), 0, 16, SampleValue::Int16(-512)))
    });
    group.bench_function("int24_shifted", |b| {
        b.iter(|| {
            codec::insert(
                black_box(&mut buf),
                5,
                24,
                SampleValue::Int32(-123456),
            )
        })
    });
    group.bench_function("uint64", |b| {
        b.iter(|| {
            codec::insert(
                black_box(&mut buf),
                0,
                64,
                SampleValue::Uint64(0xDEAD_BEEF_CAFE_F00D),
            )
        })
    });
    group.finish();
}

criterion_group!(benches, bench_extract, bench_insert);
criterion_main!(benches);
