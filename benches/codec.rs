//! 코덱 벤치마크 (CRC-16, FEC, 세그먼트 와이어 포맷)

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use rft::checksum::checksum;
use rft::{fec, Segment};

fn bench_checksum(c: &mut Criterion) {
    let data = vec![0x5Au8; 16 * 1024];

    let mut group = c.benchmark_group("checksum");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.bench_function("crc16_16k", |b| b.iter(|| checksum(black_box(&data))));
    group.finish();
}

fn bench_fec(c: &mut Criterion) {
    let mut group = c.benchmark_group("fec");

    for size in [1024usize, 16 * 1024] {
        let data: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let encoded = fec::encode(&data);

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("encode", size), &data, |b, data| {
            b.iter(|| fec::encode(black_box(data)))
        });
        group.bench_with_input(BenchmarkId::new("decode", size), &encoded, |b, encoded| {
            b.iter(|| fec::decode(black_box(encoded)))
        });
    }

    group.finish();
}

fn bench_segment(c: &mut Criterion) {
    let segment = Segment::data(Bytes::from(vec![0xC3u8; rft::DEFAULT_SEGMENT_SIZE - rft::HEADER_SIZE]))
        .with_sequence(42);
    let wire = segment.to_wire();

    let mut group = c.benchmark_group("segment");
    group.throughput(Throughput::Bytes(rft::DEFAULT_SEGMENT_SIZE as u64));
    group.bench_function("to_wire", |b| b.iter(|| black_box(&segment).to_wire()));
    group.bench_function("from_wire", |b| b.iter(|| Segment::from_wire(black_box(&wire))));
    group.finish();
}

criterion_group!(benches, bench_checksum, bench_fec, bench_segment);
criterion_main!(benches);
