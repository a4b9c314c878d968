// Criterion benchmarks for the myrpc-common wire codec
//
// Run benchmarks with:
//   cargo bench -p myrpc-common
//
// For detailed output with plots:
//   cargo bench -p myrpc-common -- --save-baseline main

use bytes::BytesMut;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use myrpc_common::transport::{encode_frame, FrameDecoder, MessageCodec};
use myrpc_common::{Request, Response};
use serde_json::json;

fn bench_frame_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encoding");

    for size in [64usize, 1024, 64 * 1024] {
        let payload = vec![0xABu8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| encode_frame(black_box(payload)));
        });
    }

    group.finish();
}

fn bench_frame_decoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_decoding");
    let decoder = FrameDecoder::default();

    for size in [64usize, 1024, 64 * 1024] {
        let frame = encode_frame(&vec![0xABu8; size]).unwrap();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("whole", size), &frame, |b, frame| {
            b.iter(|| {
                let mut buf = BytesMut::from(&frame[..]);
                decoder.decode(black_box(&mut buf))
            });
        });
    }

    let frame = encode_frame(&vec![0xABu8; 1024]).unwrap();
    group.bench_function("byte_at_a_time_1k", |b| {
        b.iter(|| {
            let mut buf = BytesMut::with_capacity(frame.len());
            for byte in frame.iter() {
                buf.extend_from_slice(&[*byte]);
                if let Some(payload) = decoder.decode(&mut buf).unwrap() {
                    return payload;
                }
            }
            unreachable!()
        });
    });

    group.finish();
}

fn bench_message_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("message_codec");
    let codec = MessageCodec::default();

    let request = Request::new("com.example.ExampleService", "sayHello")
        .with_arg("string", json!("World"))
        .with_arg("int", json!(3))
        .with_version("1.0");
    group.bench_function("encode_request", |b| {
        b.iter(|| codec.encode(black_box(&request)));
    });

    let encoded = codec
        .encode(&Response::success("id", json!("Hello, World (3)")))
        .unwrap();
    group.bench_function("decode_response", |b| {
        b.iter(|| {
            let mut buf = BytesMut::from(&encoded[..]);
            codec.decode::<Response>(black_box(&mut buf))
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_frame_encoding,
    bench_frame_decoding,
    bench_message_codec
);
criterion_main!(benches);
