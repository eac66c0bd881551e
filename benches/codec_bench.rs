//! Performance benchmarks for the terminal and modem codecs.
//!
//! The terminal link redraws the display at 10 frames/s during an unlock
//! countdown, so draw encoding sits on the hot path.
//!
//! Run benchmarks with:
//! ```sh
//! cargo bench --bench codec_bench
//! ```

use bytes::BytesMut;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use latch_protocol::{Bitmap, Icon, ModemCodec, ReaderCommand, TerminalCodec, parse_line, parse_mml};
use std::hint::black_box;
use tokio_util::codec::{Decoder, Encoder};

/// A countdown screen like the one shown while unlocked.
fn countdown_frame() -> Bitmap {
    let mut bitmap = Bitmap::new();
    bitmap.draw_icon(Icon::Tag, 0, 4, 1);
    bitmap.draw_text(24, 4, "Grace", 2, true);
    bitmap.fill_rect(0, 28, 127, 46, true);
    bitmap.draw_text(2, 30, "2026-10-19", 2, false);
    bitmap.progress_bar(56, 63, 0.42);
    bitmap
}

/// Benchmark encoding a full display frame.
fn bench_encode_draw(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode_draw");
    group.throughput(Throughput::Bytes(1024));

    let command = ReaderCommand::Draw(countdown_frame());

    group.bench_function("encode_draw_frame", |b| {
        b.iter(|| {
            let mut codec = TerminalCodec::new();
            let mut buffer = BytesMut::with_capacity(2048);
            codec.encode(black_box(&command), &mut buffer).unwrap();
            black_box(buffer);
        });
    });

    group.finish();
}

/// Benchmark rendering the countdown screen from scratch.
fn bench_render_countdown(c: &mut Criterion) {
    c.bench_function("render_countdown", |b| {
        b.iter(|| black_box(countdown_frame()));
    });
}

/// Benchmark parsing the unlock melody.
fn bench_parse_mml(c: &mut Criterion) {
    c.bench_function("parse_mml", |b| {
        b.iter(|| parse_mml(black_box("A#10 R10 A#10 R10 A#10 R50 A#10 R10 A#10 R10 A#10")).unwrap());
    });
}

/// Benchmark decoding a burst of modem lines during a ring.
fn bench_decode_modem_burst(c: &mut Criterion) {
    let mut burst = Vec::new();
    for _ in 0..32 {
        burst.extend_from_slice(b"\r\nRING\r\n\r\n+CLIP:\"0401234567\",129,,,,0\r\n^RSSI:17\r\n");
    }

    let mut group = c.benchmark_group("decode_modem");
    group.throughput(Throughput::Bytes(burst.len() as u64));

    group.bench_function("decode_and_classify", |b| {
        b.iter(|| {
            let mut codec = ModemCodec::new();
            let mut buffer = BytesMut::from(burst.as_slice());
            let mut count = 0;
            while let Some(line) = codec.decode(&mut buffer).unwrap() {
                black_box(parse_line(&line, "+358").unwrap());
                count += 1;
            }
            black_box(count);
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_encode_draw,
    bench_render_countdown,
    bench_parse_mml,
    bench_decode_modem_burst
);
criterion_main!(benches);
