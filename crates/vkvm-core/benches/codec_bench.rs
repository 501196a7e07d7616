//! Criterion benchmarks for the VKVM datagram codec.
//!
//! The burst channel encodes every captured input event on the hot path,
//! so encode/decode latency matters at mouse-move rates (hundreds of
//! events per second, times the redundancy factor).
//!
//! Run with:
//! ```bash
//! cargo bench --package vkvm-core --bench codec_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vkvm_core::event::{InputEvent, ScrollAxis, TimedEvent};
use vkvm_core::protocol::datagram::{decode_datagram, encode_datagram, Datagram};

fn make_mouse_move() -> Datagram {
    Datagram::Event {
        seq: 12345,
        event: TimedEvent::new(InputEvent::MouseMove { dx: 7, dy: -3 }, 1_700_000_000_000),
    }
}

fn make_mouse_button() -> Datagram {
    Datagram::Event {
        seq: 12346,
        event: TimedEvent::new(
            InputEvent::MouseButton {
                button: 1,
                pressed: true,
            },
            1_700_000_000_001,
        ),
    }
}

fn make_scroll() -> Datagram {
    Datagram::Event {
        seq: 12347,
        event: TimedEvent::new(
            InputEvent::MouseWheel {
                delta: -120,
                axis: ScrollAxis::Vertical,
            },
            1_700_000_000_002,
        ),
    }
}

fn make_key() -> Datagram {
    Datagram::Event {
        seq: 12348,
        event: TimedEvent::new(
            InputEvent::Key {
                code: 0x41,
                pressed: true,
                modifiers: 0x0004,
            },
            1_700_000_000_003,
        ),
    }
}

fn make_register() -> Datagram {
    Datagram::Register {
        ts: 1_700_000_000_004,
    }
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    let cases = [
        ("mouse_move", make_mouse_move()),
        ("mouse_button", make_mouse_button()),
        ("scroll", make_scroll()),
        ("key", make_key()),
        ("register", make_register()),
    ];
    for (name, dgram) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &dgram, |b, d| {
            b.iter(|| encode_datagram(black_box(d)))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    let cases = [
        ("mouse_move", encode_datagram(&make_mouse_move())),
        ("mouse_button", encode_datagram(&make_mouse_button())),
        ("scroll", encode_datagram(&make_scroll())),
        ("key", encode_datagram(&make_key())),
        ("register", encode_datagram(&make_register())),
    ];
    for (name, bytes) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), &bytes, |b, data| {
            b.iter(|| decode_datagram(black_box(data)).unwrap())
        });
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_decode);
criterion_main!(benches);
