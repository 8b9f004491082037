//! Criterion benchmarks for the command encoder and line framing.
//!
//! Movement commands are re-sent on every input change and on every refresh
//! tick, so encode + frame sits on the input hot path.
//!
//! Run with:
//! ```bash
//! cargo bench --package rover-core --bench encoder_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rover_core::protocol::codec::{
    decode_answer, encode_accessory, encode_camera_reset, encode_connect, encode_move,
    encode_move_stop, encode_set_speed, frame_command,
};
use rover_core::protocol::messages::{
    AccessoryAction, AccessoryKind, ControlCommand, DirectionToken, Motor,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn fixtures() -> Vec<(&'static str, ControlCommand)> {
    vec![
        ("move", encode_move(&[DirectionToken::Forward, DirectionToken::Left])),
        ("move_stop", encode_move_stop(&[Motor::Wheels])),
        ("set_speed", encode_set_speed(0.8234)),
        ("set_cam", encode_camera_reset()),
        (
            "laser_ctrl",
            encode_accessory(AccessoryKind::Laser, AccessoryAction::On, Some(80)),
        ),
        ("connect", encode_connect("6f1c2a8e-0000-4000-8000-000000000000", "sha")),
    ]
}

const BIND_ACK: &[u8] =
    b"{\"server_id\":\"srv\",\"client_id\":\"c\",\"rover_id\":\"sha\",\"msg\":\"ok\"}\n";

const ROVER_LIST: &[u8] = b"{\"server_id\":\"srv\",\"rovers\":[{\"rover_id\":\"sha\",\"description\":\"a\"},{\"rover_id\":\"tal\",\"description\":\"b\"}]}\n";

// ── Benchmark groups ──────────────────────────────────────────────────────────

/// Benchmarks `frame_command` for each command shape.
fn bench_frame(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_command");
    for (name, command) in fixtures() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &command, |b, cmd| {
            b.iter(|| frame_command(black_box(7), black_box(cmd)))
        });
    }
    group.finish();
}

/// Benchmarks `decode_answer` plus classification for handshake answers.
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode_answer");
    for (name, line) in [("bind_ack", BIND_ACK), ("rover_list", ROVER_LIST)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &line, |b, line| {
            b.iter(|| {
                decode_answer(black_box(line))
                    .ok()
                    .and_then(|answer| answer.kind().ok())
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_frame, bench_decode);
criterion_main!(benches);
