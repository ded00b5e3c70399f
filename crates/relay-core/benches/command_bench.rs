//! Criterion benchmarks for command-frame and discovery encoding.
//!
//! Broadcast latency is dominated by socket writes, but the console encodes a
//! frame for every operator command, so encoding must stay negligible.
//!
//! Run with:
//! ```bash
//! cargo bench --package relay-core --bench command_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relay_core::protocol::command::encode_script;
use relay_core::protocol::discovery::{decode_datagram, encode_announcement};
use relay_core::{OiCommand, ServiceDescriptor};

fn bench_command_encode(c: &mut Criterion) {
    let drive = OiCommand::drive(-250, 1000).unwrap();
    c.bench_function("encode_drive", |b| b.iter(|| black_box(drive).encode()));

    let script = [
        OiCommand::Start,
        OiCommand::Safe,
        OiCommand::straight(300).unwrap(),
        OiCommand::Stop,
    ];
    c.bench_function("encode_script_4", |b| {
        b.iter(|| encode_script(black_box(&script)))
    });
}

fn bench_discovery(c: &mut Criterion) {
    let service = ServiceDescriptor::new("Roomba Controller", "_roomba._tcp", 1444)
        .with_metadata("fleet=lab");
    let bytes = encode_announcement(&service).unwrap();

    c.bench_function("encode_announcement", |b| {
        b.iter(|| encode_announcement(black_box(&service)).unwrap())
    });
    c.bench_function("decode_announcement", |b| {
        b.iter(|| decode_datagram(black_box(&bytes)).unwrap())
    });
}

criterion_group!(benches, bench_command_encode, bench_discovery);
criterion_main!(benches);
