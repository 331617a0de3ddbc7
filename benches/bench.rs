use criterion::{criterion_group, criterion_main, Criterion};
use kaas::{AnalogPin, Decoder, OutputSink, PlaybackEngine, PlayerConfig, Timer};
use std::hint::black_box;

struct Discard;

impl OutputSink for Discard {
    fn write(&mut self, pin: AnalogPin, level: u8) {
        black_box((pin, level));
    }
}

struct NoWait;

impl Timer for NoWait {
    fn wait_micros(&mut self, _micros: u32) {}
}

fn encoded_second() -> Vec<u8> {
    // One second at 8 kHz.
    (0..4000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 24) as u8).collect()
}

fn decode_buffer(c: &mut Criterion) {
    let data = encoded_second();
    c.bench_function("decode_buffer", |b| {
        b.iter(|| {
            let mut decoder = Decoder::new();
            black_box(decoder.decode_buffer(black_box(&data)))
        })
    });
}

fn engine_run(c: &mut Criterion) {
    let data = encoded_second();
    c.bench_function("engine_run_until_idle", |b| {
        b.iter(|| {
            let mut engine = PlaybackEngine::new(Discard, PlayerConfig::default());
            engine.play(data.clone());
            black_box(engine.run_until_idle(NoWait))
        })
    });
}

criterion_group!(benches, decode_buffer, engine_run);
criterion_main!(benches);
