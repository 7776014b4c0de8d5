#[macro_use]
extern crate criterion;
extern crate dejong;

use criterion::{black_box, Criterion};
use dejong::{AccumulationBuffer, ChannelDepth, Evaluation, FadeStrategy, ShapeParameters, TrajectoryState};

const STEPS: usize = 10_000;

fn trace(c: &mut Criterion, name: &str, evaluation: Evaluation) {
    let shape = ShapeParameters::new(1.4, -2.3, 2.4, -2.1);
    let buffer = AccumulationBuffer::new(512, ChannelDepth::Sixteen).unwrap();
    c.bench_function(name, move |b| {
        b.iter(|| {
            let mut state = TrajectoryState::at(0.1, 0.2);
            evaluation.trace(&shape, &mut state, STEPS, black_box(1250.0), &buffer);
            state.over
        })
    });
}

fn fade(c: &mut Criterion, name: &str, strategy: FadeStrategy) {
    let mut buffer = AccumulationBuffer::new(512, ChannelDepth::Sixteen).unwrap();
    for offset in 0..512 * 512 {
        buffer.deposit(offset, [40_000, 30_000, 65_535]);
    }
    // 0.9999 keeps the texture from draining to zero over the run.
    c.bench_function(name, move |b| {
        b.iter(|| buffer.fade(black_box(0.9999), strategy))
    });
}

fn attractor(c: &mut Criterion) {
    trace(c, "trace precise 10k", Evaluation::Precise);
    trace(c, "trace fast 10k", Evaluation::Fast);
}

fn fading(c: &mut Criterion) {
    fade(c, "fade vectorized 512", FadeStrategy::Vectorized);
    fade(c, "fade scalar 512", FadeStrategy::Scalar);
}

criterion_group!(benches, attractor, fading);
criterion_main!(benches);
