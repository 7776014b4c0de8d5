//! The Peter de Jong map and the per-frame trajectory trace.
//!
//! ```text
//! x2 = sin(a * y1) - cos(b * x1)
//! y2 = sin(c * x1) - cos(d * y1)
//! ```
//!
//! Two evaluation strategies exist.  `Precise` calls the double
//! precision libm functions.  `Fast` rewrites both cosines as
//! `sin(θ + π/2)` and evaluates all four sines in a single call to the
//! four-lane approximate sine.  Both produce points in [-2, 2]².

use crate::buffer::AccumulationBuffer;
use crate::simd;
use std::f32::consts::FRAC_PI_2;

/// Steps of every trace evaluated but not plotted, while a freshly
/// seeded point falls onto the attractor.
pub const WARMUP_ITERATIONS: usize = 11;

/// Amplitude of the time-derived shape parameters.
pub const AMPLITUDE: f64 = 4.0;

/// Frequencies of a, b, c and d relative to the time accumulator.
pub const FREQUENCIES: [f64; 4] = [1.03, 1.07, 1.09, 1.13];

/// The four coefficients of the map.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ShapeParameters {
    /// Scales y inside the first sine.
    pub a: f64,
    /// Scales x inside the first cosine.
    pub b: f64,
    /// Scales x inside the second sine.
    pub c: f64,
    /// Scales y inside the second cosine.
    pub d: f64,
}

impl ShapeParameters {
    /// Build from explicit coefficients.
    pub fn new(a: f64, b: f64, c: f64, d: f64) -> Self {
        ShapeParameters { a, b, c, d }
    }

    /// The animated shape at time `t`.  Every coefficient lies in [-4, 4].
    pub fn from_time(t: f64) -> Self {
        let [fa, fb, fc, fd] = FREQUENCIES;
        ShapeParameters {
            a: AMPLITUDE * (t * fa).sin(),
            b: AMPLITUDE * (t * fb).sin(),
            c: AMPLITUDE * (t * fc).sin(),
            d: AMPLITUDE * (t * fd).sin(),
        }
    }

    /// One step of the map in double precision.
    #[inline]
    pub fn step(&self, x1: f64, y1: f64) -> (f64, f64) {
        (
            (self.a * y1).sin() - (self.b * x1).cos(),
            (self.c * x1).sin() - (self.d * y1).cos(),
        )
    }
}

/// The same coefficients narrowed to single precision for the fast path.
#[derive(Copy, Clone, Debug)]
struct NarrowShape {
    a: f32,
    b: f32,
    c: f32,
    d: f32,
}

impl NarrowShape {
    fn new(shape: &ShapeParameters) -> Self {
        NarrowShape {
            a: shape.a as f32,
            b: shape.b as f32,
            c: shape.c as f32,
            d: shape.d as f32,
        }
    }

    #[inline]
    fn step(&self, x1: f32, y1: f32) -> (f32, f32) {
        let s = simd::sin4([
            self.a * y1,
            self.b * x1 + FRAC_PI_2,
            self.c * x1,
            self.d * y1 + FRAC_PI_2,
        ]);
        (s[0] - s[1], s[2] - s[3])
    }
}

/// One step of the map through the approximate single-precision path.
pub fn step_fast(shape: &ShapeParameters, x1: f64, y1: f64) -> (f64, f64) {
    let (x2, y2) = NarrowShape::new(shape).step(x1 as f32, y1 as f32);
    (f64::from(x2), f64::from(y2))
}

/// A worker's private position on the attractor.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct TrajectoryState {
    /// Current x.
    pub x: f64,
    /// Current y.
    pub y: f64,
    /// Plotted steps this frame that left their cell's blue saturated.
    pub over: u64,
}

impl TrajectoryState {
    /// A fresh trajectory starting at (x, y).
    pub fn at(x: f64, y: f64) -> Self {
        TrajectoryState { x, y, over: 0 }
    }
}

/// How the map is evaluated for a frame.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Evaluation {
    /// libm sin and cos in f64.
    Precise,
    /// Four-lane approximate sine in f32.
    Fast,
}

impl Evaluation {
    /// Advance `state` by `iterations` steps, plotting every step after
    /// the warm-up into `buffer`.  `state.over` is reset and then counts
    /// the plotted steps that found their cell saturated.
    pub fn trace(
        self,
        shape: &ShapeParameters,
        state: &mut TrajectoryState,
        iterations: usize,
        brightness: f64,
        buffer: &AccumulationBuffer,
    ) {
        match self {
            Evaluation::Precise => trace_precise(shape, state, iterations, brightness, buffer),
            Evaluation::Fast => trace_fast(shape, state, iterations, brightness, buffer),
        }
    }
}

fn trace_precise(
    shape: &ShapeParameters,
    state: &mut TrajectoryState,
    iterations: usize,
    brightness: f64,
    buffer: &AccumulationBuffer,
) {
    let (mut x1, mut y1) = (state.x, state.y);
    let mut over = 0;
    for i in 0..iterations {
        let (x2, y2) = shape.step(x1, y1);
        if i >= WARMUP_ITERATIONS && buffer.plot((x1, y1), (x2, y2), brightness) {
            over += 1;
        }
        x1 = x2;
        y1 = y2;
    }
    *state = TrajectoryState { x: x1, y: y1, over };
}

fn trace_fast(
    shape: &ShapeParameters,
    state: &mut TrajectoryState,
    iterations: usize,
    brightness: f64,
    buffer: &AccumulationBuffer,
) {
    let narrow = NarrowShape::new(shape);
    let (mut x1, mut y1) = (state.x as f32, state.y as f32);
    let mut over = 0;
    for i in 0..iterations {
        let (x2, y2) = narrow.step(x1, y1);
        if i >= WARMUP_ITERATIONS
            && buffer.plot(
                (f64::from(x1), f64::from(y1)),
                (f64::from(x2), f64::from(y2)),
                brightness,
            )
        {
            over += 1;
        }
        x1 = x2;
        y1 = y2;
    }
    *state = TrajectoryState {
        x: f64::from(x1),
        y: f64::from(y1),
        over,
    };
}
