//! Named, bounded, steppable knobs for live adjustment.
//!
//! Every knob holds an `f64`; on/off switches are knobs with a range of
//! [0, 1] and a step of 1.  Writes through `set`, `step_up`,
//! `step_down` and `randomize` are clamped to the knob's bounds, so an
//! interactive front end can push values around between frames
//! without the engine ever seeing anything out of range.

use crate::errors::{EngineError, Result};
use crate::evaluator::ShapeParameters;
use itertools::Itertools;
use num::clamp;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;

/// Identifies one knob.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Knob {
    /// Fade with the fixed-point vector kernel rather than per channel.
    VectorFade,
    /// Evaluate the map with the four-lane approximate sine.
    VectorSine,
    /// Advance time faster while the attractor is oversaturated.
    Speedup,
    /// Advance time with the frame clock.
    TimeFromDt,
    /// Derive a from time.
    AFromT,
    /// Derive b from time.
    BFromT,
    /// Derive c from time.
    CFromT,
    /// Derive d from time.
    DFromT,
    /// Multiplier on the per-frame step count.
    StepFactor,
    /// Multiplier on per-point brightness.
    Brightness,
    /// Per-frame decay factor.
    FadeFactor,
    /// Multiplier on the rate time advances.
    AnimSpeed,
    /// The time accumulator.
    T,
    /// Shape coefficient a.
    A,
    /// Shape coefficient b.
    B,
    /// Shape coefficient c.
    C,
    /// Shape coefficient d.
    D,
}

/// Static description of a knob.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Tunable {
    /// Identifier used on command lines.
    pub name: &'static str,
    /// Human readable label, padded for the overlay.
    pub label: &'static str,
    /// Decimal places shown.
    pub precision: usize,
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
    /// Increment of one step.
    pub step: f64,
    /// Value at start-up.
    pub default: f64,
}

const fn knob(
    name: &'static str,
    label: &'static str,
    precision: usize,
    min: f64,
    max: f64,
    step: f64,
    default: f64,
) -> Tunable {
    Tunable {
        name,
        label,
        precision,
        min,
        max,
        step,
        default,
    }
}

const fn switch(name: &'static str, label: &'static str) -> Tunable {
    knob(name, label, 0, 0.0, 1.0, 1.0, 1.0)
}

static TUNABLES: [Tunable; 17] = [
    switch("vector-fade", "vector fade"),
    switch("vector-sine", "vector sin"),
    switch("speedup", "skip fixed-point"),
    switch("t-from-dt", "t from dt"),
    switch("a-from-t", "a from t"),
    switch("b-from-t", "b from t"),
    switch("c-from-t", "c from t"),
    switch("d-from-t", "d from t"),
    knob("steps-factor", "steps factor", 2, 0.0, 3.0, 0.1, 1.0),
    knob("brightness", "brightness", 2, 0.0, 10.0, 0.05, 1.0),
    knob("fade", "fade factor", 2, 0.0, 1.0, 0.01, 0.95),
    knob("anim-speed", "animation speed", 2, 0.0, 3.0, 0.01, 1.0),
    knob("t", "t", 4, 0.0, 1e4, 0.0001, 0.0),
    knob("a", "a", 3, -10.0, 10.0, 0.001, 0.0),
    knob("b", "b", 3, -10.0, 10.0, 0.001, 0.0),
    knob("c", "c", 3, -10.0, 10.0, 0.001, 0.0),
    knob("d", "d", 3, -10.0, 10.0, 0.001, 0.0),
];

impl Knob {
    /// Every knob, in overlay order.
    pub const ALL: [Knob; 17] = [
        Knob::VectorFade,
        Knob::VectorSine,
        Knob::Speedup,
        Knob::TimeFromDt,
        Knob::AFromT,
        Knob::BFromT,
        Knob::CFromT,
        Knob::DFromT,
        Knob::StepFactor,
        Knob::Brightness,
        Knob::FadeFactor,
        Knob::AnimSpeed,
        Knob::T,
        Knob::A,
        Knob::B,
        Knob::C,
        Knob::D,
    ];

    /// The knob's bounds, step and label.
    pub fn tunable(self) -> &'static Tunable {
        &TUNABLES[self as usize]
    }

    /// Look a knob up by its command-line name.
    pub fn find(name: &str) -> Result<Knob> {
        Knob::ALL
            .iter()
            .cloned()
            .find(|k| k.tunable().name == name)
            .ok_or_else(|| EngineError::UnknownParameter(name.to_string()))
    }

    /// True for on/off knobs.
    pub fn is_switch(self) -> bool {
        self.tunable().step >= 1.0 && self.tunable().max <= 1.0
    }
}

/// Current value of every knob plus the overlay's selection cursor.
#[derive(Clone, Debug, PartialEq)]
pub struct Tunables {
    values: [f64; 17],
    selected: usize,
}

impl Default for Tunables {
    fn default() -> Self {
        let mut values = [0.0; 17];
        for (v, t) in values.iter_mut().zip(TUNABLES.iter()) {
            *v = t.default;
        }
        Tunables {
            values,
            selected: 0,
        }
    }
}

impl Tunables {
    /// Current value.
    pub fn get(&self, knob: Knob) -> f64 {
        self.values[knob as usize]
    }

    /// Current value of an on/off knob.
    pub fn flag(&self, knob: Knob) -> bool {
        self.get(knob) != 0.0
    }

    /// Set a knob, clamped to its bounds.  Non-finite values are
    /// ignored.  Returns the value actually stored.
    pub fn set(&mut self, knob: Knob, value: f64) -> f64 {
        if value.is_finite() {
            let t = knob.tunable();
            self.values[knob as usize] = clamp(value, t.min, t.max);
        }
        self.get(knob)
    }

    /// Turn an on/off knob on or off.
    pub fn set_flag(&mut self, knob: Knob, on: bool) {
        self.set(knob, if on { 1.0 } else { 0.0 });
    }

    /// Add `delta` without clamping.  Used for the time accumulator,
    /// which runs past its editing range as the animation plays.
    pub fn advance(&mut self, knob: Knob, delta: f64) {
        if delta.is_finite() {
            self.values[knob as usize] += delta;
        }
    }

    /// Move up by one step.
    pub fn step_up(&mut self, knob: Knob) -> f64 {
        let v = self.get(knob) + knob.tunable().step;
        self.set(knob, v)
    }

    /// Move down by one step.
    pub fn step_down(&mut self, knob: Knob) -> f64 {
        let v = self.get(knob) - knob.tunable().step;
        self.set(knob, v)
    }

    /// Jump to a random value on the knob's step grid.  On/off knobs
    /// are left alone.
    pub fn randomize<R: Rng>(&mut self, knob: Knob, rng: &mut R) -> f64 {
        if knob.is_switch() {
            return self.get(knob);
        }
        let t = knob.tunable();
        let v = Uniform::new_inclusive(t.min, t.max).sample(rng);
        self.set(knob, (v / t.step).floor() * t.step)
    }

    /// The four shape coefficients as currently set.
    pub fn shape(&self) -> ShapeParameters {
        ShapeParameters::new(
            self.get(Knob::A),
            self.get(Knob::B),
            self.get(Knob::C),
            self.get(Knob::D),
        )
    }

    /// Pin all four shape coefficients.
    pub fn set_shape(&mut self, shape: &ShapeParameters) {
        self.set(Knob::A, shape.a);
        self.set(Knob::B, shape.b);
        self.set(Knob::C, shape.c);
        self.set(Knob::D, shape.d);
    }

    /// The knob under the overlay cursor.
    pub fn selected(&self) -> Knob {
        Knob::ALL[self.selected]
    }

    /// Move the cursor down, wrapping to the top.
    pub fn select_next(&mut self) -> Knob {
        self.selected = (self.selected + 1) % Knob::ALL.len();
        self.selected()
    }

    /// Move the cursor up, wrapping to the bottom.
    pub fn select_prev(&mut self) -> Knob {
        self.selected = (self.selected + Knob::ALL.len() - 1) % Knob::ALL.len();
        self.selected()
    }

    /// One line per knob, the selected one marked with `>`.
    pub fn overlay_lines(&self) -> Vec<String> {
        Knob::ALL
            .iter()
            .enumerate()
            .map(|(i, k)| {
                let t = k.tunable();
                let marker = if i == self.selected { ">" } else { " " };
                format!("{} {:<17}: {:.*}", marker, t.label, t.precision, self.get(*k))
            })
            .collect()
    }

    /// The overlay as a single block of text.
    pub fn overlay(&self) -> String {
        self.overlay_lines().iter().join("\n")
    }
}
