// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The frame controller owns the engine: the knobs, the accumulation
//! buffer and the worker pool.  Each call to `render` produces one
//! frame:
//!
//! 1. fade the buffer,
//! 2. derive the shape coefficients from the time accumulator,
//! 3. reseed the workers and run them through both barriers,
//! 4. sum their saturation counts into a speed multiplier,
//! 5. advance time.
//!
//! A frame always runs to completion; stopping the engine means not
//! asking for another one.

use crate::buffer::{AccumulationBuffer, ChannelDepth, FadeStrategy, Frame};
use crate::errors::{EngineError, Result};
use crate::evaluator::{Evaluation, ShapeParameters};
use crate::pool::{FrameJob, WorkerPool};
use crate::timing::SpanTimer;
use crate::tunables::{Knob, Tunables};
use num::clamp;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Duration;

/// Fastest the animation runs when the attractor is fully saturated.
pub const MAX_SPEED: f64 = 30.0;

/// Share of a frame's steps that may saturate before time speeds up.
pub const OVER_THRESHOLD: f64 = 0.6;

/// Time units the accumulator advances per second at normal speed.
pub const TIME_SCALE: f64 = 0.01;

/// Static engine configuration.  Everything that can change between
/// frames lives in `Tunables` instead.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineConfig {
    /// Cells per side of the accumulation texture.
    pub texture_size: usize,
    /// Worker threads.
    pub threads: usize,
    /// Channel width of the texture.
    pub depth: ChannelDepth,
    /// Steps per frame at the base resolution and a steps factor of one.
    pub base_steps: usize,
    /// Cell count the base step count is calibrated for.
    pub base_resolution: usize,
    /// Total light of one frame at the base step count.  Divided by the
    /// step count to get the light of a step.
    pub base_brightness: f64,
    /// Seed for trajectory reseeding; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            texture_size: 896,
            threads: 32,
            depth: ChannelDepth::Sixteen,
            base_steps: 800_000,
            base_resolution: 1440 * 1440,
            base_brightness: 1e9,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Reject configurations the engine cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.texture_size == 0 {
            return Err(EngineError::InvalidTextureSize(self.texture_size));
        }
        if self.threads == 0 {
            return Err(EngineError::InvalidThreadCount(self.threads));
        }
        if self.base_resolution == 0 {
            return Err(EngineError::InvalidArgument(
                "base resolution must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// What one frame measured.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FrameStatistics {
    /// Plotted steps that found their cell's blue channel saturated.
    pub over_total: u64,
    /// Steps requested for the frame.
    pub steps: usize,
    /// Multiplier applied to the time advance.
    pub speed: f64,
}

/// Steps per frame for a texture of `size` cells per side, keeping the
/// density of plotted points independent of resolution.
pub fn compute_steps(
    base_steps: usize,
    base_resolution: usize,
    size: usize,
    step_factor: f64,
) -> usize {
    let cells = (size * size) as f64;
    (base_steps as f64 * cells / base_resolution as f64 * step_factor.max(0.0)) as usize
}

/// How much faster time should run given a frame's saturation count.
/// One while at most `OVER_THRESHOLD` of the steps saturated, rising
/// linearly to `MAX_SPEED` when every step did.
pub fn speed_multiplier(over_total: u64, steps: usize) -> f64 {
    let steps = steps as f64;
    let over = over_total as f64;
    let threshold = OVER_THRESHOLD * steps;
    if over <= threshold {
        return 1.0;
    }
    let speed = 1.0 + (MAX_SPEED - 1.0) * (over - threshold) / (steps - threshold);
    clamp(speed, 1.0, MAX_SPEED)
}

/// The engine.
pub struct FrameController {
    config: EngineConfig,
    tunables: Tunables,
    buffer: Arc<AccumulationBuffer>,
    pool: WorkerPool,
    rng: StdRng,
    steps: usize,
    last: Option<FrameStatistics>,
}

impl FrameController {
    /// Allocate the buffer and start the workers.
    pub fn new(config: EngineConfig, tunables: Tunables) -> Result<FrameController> {
        config.validate()?;
        let buffer = Arc::new(AccumulationBuffer::new(config.texture_size, config.depth)?);
        let pool = WorkerPool::new(config.threads)?;
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut controller = FrameController {
            config,
            tunables,
            buffer,
            pool,
            rng,
            steps: 0,
            last: None,
        };
        controller.refresh_steps();
        Ok(controller)
    }

    /// The static configuration, with the current texture size.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Current knob values.
    pub fn tunables(&self) -> &Tunables {
        &self.tunables
    }

    /// Knobs for editing between frames.  Any in-range value is fine.
    pub fn tunables_mut(&mut self) -> &mut Tunables {
        &mut self.tunables
    }

    /// Set one knob, clamped to its bounds.  A new steps factor takes
    /// effect on `steps()` straight away.
    pub fn set(&mut self, knob: Knob, value: f64) -> f64 {
        let stored = self.tunables.set(knob, value);
        if knob == Knob::StepFactor {
            self.refresh_steps();
        }
        stored
    }

    /// Jump a knob to a random value on its step grid.  Draws from the
    /// same stream as the reseeding, advancing it.
    pub fn randomize(&mut self, knob: Knob) -> f64 {
        self.tunables.randomize(knob, &mut self.rng)
    }

    /// Steps the next frame will run.
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Steps each worker runs; the remainder of an uneven split is dropped.
    pub fn steps_per_worker(&self) -> usize {
        self.steps / self.pool.threads()
    }

    /// Worker count.
    pub fn threads(&self) -> usize {
        self.pool.threads()
    }

    /// The time accumulator.
    pub fn time(&self) -> f64 {
        self.tunables.get(Knob::T)
    }

    /// The shape coefficients used by the last frame.
    pub fn shape(&self) -> ShapeParameters {
        self.tunables.shape()
    }

    /// Statistics of the last frame rendered.
    pub fn last_frame(&self) -> Option<FrameStatistics> {
        self.last
    }

    /// Read-only view of the texture between frames.
    pub fn buffer(&self) -> &AccumulationBuffer {
        &self.buffer
    }

    /// Copy the texture for display.
    pub fn snapshot(&self) -> Frame {
        self.buffer.snapshot()
    }

    /// Replace the texture with a zeroed one of `size` cells per side
    /// and rescale the step count.  Runs between frames, so no worker
    /// can still be writing into the old texture.
    pub fn resize(&mut self, size: usize) -> Result<()> {
        if size == self.buffer.size() {
            return Ok(());
        }
        self.buffer = Arc::new(AccumulationBuffer::new(size, self.config.depth)?);
        self.config.texture_size = size;
        self.refresh_steps();
        Ok(())
    }

    /// Produce one frame.  `dt` is the real time since the previous
    /// frame.  The fade pass is timed as `"fade"`, everything else as
    /// `"attr"`.
    pub fn render<T: SpanTimer>(&mut self, dt: Duration, timers: &mut T) -> FrameStatistics {
        timers.start("fade");
        self.fade();
        timers.stop("fade");

        timers.start("attr");
        self.derive_shape();
        self.refresh_steps();

        let job = FrameJob {
            shape: self.tunables.shape(),
            evaluation: if self.tunables.flag(Knob::VectorSine) {
                Evaluation::Fast
            } else {
                Evaluation::Precise
            },
            iterations: self.steps_per_worker(),
            brightness: self.brightness(),
            buffer: Arc::clone(&self.buffer),
        };
        let over_total = self.pool.run_frame(job, &mut self.rng);

        let speed = if self.tunables.flag(Knob::Speedup) {
            speed_multiplier(over_total, self.steps)
        } else {
            1.0
        };
        if self.tunables.flag(Knob::TimeFromDt) {
            let delta =
                TIME_SCALE * dt.as_secs_f64() * speed * self.tunables.get(Knob::AnimSpeed);
            self.tunables.advance(Knob::T, delta);
        }
        timers.stop("attr");

        let stats = FrameStatistics {
            over_total,
            steps: self.steps,
            speed,
        };
        trace!(over = over_total, steps = self.steps, speed, "frame");
        self.last = Some(stats);
        stats
    }

    fn fade(&mut self) {
        let factor = self.tunables.get(Knob::FadeFactor);
        let strategy = if self.tunables.flag(Knob::VectorFade) {
            FadeStrategy::Vectorized
        } else {
            FadeStrategy::Scalar
        };
        match Arc::get_mut(&mut self.buffer) {
            Some(buffer) => buffer.fade(factor, strategy),
            None => warn!("accumulation buffer still shared, fade skipped"),
        }
    }

    fn derive_shape(&mut self) {
        let t = self.time();
        let derived = ShapeParameters::from_time(t);
        let axes = [
            (Knob::AFromT, Knob::A, derived.a),
            (Knob::BFromT, Knob::B, derived.b),
            (Knob::CFromT, Knob::C, derived.c),
            (Knob::DFromT, Knob::D, derived.d),
        ];
        for &(switch, knob, value) in axes.iter() {
            if self.tunables.flag(switch) {
                self.tunables.set(knob, value);
            }
        }
    }

    fn refresh_steps(&mut self) {
        let steps = compute_steps(
            self.config.base_steps,
            self.config.base_resolution,
            self.buffer.size(),
            self.tunables.get(Knob::StepFactor),
        );
        if steps != self.steps {
            debug!(steps, size = self.buffer.size(), "steps recomputed");
            self.steps = steps;
        }
    }

    // Light per plotted step.  Scaled by the step factor so the total
    // light of a frame stays put when the step count changes.  The buffer
    // counts at 16 bits for every depth, so depth plays no part.
    fn brightness(&self) -> f64 {
        let step_factor = self.tunables.get(Knob::StepFactor);
        if step_factor <= 0.0 {
            return 0.0;
        }
        self.tunables.get(Knob::Brightness) * self.config.base_brightness
            / self.config.base_steps as f64
            / step_factor
    }
}
