#![deny(missing_docs)]
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Peter de Jong attractor renderer
//!
//! The de Jong map takes a point on the plane and four coefficients
//! and produces the next point:
//!
//! ```text
//! x2 = sin(a * y1) - cos(b * x1)
//! y2 = sin(c * x1) - cos(d * y1)
//! ```
//!
//! Iterated millions of times, the points trace out a strange
//! attractor.  This crate renders it as a long exposure: every frame a
//! pool of workers runs fresh trajectories and adds light into a
//! shared texture, the texture decays a little between frames, and the
//! coefficients drift slowly with time so the attractor morphs.  When
//! most of a frame's points land on cells that are already saturated
//! the attractor has collapsed onto something small and dull, and time
//! is sped up to get past it.
//!
//! `FrameController` is the entry point.  Displaying the texture,
//! handling input and drawing overlays are left to the caller, which
//! gets a `Frame` snapshot after each render and edits `Tunables`
//! between frames.

extern crate crossbeam;
extern crate itertools;
extern crate num;
extern crate rand;
#[macro_use]
extern crate tracing;

pub mod buffer;
pub mod controller;
pub mod errors;
pub mod evaluator;
pub mod planes;
pub mod pool;
pub mod simd;
pub mod timing;
pub mod tunables;

pub use buffer::{AccumulationBuffer, ChannelDepth, FadeStrategy, Frame};
pub use controller::{EngineConfig, FrameController, FrameStatistics};
pub use errors::{EngineError, Result};
pub use evaluator::{Evaluation, ShapeParameters, TrajectoryState};
pub use timing::{FramePacer, SpanTimer, SystemClock, Timers};
pub use tunables::{Knob, Tunables};
