//! Timekeeping around the engine: named profiling spans, a monotonic
//! clock, the 60 Hz frame pacer and a rolling average for fps readouts.

use itertools::Itertools;
use std::thread;
use std::time::{Duration, Instant};

/// Most spans a `Timers` will track.  Further names are ignored.
pub const MAX_TIMERS: usize = 8;

/// Start/stop profiling spans.  The engine brackets its fade pass with
/// `"fade"` and its attractor pass with `"attr"`.
pub trait SpanTimer {
    /// Begin (or restart) the named span.
    fn start(&mut self, name: &'static str);
    /// End the named span and accumulate its duration.
    fn stop(&mut self, name: &'static str);
    /// One line per span, optionally resetting the totals.
    fn report(&mut self, reset: bool) -> String;
}

/// Discards every span.
#[derive(Copy, Clone, Debug, Default)]
pub struct NoTimers;

impl SpanTimer for NoTimers {
    fn start(&mut self, _name: &'static str) {}
    fn stop(&mut self, _name: &'static str) {}
    fn report(&mut self, _reset: bool) -> String {
        String::new()
    }
}

#[derive(Clone, Debug)]
struct Span {
    name: &'static str,
    started: Instant,
    total: Duration,
    calls: u32,
}

/// Wall-clock spans, reported in the order they were first started.
#[derive(Clone, Debug, Default)]
pub struct Timers {
    spans: Vec<Span>,
}

impl Timers {
    /// An empty set of spans.
    pub fn new() -> Self {
        Timers { spans: Vec::new() }
    }

    /// A set with `names` registered up front so reports list them in
    /// that order.
    pub fn with_spans(names: &[&'static str]) -> Self {
        let mut timers = Timers::new();
        for &name in names {
            timers.start(name);
        }
        timers
    }

    /// Total time and call count of a span.
    pub fn totals(&self, name: &str) -> Option<(Duration, u32)> {
        self.spans
            .iter()
            .find(|s| s.name == name)
            .map(|s| (s.total, s.calls))
    }
}

impl SpanTimer for Timers {
    fn start(&mut self, name: &'static str) {
        let now = Instant::now();
        if let Some(span) = self.spans.iter_mut().find(|s| s.name == name) {
            span.started = now;
            return;
        }
        if self.spans.len() < MAX_TIMERS {
            self.spans.push(Span {
                name,
                started: now,
                total: Duration::from_secs(0),
                calls: 0,
            });
        }
    }

    fn stop(&mut self, name: &'static str) {
        let now = Instant::now();
        if let Some(span) = self.spans.iter_mut().find(|s| s.name == name) {
            span.total += now.duration_since(span.started);
            span.calls += 1;
        }
    }

    fn report(&mut self, reset: bool) -> String {
        let report = self
            .spans
            .iter()
            .map(|s| {
                let total = s.total.as_secs_f64() * 1000.0;
                let avg = if s.calls == 0 {
                    0.0
                } else {
                    total / f64::from(s.calls)
                };
                format!(
                    "{}: {:.3} ms avg ({:.1} ms total, {} calls)\n",
                    s.name, avg, total, s.calls
                )
            })
            .join("");
        if reset {
            for s in self.spans.iter_mut() {
                s.total = Duration::from_secs(0);
                s.calls = 0;
            }
        }
        report
    }
}

/// A monotonic clock that can also put the calling thread to sleep.
pub trait Clock {
    /// Time since some fixed point in the past.
    fn now(&self) -> Duration;
    /// Block for about `duration`.
    fn sleep(&self, duration: Duration);
}

/// The operating system's monotonic clock.
#[derive(Copy, Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// A clock reading zero now.
    pub fn new() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration)
    }
}

/// Decides when the next frame is due.  Sleeps in slices of at most a
/// millisecond while more than a millisecond remains and leaves the
/// last millisecond to the caller's polling, so frames start close to
/// their deadline without ever starting early.
#[derive(Debug)]
pub struct FramePacer<C: Clock> {
    clock: C,
    interval: Duration,
    last: Duration,
}

/// One millisecond: the sleep slice and the busy-wait window.
const SLICE: Duration = Duration::from_millis(1);

impl<C: Clock> FramePacer<C> {
    /// Pace frames `interval` apart, starting now.
    pub fn new(clock: C, interval: Duration) -> Self {
        let last = clock.now();
        FramePacer {
            clock,
            interval,
            last,
        }
    }

    /// Pace at `fps` frames per second.
    pub fn at_rate(clock: C, fps: u32) -> Self {
        FramePacer::new(clock, Duration::from_secs(1) / fps.max(1))
    }

    /// The clock being paced against.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// One idle tick.  Returns the real time elapsed since the previous
    /// frame once the next one is due, `None` while it is not.
    pub fn tick(&mut self) -> Option<Duration> {
        let due = self.last + self.interval;
        let mut now = self.clock.now();
        if due > now + SLICE {
            let remaining = due - now - SLICE;
            self.clock.sleep(remaining.min(SLICE));
            now = self.clock.now();
        }
        if now >= due {
            let dt = now - self.last;
            self.last = now;
            Some(dt)
        } else {
            None
        }
    }

    /// Block until the next frame is due and return its `dt`.
    pub fn wait(&mut self) -> Duration {
        loop {
            if let Some(dt) = self.tick() {
                return dt;
            }
        }
    }
}

/// Mean of the last `window` samples.
#[derive(Clone, Debug)]
pub struct RollingAverage {
    samples: Vec<f64>,
    cursor: usize,
    window: usize,
    total: f64,
}

impl RollingAverage {
    /// Average over `window` samples (at least one).
    pub fn new(window: usize) -> Self {
        RollingAverage {
            samples: Vec::with_capacity(window.max(1)),
            cursor: 0,
            window: window.max(1),
            total: 0.0,
        }
    }

    /// Add a sample.  Non-finite samples are dropped and negative ones
    /// count as zero.
    pub fn add(&mut self, v: f64) {
        if !v.is_finite() {
            return;
        }
        let v = v.max(0.0);
        if self.samples.len() < self.window {
            self.samples.push(v);
            self.total += v;
        } else {
            self.total += v - self.samples[self.cursor];
            self.samples[self.cursor] = v;
        }
        self.cursor = (self.cursor + 1) % self.window;
    }

    /// Current mean, zero before the first sample.
    pub fn get(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.total / self.samples.len() as f64
        }
    }
}
