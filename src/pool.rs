// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A fixed pool of long-lived attractor workers driven in lockstep.
//!
//! Each frame the controlling thread publishes a `FrameJob`, reseeds
//! every worker's trajectory and then meets the workers at two
//! barriers.  Crossing `frame_start` makes the job and the seeds
//! visible to the workers; crossing `frame_end` makes every buffer
//! write and every `over` count visible to the controller.  Between
//! the two, workers touch nothing shared except the accumulation
//! buffer.
//!
//! Workers take their own handle on the buffer from the job and drop
//! it before `frame_end`, and the controller clears the job right
//! after, so between frames the controller holds the only reference
//! and may fade or replace the buffer.
//!
//! A worker does not touch the barriers until the pool has started
//! all of its siblings and sent it a go-ahead on a channel.  If a
//! sibling fails to start, the channel is dropped instead, and the
//! workers already running see it close and exit.

use crate::buffer::AccumulationBuffer;
use crate::errors::{EngineError, Result};
use crate::evaluator::{Evaluation, ShapeParameters, TrajectoryState};
use crossbeam::channel::{self, Receiver};
use crossbeam::utils::CachePadded;
use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::process;
use std::sync::{Arc, Barrier, Mutex, MutexGuard, RwLock};
use std::thread::{self, JoinHandle};

/// Everything a worker needs to render its share of one frame.
#[derive(Clone, Debug)]
pub struct FrameJob {
    /// Coefficients of the map for this frame.
    pub shape: ShapeParameters,
    /// Evaluation strategy for this frame.
    pub evaluation: Evaluation,
    /// Steps each worker runs, warm-up included.
    pub iterations: usize,
    /// Channel contribution of a unit move.
    pub brightness: f64,
    /// Where the steps are plotted.
    pub buffer: Arc<AccumulationBuffer>,
}

#[derive(Clone, Debug)]
enum Job {
    Idle,
    Render(FrameJob),
    Shutdown,
    #[cfg(test)]
    Panic,
}

type Work = Box<dyn FnOnce() + Send + 'static>;

struct Shared {
    frame_start: Barrier,
    frame_end: Barrier,
    job: RwLock<Job>,
    // Each slot is locked by exactly one side at a time; the barriers
    // decide which.
    states: Vec<CachePadded<Mutex<TrajectoryState>>>,
}

// A poisoned lock means a worker panicked, and that aborts the process
// before anybody else can look at the lock.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn current_job(shared: &Shared) -> Job {
    shared
        .job
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .clone()
}

fn publish(shared: &Shared, job: Job) {
    *shared
        .job
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner()) = job;
}

/// The worker threads plus the barriers they share with the controller.
pub struct WorkerPool {
    shared: Arc<Shared>,
    handles: Vec<JoinHandle<()>>,
    seeds: Uniform<f64>,
}

impl WorkerPool {
    /// Start `threads` workers.  They park on the frame-start barrier
    /// until the first call to `run_frame`.
    pub fn new(threads: usize) -> Result<WorkerPool> {
        WorkerPool::start(threads, |index, work| {
            thread::Builder::new()
                .name(format!("dejong-worker-{}", index))
                .spawn(work)
        })
    }

    fn start<S>(threads: usize, mut spawn: S) -> Result<WorkerPool>
    where
        S: FnMut(usize, Work) -> io::Result<JoinHandle<()>>,
    {
        if threads == 0 {
            return Err(EngineError::InvalidThreadCount(threads));
        }
        let shared = Arc::new(Shared {
            frame_start: Barrier::new(threads + 1),
            frame_end: Barrier::new(threads + 1),
            job: RwLock::new(Job::Idle),
            states: (0..threads)
                .map(|_| CachePadded::new(Mutex::new(TrajectoryState::default())))
                .collect(),
        });

        let (go, ready) = channel::unbounded();
        let mut handles = Vec::with_capacity(threads);
        for index in 0..threads {
            let worker_shared = Arc::clone(&shared);
            let worker_ready = ready.clone();
            let work: Work = Box::new(move || worker_entry(&worker_shared, index, &worker_ready));
            match spawn(index, work) {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(started = index, "worker pool only partially started");
                    drop(go);
                    for handle in handles {
                        let _ = handle.join();
                    }
                    return Err(EngineError::Spawn(e));
                }
            }
        }
        for _ in 0..threads {
            // `ready` is still alive here, so a send cannot fail.
            let _ = go.send(());
        }
        info!(threads, "attractor workers started");
        Ok(WorkerPool {
            shared,
            handles,
            seeds: Uniform::new_inclusive(-1.0, 1.0),
        })
    }

    /// Number of workers.
    pub fn threads(&self) -> usize {
        self.handles.len()
    }

    /// Render one frame: reseed every trajectory from `rng`, release the
    /// workers, wait for all of them to finish and return the summed
    /// `over` counts.  Blocks for the duration of the frame.
    pub fn run_frame<R: Rng>(&self, job: FrameJob, rng: &mut R) -> u64 {
        // Without fresh starting points every worker's orbit eventually
        // collapses onto the same one.
        for slot in self.shared.states.iter() {
            let mut state = lock(slot);
            *state = TrajectoryState::at(self.seeds.sample(rng), self.seeds.sample(rng));
        }
        publish(&self.shared, Job::Render(job));

        self.shared.frame_start.wait();
        self.shared.frame_end.wait();

        publish(&self.shared, Job::Idle);
        self.shared.states.iter().map(|slot| lock(slot).over).sum()
    }

    /// Position and over count of one worker after the last frame.
    pub fn trajectory(&self, index: usize) -> TrajectoryState {
        *lock(&self.shared.states[index])
    }
}

impl Drop for WorkerPool {
    // A frame is never interrupted: `run_frame` only returns once it is
    // complete, so by now every worker is parked at frame_start.
    fn drop(&mut self) {
        publish(&self.shared, Job::Shutdown);
        self.shared.frame_start.wait();
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        info!("attractor workers stopped");
    }
}

fn worker_entry(shared: &Shared, index: usize, ready: &Receiver<()>) {
    if ready.recv().is_err() {
        return;
    }
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| worker_loop(shared, index)));
    if outcome.is_err() {
        // The barriers need every worker every frame; without this one
        // the rest of the pool would wait forever.
        error!(worker = index, "attractor worker panicked, aborting");
        process::abort();
    }
}

fn worker_loop(shared: &Shared, index: usize) {
    loop {
        shared.frame_start.wait();
        match current_job(shared) {
            Job::Shutdown => return,
            Job::Idle => {}
            #[cfg(test)]
            Job::Panic => panic!("worker {} told to fail", index),
            Job::Render(job) => {
                let mut state = lock(&shared.states[index]);
                job.evaluation.trace(
                    &job.shape,
                    &mut state,
                    job.iterations,
                    job.brightness,
                    &job.buffer,
                );
            }
        }
        shared.frame_end.wait();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ChannelDepth;
    use assert_cmd::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::env;
    use std::process::Command;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const FAILING_CHILD: &str = "DEJONG_FAILING_WORKER_CHILD";

    fn job(buffer: &Arc<AccumulationBuffer>, iterations: usize) -> FrameJob {
        FrameJob {
            shape: ShapeParameters::new(1.4, -2.3, 2.4, -2.1),
            evaluation: Evaluation::Precise,
            iterations,
            brightness: 1250.0,
            buffer: Arc::clone(buffer),
        }
    }

    #[test]
    fn zero_threads_is_rejected() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn frames_release_the_buffer() {
        let pool = WorkerPool::new(3).unwrap();
        let mut buffer = Arc::new(AccumulationBuffer::new(32, ChannelDepth::Sixteen).unwrap());
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..5 {
            pool.run_frame(job(&buffer, 500), &mut rng);
            assert!(Arc::get_mut(&mut buffer).is_some());
        }
        assert!(buffer.lit_cells() > 0);
    }

    #[test]
    fn over_is_bounded_by_total_steps() {
        let pool = WorkerPool::new(4).unwrap();
        let buffer = Arc::new(AccumulationBuffer::new(16, ChannelDepth::Eight).unwrap());
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..10 {
            let over = pool.run_frame(job(&buffer, 2000), &mut rng);
            assert!(over <= 4 * 2000);
        }
    }

    #[test]
    fn trajectories_are_reseeded_each_frame() {
        let pool = WorkerPool::new(2).unwrap();
        let buffer = Arc::new(AccumulationBuffer::new(16, ChannelDepth::Sixteen).unwrap());
        let mut rng = StdRng::seed_from_u64(3);
        // Zero iterations: the trace leaves the seed where it was put.
        pool.run_frame(job(&buffer, 0), &mut rng);
        let first = pool.trajectory(0);
        pool.run_frame(job(&buffer, 0), &mut rng);
        let second = pool.trajectory(0);
        assert_ne!(first, second);
        for s in [first, second].iter() {
            assert!(s.x.abs() <= 1.0 && s.y.abs() <= 1.0);
        }
    }

    #[test]
    fn failed_start_releases_the_started_workers() {
        let exited = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&exited);
        let result = WorkerPool::start(4, move |index, work| {
            if index == 2 {
                return Err(io::Error::new(io::ErrorKind::Other, "out of threads"));
            }
            let counter = Arc::clone(&counter);
            thread::Builder::new().spawn(move || {
                work();
                counter.fetch_add(1, Ordering::SeqCst);
            })
        });
        match result {
            Err(EngineError::Spawn(_)) => {}
            Err(e) => panic!("wrong error: {}", e),
            Ok(_) => panic!("pool started without all of its workers"),
        }
        assert_eq!(exited.load(Ordering::SeqCst), 2);
    }

    // Re-runs itself in a child process; the child's worker panics and
    // must take the whole process down instead of hanging the frame.
    #[test]
    fn worker_panic_aborts_the_process() {
        if env::var_os(FAILING_CHILD).is_some() {
            let pool = WorkerPool::new(2).unwrap();
            publish(&pool.shared, Job::Panic);
            pool.shared.frame_start.wait();
            pool.shared.frame_end.wait();
            return;
        }
        Command::new(env::current_exe().unwrap())
            .args(&[
                "--exact",
                "pool::tests::worker_panic_aborts_the_process",
                "--nocapture",
            ])
            .env(FAILING_CHILD, "1")
            .assert()
            .failure();
    }
}
