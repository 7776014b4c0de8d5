// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Errors raised while building or driving the engine.

use failure::Fail;
use std::io;

/// Everything that can go wrong outside the per-iteration hot path.
/// Problems inside a worker are not represented here: a panicking
/// worker takes the process down with it, because the frame barriers
/// cannot complete with a participant missing.
#[derive(Debug, Fail)]
pub enum EngineError {
    /// A texture must have at least one cell per side.
    #[fail(display = "texture size must be positive, got {}", _0)]
    InvalidTextureSize(usize),

    /// A pool must have at least one worker.
    #[fail(display = "thread count must be positive, got {}", _0)]
    InvalidThreadCount(usize),

    /// The accumulation buffer could not reserve its channels.
    #[fail(display = "could not allocate {} accumulation channels", _0)]
    Allocation(usize),

    /// The operating system refused to start a worker thread.
    #[fail(display = "could not start worker thread: {}", _0)]
    Spawn(#[cause] io::Error),

    /// A tunable was looked up by a name nobody registered.
    #[fail(display = "no tunable named '{}'", _0)]
    UnknownParameter(String),

    /// A configuration value that could not be parsed or made sense of.
    #[fail(display = "invalid argument: {}", _0)]
    InvalidArgument(String),
}

/// Shorthand used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
