//! Hardware audio backends.
//!
//! The engines talk to the device through [`AudioBackend`] and [`DeviceStream`]:
//! open one input or output stream with a fixed format and period, start it,
//! stop it, close it. Callbacks run on the backend's real-time thread.
//!
//! A callback returning [`CallbackFlow::Complete`] ends the stream's run: the
//! backend stops invoking it and calls the finished callback once.

mod cpal_backend;
mod offline;

pub use cpal_backend::{CpalBackend, CpalStream};
pub use offline::{OfflineBackend, OfflineStream};

use crate::{AtomicFlag, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Channel count and sample rate of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFormat {
    pub channels: u16,
    pub sample_rate: u32,
}

impl StreamFormat {
    pub fn new(channels: u16, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::new(2, 44100)
    }
}

/// Everything needed to open a device stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub format: StreamFormat,
    /// Requested frames per callback.
    pub period_frames: u32,
}

impl StreamParams {
    /// Interleaved samples in one period.
    pub fn period_samples(&self) -> usize {
        self.period_frames as usize * self.format.channels as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// What a callback wants after this period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackFlow {
    Continue,
    Complete,
}

/// Fills one period of interleaved output samples.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) -> CallbackFlow + Send>;
/// Receives one period of interleaved input samples.
pub type InputCallback = Box<dyn FnMut(&[f32]) -> CallbackFlow + Send>;
/// Invoked once when a callback returned [`CallbackFlow::Complete`].
pub type FinishedCallback = Box<dyn FnMut() + Send>;

/// An opened device stream.
///
/// `stop` and `close` are synchronous: once they return, the stream callback is
/// not invoked again until the next `start`.
pub trait DeviceStream: Send {
    fn start(&mut self) -> Result<()>;
    fn stop(&mut self) -> Result<()>;
    /// Release the stream. Calling it again is a no-op.
    fn close(&mut self) -> Result<()>;
    /// Started, not stopped, and not finished.
    fn is_active(&self) -> bool;
}

/// Source of device streams.
pub trait AudioBackend: Send {
    fn default_output_format(&self) -> Result<StreamFormat>;
    fn default_input_format(&self) -> Result<StreamFormat>;

    fn open_output(
        &mut self,
        params: StreamParams,
        callback: OutputCallback,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>>;

    fn open_input(
        &mut self,
        params: StreamParams,
        callback: InputCallback,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>>;
}

/// Tracks whether the current run has completed and fires the finished
/// callback exactly once per run.
pub(crate) struct Completion {
    done: Arc<AtomicFlag>,
    finished: FinishedCallback,
}

impl Completion {
    pub(crate) fn new(finished: FinishedCallback) -> Self {
        Self {
            done: Arc::new(AtomicFlag::new(false)),
            finished,
        }
    }

    pub(crate) fn flag(&self) -> Arc<AtomicFlag> {
        Arc::clone(&self.done)
    }

    /// Start a new run.
    pub(crate) fn reset(&self) {
        self.done.set(false);
    }

    #[inline]
    pub(crate) fn is_done(&self) -> bool {
        self.done.get()
    }

    /// Run one output period. Silence once the run has completed.
    #[inline]
    pub(crate) fn run_output(&mut self, callback: &mut OutputCallback, data: &mut [f32]) {
        if self.is_done() {
            data.fill(0.0);
            return;
        }
        if callback(data) == CallbackFlow::Complete {
            self.complete();
        }
    }

    /// Run one input period. Input is ignored once the run has completed.
    #[inline]
    pub(crate) fn run_input(&mut self, callback: &mut InputCallback, data: &[f32]) {
        if self.is_done() {
            return;
        }
        if callback(data) == CallbackFlow::Complete {
            self.complete();
        }
    }

    fn complete(&mut self) {
        if !self.done.swap(true) {
            (self.finished)();
        }
    }
}
