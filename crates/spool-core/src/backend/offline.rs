//! Device-less backend driven by hand.
//!
//! Nothing runs on its own: the owner pulls output periods with
//! [`OfflineBackend::render`] and pushes input periods with
//! [`OfflineBackend::capture`], on whatever thread it likes. Used for tests and
//! for rendering to a file faster than real time.

use super::{
    AudioBackend, Completion, DeviceStream, Direction, FinishedCallback, InputCallback,
    OutputCallback, StreamFormat, StreamParams,
};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;

enum Port {
    Output(OutputCallback),
    Input(InputCallback),
}

struct StreamShared {
    port: Port,
    completion: Completion,
    params: StreamParams,
    active: bool,
    closed: bool,
    calls: u64,
}

impl StreamShared {
    fn runnable(&self) -> bool {
        self.active && !self.closed && !self.completion.is_done()
    }
}

#[derive(Default)]
struct BackendShared {
    format: Option<StreamFormat>,
    output: Option<Arc<Mutex<StreamShared>>>,
    input: Option<Arc<Mutex<StreamShared>>>,
    opened: usize,
}

/// Backend whose streams are pumped manually.
///
/// Clones share state, so a test can hand one clone to an engine and keep the
/// other to drive it. Only the most recently opened stream of each direction is
/// reachable through `render`/`capture`.
#[derive(Clone)]
pub struct OfflineBackend {
    shared: Arc<Mutex<BackendShared>>,
}

impl OfflineBackend {
    /// Backend reporting `format` as the default for both directions.
    pub fn new(format: StreamFormat) -> Self {
        Self {
            shared: Arc::new(Mutex::new(BackendShared {
                format: Some(format),
                ..Default::default()
            })),
        }
    }

    /// Backend with no devices at all; every open fails with [`Error::NoDevice`].
    pub fn without_devices() -> Self {
        Self {
            shared: Arc::new(Mutex::new(BackendShared::default())),
        }
    }

    fn output(&self) -> Option<Arc<Mutex<StreamShared>>> {
        self.shared.lock().output.clone()
    }

    fn input(&self) -> Option<Arc<Mutex<StreamShared>>> {
        self.shared.lock().input.clone()
    }

    /// Pull `frames` frames from the output stream.
    ///
    /// `None` when there is no output stream or it is not running (never started,
    /// stopped, closed, or completed).
    pub fn render(&self, frames: usize) -> Option<Vec<f32>> {
        let stream = self.output()?;
        let mut guard = stream.lock();
        let shared = &mut *guard;
        if !shared.runnable() {
            return None;
        }

        let mut buf = vec![0.0; frames * shared.params.format.channels as usize];
        if let Port::Output(callback) = &mut shared.port {
            shared.completion.run_output(callback, &mut buf);
            shared.calls += 1;
        }
        Some(buf)
    }

    /// Pull one period of the size the output stream was opened with.
    pub fn render_period(&self) -> Option<Vec<f32>> {
        let frames = self.output()?.lock().params.period_frames as usize;
        self.render(frames)
    }

    /// Push one period of interleaved samples into the input stream.
    ///
    /// Returns `false` if the input stream is not running.
    pub fn capture(&self, samples: &[f32]) -> bool {
        let Some(stream) = self.input() else {
            return false;
        };
        let mut guard = stream.lock();
        let shared = &mut *guard;
        if !shared.runnable() {
            return false;
        }

        if let Port::Input(callback) = &mut shared.port {
            shared.completion.run_input(callback, samples);
            shared.calls += 1;
        }
        true
    }

    /// Callbacks delivered to the current output stream.
    pub fn output_callbacks(&self) -> u64 {
        self.output().map_or(0, |s| s.lock().calls)
    }

    pub fn input_callbacks(&self) -> u64 {
        self.input().map_or(0, |s| s.lock().calls)
    }

    pub fn output_active(&self) -> bool {
        self.output().is_some_and(|s| s.lock().runnable())
    }

    pub fn input_active(&self) -> bool {
        self.input().is_some_and(|s| s.lock().runnable())
    }

    pub fn output_closed(&self) -> bool {
        self.output().is_some_and(|s| s.lock().closed)
    }

    pub fn input_closed(&self) -> bool {
        self.input().is_some_and(|s| s.lock().closed)
    }

    /// Parameters the current output stream was opened with.
    pub fn output_params(&self) -> Option<StreamParams> {
        self.output().map(|s| s.lock().params)
    }

    pub fn input_params(&self) -> Option<StreamParams> {
        self.input().map(|s| s.lock().params)
    }

    /// Streams opened over the backend's lifetime, both directions.
    pub fn streams_opened(&self) -> usize {
        self.shared.lock().opened
    }

    fn open(
        &self,
        direction: Direction,
        params: StreamParams,
        port: Port,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>> {
        let mut backend = self.shared.lock();
        if backend.format.is_none() {
            return Err(Error::NoDevice(direction));
        }

        let stream = Arc::new(Mutex::new(StreamShared {
            port,
            completion: Completion::new(finished),
            params,
            active: false,
            closed: false,
            calls: 0,
        }));
        match direction {
            Direction::Output => backend.output = Some(Arc::clone(&stream)),
            Direction::Input => backend.input = Some(Arc::clone(&stream)),
        }
        backend.opened += 1;

        Ok(Box::new(OfflineStream { shared: stream }))
    }
}

impl AudioBackend for OfflineBackend {
    fn default_output_format(&self) -> Result<StreamFormat> {
        self.shared
            .lock()
            .format
            .ok_or(Error::NoDevice(Direction::Output))
    }

    fn default_input_format(&self) -> Result<StreamFormat> {
        self.shared
            .lock()
            .format
            .ok_or(Error::NoDevice(Direction::Input))
    }

    fn open_output(
        &mut self,
        params: StreamParams,
        callback: OutputCallback,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>> {
        self.open(Direction::Output, params, Port::Output(callback), finished)
    }

    fn open_input(
        &mut self,
        params: StreamParams,
        callback: InputCallback,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>> {
        self.open(Direction::Input, params, Port::Input(callback), finished)
    }
}

/// A stream opened by [`OfflineBackend`].
pub struct OfflineStream {
    shared: Arc<Mutex<StreamShared>>,
}

impl DeviceStream for OfflineStream {
    fn start(&mut self) -> Result<()> {
        let mut shared = self.shared.lock();
        if shared.closed {
            return Err(Error::StreamClosed);
        }
        shared.completion.reset();
        shared.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.shared.lock().active = false;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut shared = self.shared.lock();
        shared.active = false;
        shared.closed = true;
        Ok(())
    }

    fn is_active(&self) -> bool {
        self.shared.lock().runnable()
    }
}
