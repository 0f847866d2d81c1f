//! Capture engine.
//!
//! A [`Recorder`] streams one input device into one file. The audio callback
//! assembles device periods into chunks, runs the effect over them, and pushes
//! them into a slot ring; [`Tick::tick`] drains the ring into the file and
//! polls free disk space. A full ring never stalls the callback: the chunk is
//! dropped (or held over, see [`OverflowPolicy`]) and counted, and the tick
//! logs the loss.

mod callback;

use self::callback::{CaptureCallback, CaptureShared};
use crate::config::{OverflowPolicy, RecorderConfig};
use crate::disk::DiskSpaceProbe;
use crate::driver::Tick;
use crate::file::{SampleWriter, WavWriter};
use crate::{Error, Result};
use spool_core::backend::{FinishedCallback, InputCallback};
use spool_core::{
    slot_ring, AudioBackend, CaptureState, DeviceStream, Effect, SlotConsumer, StreamFormat,
    StreamParams,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything bound to the currently open file.
struct Open {
    writer: Box<dyn SampleWriter>,
    format: StreamFormat,
    consumer: SlotConsumer,
    stream: Box<dyn DeviceStream>,
    /// `stop` closed the device stream; queued data is still drainable.
    stream_closed: bool,
    recording: bool,
    finished: bool,
    disk: Option<DiskSpaceProbe>,
}

impl Open {
    /// Write the oldest queued chunk to the file. `false` if the ring was empty.
    fn drain_one(&mut self) -> bool {
        let writer = &mut self.writer;
        let mut outcome = None;
        let popped = self.consumer.pop_with(|slot| {
            outcome = Some(writer.write_some(slot).map(|written| (written, slot.len())));
        });
        if popped.is_err() {
            return false;
        }

        match outcome {
            Some(Ok((written, len))) if written < len => {
                warn!(written, expected = len, "short write, continuing");
            }
            Some(Err(err)) => warn!("write failed, chunk lost: {err}"),
            _ => {}
        }
        true
    }

    fn drain_all(&mut self) -> usize {
        let mut drained = 0;
        while self.drain_one() {
            drained += 1;
        }
        drained
    }
}

/// Records an input device into an audio file.
pub struct Recorder<B: AudioBackend> {
    backend: B,
    config: RecorderConfig,
    shared: Arc<CaptureShared>,
    open: Option<Open>,
    dropped_reported: u64,
}

impl<B: AudioBackend> Recorder<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: RecorderConfig::default(),
            shared: Arc::new(CaptureShared::new()),
            open: None,
            dropped_reported: 0,
        }
    }

    pub fn with_config(backend: B, config: RecorderConfig) -> Result<Self> {
        config.validate()?;
        let mut recorder = Self::new(backend);
        recorder.config = config;
        Ok(recorder)
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Create a WAV file at `path` in the configured format (or the input
    /// device's default) and open the input stream. See [`Recorder::open_writer`].
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let format = match self.config.format {
            Some(format) => format,
            None => self.backend.default_input_format()?,
        };
        let writer = WavWriter::create(path, format)?;
        self.open_writer(Box::new(writer))
    }

    /// Bind a new sink: close the current one, build a ring for the sink's
    /// channel count, and open the input stream at its format.
    pub fn open_writer(&mut self, writer: Box<dyn SampleWriter>) -> Result<()> {
        self.close()?;

        let format = writer.format();
        let slot_len = self.config.chunk_size * format.channels as usize;
        let (producer, consumer) = slot_ring(slot_len, self.config.slot_count)?;

        self.shared.captured.reset();
        self.shared.dropped.reset();
        self.shared.holding.set(false);
        self.dropped_reported = 0;

        let mut capture = CaptureCallback::new(
            Arc::clone(&self.shared),
            producer,
            format.channels as usize,
            self.config.overflow,
        );
        let callback: InputCallback = Box::new(move |input: &[f32]| capture.capture(input));
        let shared = Arc::clone(&self.shared);
        let finished: FinishedCallback = Box::new(move || {
            let _ = shared.state.transition(CaptureState::Stopped);
        });

        let params = StreamParams {
            format,
            period_frames: self.config.chunk_size as u32,
        };
        let stream = self.backend.open_input(params, callback, finished)?;

        let mut disk = writer
            .path()
            .map(|path| DiskSpaceProbe::new(path, self.config.disk_poll_interval()));
        if let Some(probe) = disk.as_mut() {
            probe.refresh();
        }

        debug!(
            path = ?writer.path(),
            channels = format.channels,
            sample_rate = format.sample_rate,
            overflow = ?self.config.overflow,
            "opened for recording"
        );
        self.open = Some(Open {
            writer,
            format,
            consumer,
            stream,
            stream_closed: false,
            recording: false,
            finished: false,
            disk,
        });
        Ok(())
    }

    /// Start capturing.
    pub fn record(&mut self) -> Result<()> {
        let open = self.open.as_mut().ok_or(Error::NotOpen)?;
        if open.stream_closed {
            return Err(Error::NotOpen);
        }

        let _ = self.shared.state.transition(CaptureState::Recording);
        if let Err(err) = open.stream.start() {
            self.teardown();
            return Err(err.into());
        }
        open.recording = true;
        open.finished = false;
        info!("recording started");
        Ok(())
    }

    /// Graceful stop: the tick drains everything queued, then the callback
    /// completes and the state reaches `Stopped`.
    pub fn request_stop(&mut self) -> Result<()> {
        if self.open.is_none() {
            return Err(Error::NotOpen);
        }
        match self.shared.state.transition(CaptureState::StopRequested) {
            Ok(_) => debug!("stop requested"),
            Err(state) => debug!(%state, "stop request ignored"),
        }
        Ok(())
    }

    /// Stop and close the device stream now. Queued chunks stay in the ring
    /// until [`Recorder::flush`] or [`Recorder::close`].
    pub fn stop(&mut self) -> Result<()> {
        let open = self.open.as_mut().ok_or(Error::NotOpen)?;
        let result = if open.stream_closed {
            Ok(())
        } else {
            open.stream_closed = true;
            open.stream.close()
        };
        if open.recording {
            open.recording = false;
            info!(
                time = self.current_time(),
                queued = self.buffered_slots(),
                "recording stopped"
            );
        }
        let _ = self.shared.state.transition(CaptureState::Stopped);
        result.map_err(Error::from)
    }

    /// Write every queued chunk to the file and flush it.
    pub fn flush(&mut self) -> Result<usize> {
        let open = self.open.as_mut().ok_or(Error::NotOpen)?;
        let drained = open.drain_all();
        open.writer.flush()?;
        Ok(drained)
    }

    /// Close the stream, discard undrained chunks, and finalize the file.
    /// No-op when nothing is open.
    pub fn close(&mut self) -> Result<()> {
        let Some(mut open) = self.open.take() else {
            let _ = self.shared.state.transition(CaptureState::Stopped);
            return Ok(());
        };

        let closed = if open.stream_closed {
            Ok(())
        } else {
            open.stream.close()
        };
        let _ = self.shared.state.transition(CaptureState::Stopped);

        if self.shared.holding.swap(false) {
            self.shared.dropped.record();
            warn!("held-over chunk discarded at close");
        }
        let discarded = open.consumer.clear();
        if discarded > 0 {
            warn!(discarded, "closing with undrained chunks");
        }
        let path = open.writer.path().map(Path::to_path_buf);
        let frames = open.writer.frames_written();
        open.writer.finalize()?;
        debug!(?path, frames, "closed recording");

        closed.map_err(Error::from)
    }

    fn teardown(&mut self) {
        if let Err(err) = self.close() {
            warn!("error closing recording during teardown: {err}");
        }
    }

    /// Install the stream's effect, returning the one it replaced.
    pub fn insert_effect(&self, effect: impl Effect + 'static) -> Option<Box<dyn Effect>> {
        self.shared.effect.insert(Box::new(effect))
    }

    pub fn remove_effect(&self) -> Option<Box<dyn Effect>> {
        self.shared.effect.remove()
    }

    pub fn state(&self) -> CaptureState {
        self.shared.state.load()
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The device stream is running.
    pub fn is_active(&self) -> bool {
        self.open.as_ref().is_some_and(|open| open.stream.is_active())
    }

    pub fn format(&self) -> Option<StreamFormat> {
        self.open.as_ref().map(|open| open.format)
    }

    pub fn path(&self) -> Option<&Path> {
        self.open.as_ref().and_then(|open| open.writer.path())
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.config.overflow
    }

    /// Seconds captured, from whole chunks.
    pub fn current_time(&self) -> f64 {
        match self.format() {
            Some(format) if format.sample_rate > 0 => {
                let frames = self.shared.captured.get() * self.config.chunk_size as u64;
                frames as f64 / format.sample_rate as f64
            }
            _ => 0.0,
        }
    }

    /// Chunks completed by the callback since `open`.
    pub fn captured_chunks(&self) -> u64 {
        self.shared.captured.get()
    }

    /// Chunks lost to a full ring since `open`.
    pub fn dropped_chunks(&self) -> u64 {
        self.shared.dropped.get()
    }

    /// Chunks waiting to be written.
    pub fn buffered_slots(&self) -> usize {
        self.open
            .as_ref()
            .map_or(0, |open| open.consumer.available_read())
    }

    pub fn frames_written(&self) -> u64 {
        self.open
            .as_ref()
            .map_or(0, |open| open.writer.frames_written())
    }

    /// Free bytes on the recording's disk as of the last probe; `None` if unknown.
    pub fn free_space(&self) -> Option<u64> {
        self.open
            .as_ref()
            .and_then(|open| open.disk.as_ref())
            .and_then(DiskSpaceProbe::available)
    }
}

impl<B: AudioBackend> Tick for Recorder<B> {
    /// Drain to the file, advance a graceful stop, poll free space. Returns
    /// `false` once there is nothing left to drive.
    fn tick(&mut self) -> bool {
        let dropped = self.shared.dropped.since(&mut self.dropped_reported);
        if dropped > 0 {
            warn!(dropped, "capture ring full, chunks dropped");
        }

        let Some(open) = self.open.as_mut() else {
            return false;
        };

        if let Some(probe) = open.disk.as_mut() {
            probe.poll();
        }

        match self.shared.state.load() {
            CaptureState::Recording => {
                open.drain_one();
            }
            CaptureState::StopRequested => {
                let drained = open.drain_all();
                let _ = self.shared.state.transition(CaptureState::ShouldStop);
                debug!(drained, "drained for stop");
            }
            CaptureState::ShouldStop => {
                open.drain_all();
            }
            CaptureState::Stopped => {
                if open.recording {
                    open.recording = false;
                    open.finished = true;
                    if let Err(err) = open.stream.stop() {
                        warn!("error stopping finished stream: {err}");
                    }
                    let drained = open.drain_all();
                    info!(drained, "recording finished");
                }
            }
        }

        !open.finished && !open.stream_closed
    }
}

impl<B: AudioBackend> Drop for Recorder<B> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
