//! File playback engine.
//!
//! A [`Player`] streams one file to one output device. The control thread reads
//! the file into a slot ring (prebuffering on load and seek, refilling on
//! [`Tick::tick`] when the callback reports `NeedData`); the audio callback pops
//! slots, runs the effect, scales by volume, and plays them. When the file is
//! exhausted the state moves to `ShouldStop`, the callback completes once the
//! ring is drained, and the backend's finished notification moves it to
//! `Stopped`.

mod callback;

use self::callback::{PlaybackCallback, PlaybackShared};
use crate::config::PlayerConfig;
use crate::driver::Tick;
use crate::file::{SampleReader, WavReader};
use crate::{Error, Result};
use parking_lot::Mutex;
use spool_core::backend::{FinishedCallback, OutputCallback};
use spool_core::{
    slot_ring, AudioBackend, DeviceStream, Effect, PlaybackState, SlotConsumer, SlotProducer,
    StreamFormat, StreamParams,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything bound to the currently loaded file.
struct Loaded {
    reader: Box<dyn SampleReader>,
    format: StreamFormat,
    duration: f64,
    producer: SlotProducer,
    consumer: Arc<Mutex<SlotConsumer>>,
    stream: Box<dyn DeviceStream>,
    /// Control-side read buffer, one slot long.
    scratch: Box<[f32]>,
    at_eof: bool,
    /// The host asked for playback and has not paused since.
    playing: bool,
    /// Playback ran to the end and the stream was stopped.
    finished: bool,
}

impl Loaded {
    /// Read from the file into the ring until it is full or the file ends.
    fn fill(&mut self) -> Result<usize> {
        let mut pushed = 0;
        while !self.at_eof && !self.producer.is_full() {
            let read = self.reader.read_some(&mut self.scratch)?;
            if read < self.scratch.len() {
                self.at_eof = true;
            }
            if read == 0 {
                break;
            }
            self.scratch[read..].fill(0.0);
            if self.producer.push(&self.scratch).is_err() {
                break;
            }
            pushed += 1;
        }
        Ok(pushed)
    }
}

/// Streams an audio file to an output device.
pub struct Player<B: AudioBackend> {
    backend: B,
    config: PlayerConfig,
    shared: Arc<PlaybackShared>,
    loaded: Option<Loaded>,
    underruns_reported: u64,
}

impl<B: AudioBackend> Player<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            config: PlayerConfig::default(),
            shared: Arc::new(PlaybackShared::new()),
            loaded: None,
            underruns_reported: 0,
        }
    }

    pub fn with_config(backend: B, config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let mut player = Self::new(backend);
        player.config = config;
        Ok(player)
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Load a WAV file. See [`Player::load_reader`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let reader = WavReader::open(path)?;
        self.load_reader(Box::new(reader))
    }

    /// Bind a new source: unload the current one, build a ring for the source's
    /// channel count, open the output stream at its format, and prebuffer.
    ///
    /// The engine is left `Stopped`; call [`Player::play`] to start.
    pub fn load_reader(&mut self, reader: Box<dyn SampleReader>) -> Result<()> {
        self.unload()?;

        let format = reader.format();
        let duration = reader.duration();
        let slot_len = self.config.chunk_size * format.channels as usize;
        let (producer, consumer) = slot_ring(slot_len, self.config.slot_count)?;
        let consumer = Arc::new(Mutex::new(consumer));

        self.shared.current_time.set(0.0);
        self.shared.discard_carry.set(false);

        let mut playback = PlaybackCallback::new(
            Arc::clone(&self.shared),
            Arc::clone(&consumer),
            format.channels as usize,
            format.sample_rate,
            duration,
            self.config.low_water_mark,
        );
        let callback: OutputCallback = Box::new(move |out: &mut [f32]| playback.render(out));
        let shared = Arc::clone(&self.shared);
        let finished: FinishedCallback = Box::new(move || {
            let _ = shared.state.transition(PlaybackState::Stopped);
        });

        let params = StreamParams {
            format,
            period_frames: self.config.chunk_size as u32,
        };
        let stream = self.backend.open_output(params, callback, finished)?;

        let mut loaded = Loaded {
            reader,
            format,
            duration,
            producer,
            consumer,
            stream,
            scratch: vec![0.0; slot_len].into_boxed_slice(),
            at_eof: false,
            playing: false,
            finished: false,
        };
        if let Err(err) = loaded.fill() {
            let _ = loaded.stream.close();
            return Err(err);
        }

        debug!(
            path = ?loaded.reader.path(),
            channels = format.channels,
            sample_rate = format.sample_rate,
            duration,
            prebuffered = loaded.producer.available_read(),
            "loaded"
        );
        self.loaded = Some(loaded);
        Ok(())
    }

    /// Start or resume playback.
    pub fn play(&mut self) -> Result<()> {
        let loaded = self.loaded.as_mut().ok_or(Error::NotLoaded)?;

        let state = self.shared.state.load();
        if state == PlaybackState::Stopped || loaded.at_eof {
            let target = if loaded.at_eof {
                PlaybackState::ShouldStop
            } else {
                PlaybackState::HasData
            };
            let _ = self.shared.state.transition(target);
        }

        if let Err(err) = loaded.stream.start() {
            self.teardown();
            return Err(err.into());
        }
        loaded.playing = true;
        loaded.finished = false;
        info!(state = %self.shared.state.load(), "playback started");
        Ok(())
    }

    /// Stop the device stream, keeping the ring and file position.
    pub fn pause(&mut self) -> Result<()> {
        let loaded = self.loaded.as_mut().ok_or(Error::NotLoaded)?;
        if let Err(err) = loaded.stream.stop() {
            self.teardown();
            return Err(err.into());
        }
        loaded.playing = false;
        debug!(time = self.shared.current_time.get(), "paused");
        Ok(())
    }

    /// Jump to `time_ms`, clamped to the file.
    ///
    /// Buffered audio from the old position is dropped and the ring is
    /// prebuffered from the new one. A running stream is paused for the
    /// duration of the seek and resumed afterwards.
    pub fn seek(&mut self, time_ms: f64) -> Result<()> {
        if !time_ms.is_finite() {
            return Err(Error::InvalidSeek(time_ms));
        }
        let loaded = self.loaded.as_mut().ok_or(Error::NotLoaded)?;
        let target_ms = time_ms.clamp(0.0, loaded.duration * 1000.0);

        let resume = loaded.playing && loaded.stream.is_active();
        if resume {
            if let Err(err) = loaded.stream.stop() {
                self.teardown();
                return Err(err.into());
            }
        }

        let dropped = loaded.consumer.lock().clear();
        self.shared.discard_carry.set(true);
        let refilled = loaded.reader.seek_ms(target_ms).and_then(|()| {
            loaded.at_eof = false;
            loaded.fill()
        });
        if let Err(err) = refilled {
            warn!("seek failed, closing stream: {err}");
            self.teardown();
            return Err(err);
        }

        if self.shared.state.load() != PlaybackState::Stopped {
            let next = if loaded.at_eof {
                PlaybackState::ShouldStop
            } else {
                PlaybackState::HasData
            };
            let _ = self.shared.state.transition(next);
        }
        self.shared.current_time.set(target_ms / 1000.0);
        debug!(target_ms, dropped, "seek");

        if resume {
            if let Err(err) = loaded.stream.start() {
                self.teardown();
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Set the linear output gain. Values outside `[0, 1]` are rejected and the
    /// current volume is kept.
    pub fn set_volume(&mut self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            warn!(volume, "volume out of range, ignored");
            return Err(Error::VolumeOutOfRange(volume));
        }
        self.shared.volume.set(volume);
        Ok(())
    }

    /// Install the stream's effect, returning the one it replaced.
    pub fn insert_effect(&self, effect: impl Effect + 'static) -> Option<Box<dyn Effect>> {
        self.shared.effect.insert(Box::new(effect))
    }

    pub fn remove_effect(&self) -> Option<Box<dyn Effect>> {
        self.shared.effect.remove()
    }

    /// Close the stream and release the ring and file. No-op when nothing is loaded.
    pub fn unload(&mut self) -> Result<()> {
        let result = match self.loaded.take() {
            Some(mut loaded) => {
                let result = loaded.stream.close();
                debug!(path = ?loaded.reader.path(), "unloaded");
                result.map_err(Error::from)
            }
            None => Ok(()),
        };
        let _ = self.shared.state.transition(PlaybackState::Stopped);
        result
    }

    /// Drop the current stream after a device error.
    fn teardown(&mut self) {
        if let Err(err) = self.unload() {
            warn!("error closing stream during teardown: {err}");
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state.load()
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// The device stream is running.
    pub fn is_active(&self) -> bool {
        self.loaded
            .as_ref()
            .is_some_and(|loaded| loaded.stream.is_active())
    }

    /// Length of the loaded file in seconds, 0 when nothing is loaded.
    pub fn duration(&self) -> f64 {
        self.loaded.as_ref().map_or(0.0, |loaded| loaded.duration)
    }

    pub fn channels(&self) -> u16 {
        self.loaded.as_ref().map_or(0, |loaded| loaded.format.channels)
    }

    pub fn sample_rate(&self) -> u32 {
        self.loaded
            .as_ref()
            .map_or(0, |loaded| loaded.format.sample_rate)
    }

    pub fn path(&self) -> Option<&Path> {
        self.loaded.as_ref().and_then(|loaded| loaded.reader.path())
    }

    /// Playback position in seconds.
    pub fn current_time(&self) -> f64 {
        self.shared.current_time.get()
    }

    /// Position as a fraction of the duration; 0 for empty files.
    pub fn position_ratio(&self) -> f64 {
        let duration = self.duration();
        if duration > 0.0 {
            (self.current_time() / duration).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    pub fn volume(&self) -> f32 {
        self.shared.volume.get()
    }

    /// Underruns since the player was created.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.get()
    }

    /// Slots queued for the callback.
    pub fn buffered_slots(&self) -> usize {
        self.loaded
            .as_ref()
            .map_or(0, |loaded| loaded.producer.available_read())
    }
}

impl<B: AudioBackend> Tick for Player<B> {
    /// Refill on `NeedData`, wind down on `Stopped`. Returns `false` once there
    /// is nothing left to drive.
    fn tick(&mut self) -> bool {
        let underruns = self.shared.underruns.since(&mut self.underruns_reported);
        if underruns > 0 {
            warn!(underruns, "playback underrun");
        }

        let Some(loaded) = self.loaded.as_mut() else {
            return false;
        };

        match self.shared.state.load() {
            PlaybackState::NeedData => {
                if let Err(err) = loaded.fill() {
                    warn!("read failed, ending playback: {err}");
                    loaded.at_eof = true;
                }
                if loaded.at_eof {
                    let _ = self.shared.state.transition(PlaybackState::ShouldStop);
                    debug!("end of file");
                }
            }
            PlaybackState::Stopped if loaded.playing => {
                loaded.playing = false;
                loaded.finished = true;
                if let Err(err) = loaded.stream.stop() {
                    warn!("error stopping finished stream: {err}");
                }
                info!(time = self.shared.current_time.get(), "playback finished");
            }
            _ => {}
        }

        !loaded.finished
    }
}

impl<B: AudioBackend> Drop for Player<B> {
    fn drop(&mut self) {
        let _ = self.unload();
    }
}
