//! # Spool - Real-time Audio File Streaming
//!
//! Moves audio between files and audio devices in both directions without ever
//! blocking the device callback.
//!
//! ## Architecture
//!
//! Spool is an umbrella crate over:
//! - **spool-core** - Slot ring, atomic stream state, effects and meters, device backends
//! - **spool-stream** - WAV file adapter, playback and capture engines, tick driver
//!
//! ## Quick Start
//!
//! ```ignore
//! use spool::prelude::*;
//!
//! let mut player = Player::new(CpalBackend::new());
//! player.load("take.wav")?;
//!
//! let meter = LevelMeter::new(player.channels() as usize);
//! player.insert_effect(meter.clone());
//! player.play()?;
//!
//! let interval = player.config().tick_interval();
//! let player = Arc::new(Mutex::new(player));
//! let _driver = TickDriver::spawn(Arc::clone(&player), interval)?;
//!
//! // poll from the UI thread
//! let position = player.lock().current_time();
//! let levels = meter.levels_db();
//! ```

/// Re-export of spool-core for direct access
pub use spool_core as core;

/// Re-export of spool-stream for direct access
pub use spool_stream as stream;

mod error;
pub use error::{Error, Result};

// Core types
pub use spool_core::{
    slot_ring,
    // Lock-free primitives
    AtomicDouble,
    AtomicFlag,
    AtomicFloat,
    // Stream state
    AtomicState,
    // Backends
    AudioBackend,
    CallbackFlow,
    CaptureState,
    CpalBackend,
    DeviceStream,
    Direction,
    // Effects
    Effect,
    EffectChain,
    EffectSlot,
    EventCounter,
    Gain,
    LevelMeter,
    OfflineBackend,
    PlaybackState,
    PopError,
    PushError,
    RmsMeter,
    // Ring
    SlotConsumer,
    SlotProducer,
    StreamFormat,
    StreamParams,
    StreamState,
};

// Engines
pub use spool_stream::{
    available_space, DiskSpaceProbe, OverflowPolicy, Player, PlayerConfig, Recorder,
    RecorderConfig, SampleReader, SampleWriter, Tick, TickDriver, WavReader, WavWriter,
};

/// Convenience prelude for common imports
pub mod prelude {
    // Engines
    pub use crate::{Player, PlayerConfig, Recorder, RecorderConfig, TickDriver};

    // Backends
    pub use crate::{CpalBackend, OfflineBackend, StreamFormat};

    // State and control
    pub use crate::{CaptureState, OverflowPolicy, PlaybackState, Tick};

    // Effects
    pub use crate::{Effect, LevelMeter, RmsMeter};
}
