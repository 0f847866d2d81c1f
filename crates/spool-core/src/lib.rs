//! Real-time building blocks for spool.
//!
//! - [`ring`]: fixed-capacity slot ring between the audio thread and the control path
//! - [`state`]: atomic stream state machines
//! - [`effect`]: the per-stream effect slot and the RMS meters
//! - [`backend`]: device streams (CPAL, or an offline backend driven by hand)
//!
//! Nothing here allocates, locks, or logs on the audio thread once a stream is running.

pub mod backend;
pub mod effect;
pub mod error;
pub mod lockfree;
pub mod ring;
pub mod state;

pub use backend::{
    AudioBackend, CallbackFlow, CpalBackend, DeviceStream, Direction, OfflineBackend,
    StreamFormat, StreamParams,
};
pub use effect::{Effect, EffectChain, EffectSlot, Gain, LevelMeter, RmsMeter};
pub use error::{Error, Result};
pub use lockfree::{AtomicDouble, AtomicFlag, AtomicFloat, EventCounter};
pub use ring::{slot_ring, PopError, PushError, SlotConsumer, SlotProducer};
pub use state::{AtomicState, CaptureState, PlaybackState, StreamState};
