//! Per-stream effect slot.
//!
//! An [`Effect`] sees one slot of interleaved samples at a time, on the audio
//! thread, and must finish within one callback period. Each stream has one
//! [`EffectSlot`]; [`EffectChain`] lets that slot host several effects in order.

mod rms;

pub use rms::{channel_rms, rms_to_db, LevelMeter, RmsMeter, MAX_INLINE_CHANNELS};

use parking_lot::Mutex;

/// In-place transform over an interleaved buffer.
///
/// `samples.len() == frames * channels`; channel `c` of frame `f` lives at
/// `samples[f * channels + c]`.
pub trait Effect: Send {
    fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize);
}

impl<F> Effect for F
where
    F: FnMut(&mut [f32], usize, usize) + Send,
{
    fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) {
        self(samples, frames, channels)
    }
}

/// The single effect position of a stream.
///
/// The control path swaps effects with `insert`/`remove` (taking the lock); the
/// audio thread only ever `try_lock`s, and skips the effect for that period if
/// the control path holds it.
#[derive(Default)]
pub struct EffectSlot {
    effect: Mutex<Option<Box<dyn Effect>>>,
}

impl EffectSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `effect`, returning the one it replaced.
    ///
    /// The replaced effect is handed back so it is dropped on the caller's thread.
    pub fn insert(&self, effect: Box<dyn Effect>) -> Option<Box<dyn Effect>> {
        self.effect.lock().replace(effect)
    }

    pub fn remove(&self) -> Option<Box<dyn Effect>> {
        self.effect.lock().take()
    }

    pub fn is_occupied(&self) -> bool {
        self.effect.lock().is_some()
    }

    /// Run the installed effect, if any. Never blocks.
    #[inline]
    pub fn process(&self, samples: &mut [f32], frames: usize, channels: usize) {
        if let Some(mut guard) = self.effect.try_lock() {
            if let Some(effect) = guard.as_mut() {
                effect.process(samples, frames, channels);
            }
        }
    }
}

/// Ordered list of effects that behaves as one.
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn Effect>>,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, effect: impl Effect + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn push(&mut self, effect: Box<dyn Effect>) {
        self.effects.push(effect);
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }
}

impl Effect for EffectChain {
    fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) {
        for effect in &mut self.effects {
            effect.process(samples, frames, channels);
        }
    }
}

/// Linear gain.
#[derive(Debug, Clone, Copy)]
pub struct Gain {
    pub gain: f32,
}

impl Gain {
    pub fn new(gain: f32) -> Self {
        Self { gain }
    }
}

impl Effect for Gain {
    fn process(&mut self, samples: &mut [f32], _frames: usize, _channels: usize) {
        for s in samples.iter_mut() {
            *s *= self.gain;
        }
    }
}
