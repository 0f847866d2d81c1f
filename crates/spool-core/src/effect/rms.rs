//! Root-mean-square level metering.

use super::Effect;
use crate::AtomicFloat;
use smallvec::SmallVec;
use std::sync::Arc;

/// Channel counts up to this size are metered without touching the heap.
pub const MAX_INLINE_CHANNELS: usize = 8;

type Levels = SmallVec<[f32; MAX_INLINE_CHANNELS]>;

/// RMS of channel `channel` in an interleaved buffer.
#[inline]
pub fn channel_rms(samples: &[f32], frames: usize, channels: usize, channel: usize) -> f32 {
    if frames == 0 || channels == 0 {
        return 0.0;
    }
    let sum: f64 = samples
        .iter()
        .skip(channel)
        .step_by(channels)
        .take(frames)
        .map(|&s| (s as f64) * (s as f64))
        .sum();
    (sum / frames as f64).sqrt() as f32
}

/// `20 * log10(rms)`; silence maps to negative infinity.
#[inline]
pub fn rms_to_db(rms: f32) -> f32 {
    if rms <= 0.0 {
        f32::NEG_INFINITY
    } else {
        20.0 * rms.log10()
    }
}

/// Reports per-channel RMS levels in dB to a callback, once per buffer.
///
/// Runs on the audio thread. The callback receives one value per channel and
/// must itself be real-time safe; any host state it needs travels in its captures.
pub struct RmsMeter<F>
where
    F: FnMut(&[f32]) + Send,
{
    levels: Levels,
    on_levels: F,
}

impl<F> RmsMeter<F>
where
    F: FnMut(&[f32]) + Send,
{
    pub fn new(on_levels: F) -> Self {
        Self {
            levels: SmallVec::new(),
            on_levels,
        }
    }
}

impl<F> Effect for RmsMeter<F>
where
    F: FnMut(&[f32]) + Send,
{
    fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) {
        self.levels.clear();
        for c in 0..channels {
            self.levels
                .push(rms_to_db(channel_rms(samples, frames, channels, c)));
        }
        (self.on_levels)(&self.levels);
    }
}

/// RMS meter that publishes dB levels for polling instead of calling back.
///
/// Clone the handle: one copy goes into the stream's effect slot, the host keeps
/// the other and reads [`LevelMeter::level_db`] on its own schedule.
#[derive(Clone)]
pub struct LevelMeter {
    levels: Arc<[AtomicFloat]>,
}

impl LevelMeter {
    pub fn new(channels: usize) -> Self {
        let levels: Vec<AtomicFloat> = (0..channels)
            .map(|_| AtomicFloat::new(f32::NEG_INFINITY))
            .collect();
        Self {
            levels: levels.into(),
        }
    }

    pub fn channels(&self) -> usize {
        self.levels.len()
    }

    /// Latest level of `channel` in dB, `None` if the channel is not metered.
    pub fn level_db(&self, channel: usize) -> Option<f32> {
        self.levels.get(channel).map(AtomicFloat::get)
    }

    pub fn levels_db(&self) -> Vec<f32> {
        self.levels.iter().map(AtomicFloat::get).collect()
    }
}

impl Effect for LevelMeter {
    fn process(&mut self, samples: &mut [f32], frames: usize, channels: usize) {
        for (c, level) in self.levels.iter().enumerate().take(channels) {
            level.set(rms_to_db(channel_rms(samples, frames, channels, c)));
        }
    }
}
