//! Playback audio callback.

use parking_lot::Mutex;
use spool_core::{
    AtomicDouble, AtomicFlag, AtomicFloat, AtomicState, CallbackFlow, EffectSlot, EventCounter,
    PlaybackState, SlotConsumer,
};
use std::sync::Arc;

/// State shared between a [`Player`](super::Player) and its audio callback.
pub(super) struct PlaybackShared {
    pub state: AtomicState<PlaybackState>,
    pub volume: AtomicFloat,
    /// Seconds of file audio emitted since the last load or seek.
    pub current_time: AtomicDouble,
    pub underruns: EventCounter,
    /// Set by the control path after clearing the ring; the callback drops its
    /// partially played slot when it sees it.
    pub discard_carry: AtomicFlag,
    pub effect: EffectSlot,
}

impl PlaybackShared {
    pub fn new() -> Self {
        Self {
            state: AtomicState::new(PlaybackState::Stopped),
            volume: AtomicFloat::new(1.0),
            current_time: AtomicDouble::new(0.0),
            underruns: EventCounter::new(),
            discard_carry: AtomicFlag::new(false),
            effect: EffectSlot::new(),
        }
    }
}

/// Pulls slots out of the ring and into device periods of any size.
///
/// One popped slot is held in `carry` until the device has consumed all of it,
/// so a period shorter or longer than a slot still plays every sample in order.
pub(super) struct PlaybackCallback {
    shared: Arc<PlaybackShared>,
    consumer: Arc<Mutex<SlotConsumer>>,
    carry: Box<[f32]>,
    carry_pos: usize,
    frames_per_slot: usize,
    channels: usize,
    seconds_per_frame: f64,
    duration: f64,
    low_water_mark: usize,
}

impl PlaybackCallback {
    pub fn new(
        shared: Arc<PlaybackShared>,
        consumer: Arc<Mutex<SlotConsumer>>,
        channels: usize,
        sample_rate: u32,
        duration: f64,
        low_water_mark: usize,
    ) -> Self {
        let slot_len = consumer.lock().slot_len();
        Self {
            shared,
            consumer,
            carry: vec![0.0; slot_len].into_boxed_slice(),
            carry_pos: slot_len,
            frames_per_slot: slot_len / channels.max(1),
            channels,
            seconds_per_frame: if sample_rate > 0 {
                1.0 / sample_rate as f64
            } else {
                0.0
            },
            duration,
            low_water_mark,
        }
    }

    pub fn render(&mut self, out: &mut [f32]) -> CallbackFlow {
        let shared = &*self.shared;
        if shared.discard_carry.swap(false) {
            self.carry_pos = self.carry.len();
        }

        // The control path only holds the consumer while the stream is stopped.
        let Some(mut consumer) = self.consumer.try_lock() else {
            out.fill(0.0);
            return CallbackFlow::Continue;
        };

        let volume = shared.volume.get();
        let mut written = 0;

        while written < out.len() {
            if self.carry_pos >= self.carry.len() {
                let carry = &mut self.carry;
                let (frames, channels) = (self.frames_per_slot, self.channels);
                let popped = consumer.pop_with(|slot| {
                    // metering sees the unscaled source
                    shared.effect.process(slot, frames, channels);
                    carry.copy_from_slice(slot);
                });

                if popped.is_err() {
                    out[written..].fill(0.0);
                    self.advance(written);
                    return match shared.state.load() {
                        PlaybackState::ShouldStop => CallbackFlow::Complete,
                        PlaybackState::Stopped => CallbackFlow::Continue,
                        current => {
                            shared.underruns.record();
                            if current == PlaybackState::HasData {
                                shared
                                    .state
                                    .compare_transition(current, PlaybackState::NeedData);
                            }
                            CallbackFlow::Continue
                        }
                    };
                }

                self.carry_pos = 0;
                let next = if consumer.available_read() < self.low_water_mark {
                    PlaybackState::NeedData
                } else {
                    PlaybackState::HasData
                };
                let current = shared.state.load();
                if current != next
                    && matches!(current, PlaybackState::HasData | PlaybackState::NeedData)
                {
                    shared.state.compare_transition(current, next);
                }
            }

            let n = (out.len() - written).min(self.carry.len() - self.carry_pos);
            let src = &self.carry[self.carry_pos..self.carry_pos + n];
            for (dst, &sample) in out[written..written + n].iter_mut().zip(src) {
                *dst = sample * volume;
            }
            written += n;
            self.carry_pos += n;
        }

        self.advance(written);

        if shared.state.load() == PlaybackState::ShouldStop
            && consumer.is_empty()
            && self.carry_pos >= self.carry.len()
        {
            CallbackFlow::Complete
        } else {
            CallbackFlow::Continue
        }
    }

    #[inline]
    fn advance(&self, samples: usize) {
        if samples == 0 || self.channels == 0 {
            return;
        }
        let frames = (samples / self.channels) as f64;
        let time = &self.shared.current_time;
        time.set((time.get() + frames * self.seconds_per_frame).min(self.duration));
    }
}
