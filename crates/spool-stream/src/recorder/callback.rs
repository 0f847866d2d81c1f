//! Capture audio callback.

use crate::config::OverflowPolicy;
use spool_core::{
    AtomicFlag, AtomicState, CallbackFlow, CaptureState, EffectSlot, EventCounter, SlotProducer,
};
use std::sync::Arc;

/// State shared between a [`Recorder`](super::Recorder) and its audio callback.
pub(super) struct CaptureShared {
    pub state: AtomicState<CaptureState>,
    /// Chunks completed by the callback, stored or not.
    pub captured: EventCounter,
    pub dropped: EventCounter,
    /// A chunk is parked in the callback waiting for ring space.
    pub holding: AtomicFlag,
    pub effect: EffectSlot,
}

impl CaptureShared {
    pub fn new() -> Self {
        Self {
            state: AtomicState::new(CaptureState::Stopped),
            captured: EventCounter::new(),
            dropped: EventCounter::new(),
            holding: AtomicFlag::new(false),
            effect: EffectSlot::new(),
        }
    }
}

/// Collects device periods into whole chunks and pushes them into the ring.
pub(super) struct CaptureCallback {
    shared: Arc<CaptureShared>,
    producer: SlotProducer,
    policy: OverflowPolicy,
    carry: Box<[f32]>,
    carry_len: usize,
    held: Box<[f32]>,
    frames_per_slot: usize,
    channels: usize,
}

impl CaptureCallback {
    pub fn new(
        shared: Arc<CaptureShared>,
        producer: SlotProducer,
        channels: usize,
        policy: OverflowPolicy,
    ) -> Self {
        let slot_len = producer.slot_len();
        let held_len = match policy {
            OverflowPolicy::Drop => 0,
            OverflowPolicy::HoldOver => slot_len,
        };
        Self {
            shared,
            producer,
            policy,
            carry: vec![0.0; slot_len].into_boxed_slice(),
            carry_len: 0,
            held: vec![0.0; held_len].into_boxed_slice(),
            frames_per_slot: slot_len / channels.max(1),
            channels,
        }
    }

    pub fn capture(&mut self, mut input: &[f32]) -> CallbackFlow {
        match self.shared.state.transition(CaptureState::Recording) {
            Ok(_) => {}
            Err(CaptureState::ShouldStop) => {
                // last chance for a parked chunk; the tick drains it after completion
                if self.push_held().is_err() {
                    self.shared.holding.set(false);
                    self.shared.dropped.record();
                }
                return CallbackFlow::Complete;
            }
            // stop requested: the tick is draining, take no more input
            Err(_) => {
                let _ = self.push_held();
                return CallbackFlow::Continue;
            }
        }

        let _ = self.push_held();

        while !input.is_empty() {
            let n = input.len().min(self.carry.len() - self.carry_len);
            self.carry[self.carry_len..self.carry_len + n].copy_from_slice(&input[..n]);
            self.carry_len += n;
            input = &input[n..];

            if self.carry_len == self.carry.len() {
                self.carry_len = 0;
                self.shared
                    .effect
                    .process(&mut self.carry, self.frames_per_slot, self.channels);
                self.shared.captured.record();
                self.store_chunk();
            }
        }

        CallbackFlow::Continue
    }

    /// Move the parked chunk into the ring. `Err` if it is still parked.
    fn push_held(&mut self) -> Result<(), ()> {
        if !self.shared.holding.get() {
            return Ok(());
        }
        self.producer.push(&self.held).map_err(|_| ())?;
        self.shared.holding.set(false);
        Ok(())
    }

    fn store_chunk(&mut self) {
        if self.push_held().is_err() {
            self.shared.dropped.record();
            return;
        }

        if self.producer.push(&self.carry).is_err() {
            match self.policy {
                OverflowPolicy::HoldOver => {
                    self.held.copy_from_slice(&self.carry);
                    self.shared.holding.set(true);
                }
                OverflowPolicy::Drop => self.shared.dropped.record(),
            }
        }
    }
}
