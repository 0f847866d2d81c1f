//! Fixed-capacity slot ring shared between the audio callback and the control path.
//!
//! The ring owns `capacity` pre-allocated slots of `slot_len` samples each. Every
//! slot carries a status tag (`Writable` or `Readable`). The producer only ever
//! touches the slot under its cursor while it is tagged `Writable`, the consumer
//! only the slot under its cursor while it is tagged `Readable`. Publishing a slot
//! is a release store of its tag, observing one is an acquire load, so sample data
//! written before the tag flip is visible to the other side.
//!
//! Readable slots always form one contiguous run in circular order, starting at the
//! consumer's cursor. Empty and full are therefore read straight off the tags and
//! never confused with each other, unlike a bare pair of cursors.
//!
//! `push` and `pop` never allocate and never block.

use crate::{Error, Result};
use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

const WRITABLE: u8 = 0;
const READABLE: u8 = 1;

/// Why a push was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PushError {
    #[error("ring is full")]
    Full,
    #[error("buffer length {actual} does not match slot length {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

/// Why a pop was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PopError {
    #[error("ring is empty")]
    Empty,
    #[error("buffer length {actual} does not match slot length {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}

struct Slot {
    samples: UnsafeCell<Box<[f32]>>,
    status: AtomicU8,
}

struct SlotRing {
    slots: Box<[Slot]>,
    slot_len: usize,
}

// SAFETY: slot contents are only accessed by the side that currently owns the slot
// according to its status tag, and ownership moves with acquire/release on the tag.
// `SlotProducer` and `SlotConsumer` are not `Clone`, so there is one of each side.
unsafe impl Sync for SlotRing {}

impl SlotRing {
    fn count(&self, kind: u8) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.status.load(Ordering::Acquire) == kind)
            .count()
    }
}

/// Create a ring of `capacity` slots of `slot_len` samples.
///
/// All storage (`slot_len * capacity` samples) is allocated here and reused for the
/// lifetime of the ring.
pub fn slot_ring(slot_len: usize, capacity: usize) -> Result<(SlotProducer, SlotConsumer)> {
    if slot_len == 0 || capacity == 0 {
        return Err(Error::InvalidConfig(format!(
            "slot ring needs non-zero sizes (slot_len={slot_len}, capacity={capacity})"
        )));
    }

    let slots = (0..capacity)
        .map(|_| Slot {
            samples: UnsafeCell::new(vec![0.0; slot_len].into_boxed_slice()),
            status: AtomicU8::new(WRITABLE),
        })
        .collect::<Vec<_>>()
        .into_boxed_slice();

    let ring = Arc::new(SlotRing { slots, slot_len });

    Ok((
        SlotProducer {
            ring: Arc::clone(&ring),
            next_writable: 0,
        },
        SlotConsumer {
            ring,
            next_readable: 0,
        },
    ))
}

macro_rules! ring_observers {
    ($half:ty) => {
        impl $half {
            /// Number of slots per ring.
            pub fn capacity(&self) -> usize {
                self.ring.slots.len()
            }

            /// Samples per slot.
            pub fn slot_len(&self) -> usize {
                self.ring.slot_len
            }

            /// Slots holding pending data, recounted on every call.
            pub fn available_read(&self) -> usize {
                self.ring.count(READABLE)
            }

            /// Slots free for writing, recounted on every call.
            pub fn available_write(&self) -> usize {
                self.ring.count(WRITABLE)
            }

            pub fn is_full(&self) -> bool {
                self.available_write() == 0
            }

            pub fn is_empty(&self) -> bool {
                self.available_read() == 0
            }
        }
    };
}

/// Writing half of a slot ring.
pub struct SlotProducer {
    ring: Arc<SlotRing>,
    next_writable: usize,
}

ring_observers!(SlotProducer);

impl SlotProducer {
    /// Copy `buffer` into the next writable slot.
    pub fn push(&mut self, buffer: &[f32]) -> std::result::Result<(), PushError> {
        if buffer.len() != self.ring.slot_len {
            return Err(PushError::LengthMismatch {
                expected: self.ring.slot_len,
                actual: buffer.len(),
            });
        }
        self.push_with(|slot| slot.copy_from_slice(buffer))
    }

    /// Fill the next writable slot in place and publish it.
    pub fn push_with<F>(&mut self, fill: F) -> std::result::Result<(), PushError>
    where
        F: FnOnce(&mut [f32]),
    {
        let slot = &self.ring.slots[self.next_writable];
        if slot.status.load(Ordering::Acquire) != WRITABLE {
            return Err(PushError::Full);
        }

        // SAFETY: the slot is tagged Writable and we are the only producer, so the
        // consumer will not read it until the release store below.
        let samples = unsafe { &mut *slot.samples.get() };
        fill(samples);

        slot.status.store(READABLE, Ordering::Release);
        self.next_writable = (self.next_writable + 1) % self.ring.slots.len();
        Ok(())
    }
}

/// Reading half of a slot ring.
pub struct SlotConsumer {
    ring: Arc<SlotRing>,
    next_readable: usize,
}

ring_observers!(SlotConsumer);

impl SlotConsumer {
    /// Copy the oldest readable slot into `out` and release the slot.
    pub fn pop(&mut self, out: &mut [f32]) -> std::result::Result<(), PopError> {
        if out.len() != self.ring.slot_len {
            return Err(PopError::LengthMismatch {
                expected: self.ring.slot_len,
                actual: out.len(),
            });
        }
        self.pop_with(|slot| out.copy_from_slice(slot))
    }

    /// Hand the oldest readable slot to `read` and release it afterwards.
    ///
    /// The slice is mutable so in-place processing does not need a copy.
    pub fn pop_with<F>(&mut self, read: F) -> std::result::Result<(), PopError>
    where
        F: FnOnce(&mut [f32]),
    {
        let slot = &self.ring.slots[self.next_readable];
        if slot.status.load(Ordering::Acquire) != READABLE {
            return Err(PopError::Empty);
        }

        // SAFETY: the slot is tagged Readable and we are the only consumer, so the
        // producer will not write it until the release store below.
        let samples = unsafe { &mut *slot.samples.get() };
        read(samples);

        slot.status.store(WRITABLE, Ordering::Release);
        self.next_readable = (self.next_readable + 1) % self.ring.slots.len();
        Ok(())
    }

    /// Release every readable slot without copying. Returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.pop_with(|_| {}).is_ok() {
            dropped += 1;
        }
        dropped
    }
}
