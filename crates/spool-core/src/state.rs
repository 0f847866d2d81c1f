//! Stream state machines shared by the audio callback and the control path.
//!
//! Each stream owns exactly one [`AtomicState`]. Both threads write it, so every
//! change goes through [`AtomicState::transition`], which checks the move against
//! the legal transition table and applies it in a single atomic step. A refused
//! transition leaves the state untouched; that is how the callback avoids
//! overwriting a stop decision made by the control path.

use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU8, Ordering};

/// A stream state that can live in an [`AtomicState`].
pub trait StreamState: Copy + Eq + fmt::Debug + Send + Sync + 'static {
    fn to_u8(self) -> u8;
    fn from_u8(value: u8) -> Self;
    /// Whether `from -> to` is an allowed move.
    fn is_legal(from: Self, to: Self) -> bool;
}

/// Playback stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PlaybackState {
    /// Ring holds enough data.
    HasData = 0,
    /// Ring fell under the low-water mark (or ran dry); the tick should refill.
    NeedData = 1,
    /// File exhausted; the callback completes once the ring is drained.
    ShouldStop = 2,
    Stopped = 3,
}

impl StreamState for PlaybackState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::HasData,
            1 => Self::NeedData,
            2 => Self::ShouldStop,
            _ => Self::Stopped,
        }
    }

    fn is_legal(from: Self, to: Self) -> bool {
        use PlaybackState::*;
        match (from, to) {
            (_, Stopped) => true,
            (Stopped, HasData | ShouldStop) => true,
            (HasData | NeedData, HasData | NeedData | ShouldStop) => true,
            // seeking back from the end of the file
            (ShouldStop, HasData | ShouldStop) => true,
            _ => false,
        }
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::HasData => "has-data",
            Self::NeedData => "need-data",
            Self::ShouldStop => "should-stop",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Capture stream state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CaptureState {
    /// Host asked for a graceful stop; the tick drains the ring first.
    StopRequested = 0,
    /// Ring drained; the callback completes on its next period.
    ShouldStop = 1,
    Recording = 2,
    Stopped = 3,
}

impl StreamState for CaptureState {
    fn to_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::StopRequested,
            1 => Self::ShouldStop,
            2 => Self::Recording,
            _ => Self::Stopped,
        }
    }

    fn is_legal(from: Self, to: Self) -> bool {
        use CaptureState::*;
        match (from, to) {
            (_, Stopped) => true,
            (Stopped | Recording, Recording) => true,
            (Recording, StopRequested | ShouldStop) => true,
            (StopRequested, StopRequested | ShouldStop) => true,
            (ShouldStop, ShouldStop) => true,
            _ => false,
        }
    }
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::StopRequested => "stop-requested",
            Self::ShouldStop => "should-stop",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Atomically updated stream state.
#[derive(Debug)]
pub struct AtomicState<S: StreamState> {
    value: AtomicU8,
    _state: PhantomData<S>,
}

impl<S: StreamState> AtomicState<S> {
    pub fn new(initial: S) -> Self {
        Self {
            value: AtomicU8::new(initial.to_u8()),
            _state: PhantomData,
        }
    }

    #[inline]
    pub fn load(&self) -> S {
        S::from_u8(self.value.load(Ordering::Acquire))
    }

    /// Move to `to` if that is legal from the current state.
    ///
    /// Returns the previous state on success, the unchanged current state if the
    /// move was refused.
    #[inline]
    pub fn transition(&self, to: S) -> Result<S, S> {
        self.value
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                S::is_legal(S::from_u8(current), to).then_some(to.to_u8())
            })
            .map(S::from_u8)
            .map_err(S::from_u8)
    }

    /// Move `from -> to` only if the state is still `from`.
    #[inline]
    pub fn compare_transition(&self, from: S, to: S) -> bool {
        S::is_legal(from, to)
            && self
                .value
                .compare_exchange(from.to_u8(), to.to_u8(), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }
}
