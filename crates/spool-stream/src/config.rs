//! Engine configuration.

use serde::{Deserialize, Serialize};
use spool_core::{Error, Result, StreamFormat};
use std::time::Duration;

/// Allowed control tick interval, in milliseconds.
pub const TICK_INTERVAL_RANGE_MS: std::ops::RangeInclusive<u64> = 1..=50;

/// What the capture callback does with a chunk when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Drop the chunk and count it.
    #[default]
    Drop,
    /// Keep one chunk aside and push it ahead of new input next period.
    /// Only chunks arriving while the hold-over is occupied are dropped.
    HoldOver,
}

/// Playback engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Frames per ring slot, also requested as the device period (default: 4096)
    pub chunk_size: usize,
    /// Ring capacity in slots (default: 4)
    pub slot_count: usize,
    /// Readable-slot count under which the callback asks for a refill (default: 3)
    pub low_water_mark: usize,
    /// Control tick interval in milliseconds (default: 10)
    pub tick_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            slot_count: 4,
            low_water_mark: 3,
            tick_interval_ms: 10,
        }
    }
}

impl PlayerConfig {
    /// Default config with a different chunk size.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            ..Default::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_ring(self.chunk_size, self.slot_count)?;
        validate_tick(self.tick_interval_ms)?;
        if self.low_water_mark > self.slot_count {
            return Err(Error::InvalidConfig(format!(
                "low_water_mark {} exceeds slot_count {}",
                self.low_water_mark, self.slot_count
            )));
        }
        Ok(())
    }
}

/// Capture engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Frames per ring slot, also requested as the device period (default: 4096)
    pub chunk_size: usize,
    /// Ring capacity in slots (default: 4)
    pub slot_count: usize,
    /// Control tick interval in milliseconds (default: 10)
    pub tick_interval_ms: u64,
    /// Ring-full behaviour of the capture callback (default: drop)
    pub overflow: OverflowPolicy,
    /// Minimum time between free-space probes in milliseconds (default: 1000)
    pub disk_poll_interval_ms: u64,
    /// Capture format; `None` uses the input device's default
    pub format: Option<StreamFormat>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            chunk_size: 4096,
            slot_count: 4,
            tick_interval_ms: 10,
            overflow: OverflowPolicy::Drop,
            disk_poll_interval_ms: 1000,
            format: None,
        }
    }
}

impl RecorderConfig {
    pub fn with_format(format: StreamFormat) -> Self {
        Self {
            format: Some(format),
            ..Default::default()
        }
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn disk_poll_interval(&self) -> Duration {
        Duration::from_millis(self.disk_poll_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        validate_ring(self.chunk_size, self.slot_count)?;
        validate_tick(self.tick_interval_ms)?;
        if let Some(format) = self.format {
            if format.channels == 0 || format.sample_rate == 0 {
                return Err(Error::InvalidConfig(format!(
                    "capture format needs channels and a sample rate, got {format:?}"
                )));
            }
        }
        Ok(())
    }
}

fn validate_ring(chunk_size: usize, slot_count: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(Error::InvalidConfig("chunk_size must be non-zero".into()));
    }
    if slot_count == 0 {
        return Err(Error::InvalidConfig("slot_count must be non-zero".into()));
    }
    if u32::try_from(chunk_size).is_err() {
        return Err(Error::InvalidConfig(format!(
            "chunk_size {chunk_size} does not fit a device period"
        )));
    }
    Ok(())
}

fn validate_tick(tick_interval_ms: u64) -> Result<()> {
    if !TICK_INTERVAL_RANGE_MS.contains(&tick_interval_ms) {
        return Err(Error::InvalidConfig(format!(
            "tick_interval_ms {tick_interval_ms} outside {}..={}",
            TICK_INTERVAL_RANGE_MS.start(),
            TICK_INTERVAL_RANGE_MS.end()
        )));
    }
    Ok(())
}
