//! Error types for spool-core.

use crate::backend::Direction;
use thiserror::Error;

/// Error type for spool-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("No default {0} device")]
    NoDevice(Direction),

    #[error("Unsupported sample format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream is closed")]
    StreamClosed,

    #[error("Failed to enumerate devices")]
    DevicesError(#[from] cpal::DevicesError),

    #[error("Audio device not available")]
    DeviceNotAvailable(#[from] cpal::DefaultStreamConfigError),

    #[error("Failed to build audio stream")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Failed to play audio stream")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("Failed to pause audio stream")]
    PauseStream(#[from] cpal::PauseStreamError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
