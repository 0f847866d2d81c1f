//! Error types.

use thiserror::Error;

/// Error type for the playback and capture engines.
#[derive(Error, Debug)]
pub enum Error {
    /// Core error (ring, backend, configuration).
    #[error(transparent)]
    Core(#[from] spool_core::Error),

    /// `play` or `seek` with no file loaded.
    #[error("No file loaded")]
    NotLoaded,

    /// `record` or `flush` with no file open.
    #[error("No file open for recording")]
    NotOpen,

    /// Volume outside `[0, 1]`.
    #[error("Volume {0} out of range [0, 1]")]
    VolumeOutOfRange(f32),

    /// Seek target that is not a finite number.
    #[error("Invalid seek position: {0} ms")]
    InvalidSeek(f64),

    /// WAV encoding the file adapter cannot decode.
    #[error("Unsupported file: {0}")]
    UnsupportedFile(String),

    /// WAV codec error.
    #[error("Hound error: {0}")]
    Hound(#[from] hound::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;
