//! File playback and capture for spool.
//!
//! # Primary API
//!
//! - [`Player`]: stream a file to an output device
//! - [`Recorder`]: stream an input device to a file
//! - [`TickDriver`]: run an engine's control tick on its own thread
//! - [`SampleReader`] / [`SampleWriter`]: the file adapter seam, with WAV implementations
//!
//! # Example
//!
//! ```ignore
//! use spool_stream::{Player, TickDriver};
//! use spool_core::CpalBackend;
//!
//! let mut player = Player::new(CpalBackend::new());
//! player.load("song.wav")?;
//! player.play()?;
//!
//! let interval = player.config().tick_interval();
//! let player = Arc::new(Mutex::new(player));
//! let driver = TickDriver::spawn(Arc::clone(&player), interval)?;
//! ```

pub mod config;
pub mod disk;
pub mod driver;
pub mod error;
pub mod file;
pub mod player;
pub mod recorder;

pub use config::{OverflowPolicy, PlayerConfig, RecorderConfig};
pub use disk::{available_space, DiskSpaceProbe};
pub use driver::{Tick, TickDriver};
pub use error::{Error, Result};
pub use file::{ms_to_frame, SampleReader, SampleWriter, WavReader, WavWriter};
pub use player::Player;
pub use recorder::Recorder;
