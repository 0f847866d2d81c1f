//! Test helpers and fixtures for spool integration tests.
//!
//! Fixtures are float WAV files whose every sample encodes its own position, so a
//! test can tell exactly which frame a rendered sample came from:
//! [`ramp_sample`] is exact in `f32` for any frame.

#![allow(dead_code)]

pub mod tolerances;

use spool::prelude::*;
use std::path::{Path, PathBuf};

/// Sample value of `channel` at `frame` in a ramp fixture.
pub fn ramp_sample(frame: u64, channel: u16) -> f32 {
    let value = (frame % 65536) as f32 / 65536.0;
    if channel % 2 == 0 {
        value
    } else {
        -value
    }
}

/// Write a float ramp fixture of `frames` frames.
pub fn write_ramp_wav(path: &Path, format: StreamFormat, frames: u64) {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).expect("create fixture");
    for frame in 0..frames {
        for channel in 0..format.channels {
            writer
                .write_sample(ramp_sample(frame, channel))
                .expect("write fixture");
        }
    }
    writer.finalize().expect("finalize fixture");
}

/// Temp dir plus a ramp fixture inside it. Keep the dir alive for the test.
pub fn ramp_fixture(format: StreamFormat, seconds: f64) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("ramp.wav");
    let frames = (seconds * format.sample_rate as f64).round() as u64;
    write_ramp_wav(&path, format, frames);
    (dir, path)
}

/// All samples of a float WAV file.
pub fn read_wav(path: &Path) -> Vec<f32> {
    hound::WavReader::open(path)
        .expect("open wav")
        .samples::<f32>()
        .map(|s| s.expect("read sample"))
        .collect()
}

/// `true` if every sample is below the silence threshold.
pub fn is_silent(samples: &[f32]) -> bool {
    samples
        .iter()
        .all(|s| s.abs() < tolerances::SILENCE_THRESHOLD)
}

/// Install a test-writer tracing subscriber so engine logs show up on failure.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing_subscriber::filter::LevelFilter::DEBUG)
        .try_init();
}

/// Render one period and run one control tick, like a device and a control thread
/// that never fall behind. `None` once the output stream stops being called.
pub fn step<T: Tick>(backend: &OfflineBackend, engine: &mut T) -> Option<Vec<f32>> {
    let out = backend.render_period()?;
    engine.tick();
    Some(out)
}
