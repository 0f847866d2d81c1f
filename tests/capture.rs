//! Capture engine scenarios against the offline backend.
//!
//! Run with:
//! ```bash
//! cargo test -p spool --test capture
//! ```

#[path = "helpers/mod.rs"]
mod helpers;

use approx::assert_relative_eq;
use helpers::tolerances::FLOAT_EPSILON;
use helpers::{init_tracing, read_wav};
use spool::prelude::*;
use spool::stream::Error;
use spool::{EffectChain, Gain};
use std::path::PathBuf;

const MONO: StreamFormat = StreamFormat {
    channels: 1,
    sample_rate: 8000,
};
const CHUNK: usize = 256;

struct Rig {
    _dir: tempfile::TempDir,
    path: PathBuf,
    backend: OfflineBackend,
    recorder: Recorder<OfflineBackend>,
}

fn rig(overflow: OverflowPolicy) -> Rig {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("take.wav");
    let backend = OfflineBackend::new(MONO);
    let config = RecorderConfig {
        chunk_size: CHUNK,
        overflow,
        ..RecorderConfig::with_format(MONO)
    };
    let recorder = Recorder::with_config(backend.clone(), config).unwrap();
    Rig {
        _dir: dir,
        path,
        backend,
        recorder,
    }
}

/// One device period where every sample is `value`.
fn period(value: f32) -> Vec<f32> {
    vec![value; CHUNK]
}

fn chunk_values(samples: &[f32]) -> Vec<f32> {
    samples
        .chunks(CHUNK)
        .map(|chunk| {
            assert!(chunk.iter().all(|&s| s == chunk[0]), "chunk torn");
            chunk[0]
        })
        .collect()
}

// =============================================================================
// Recording
// =============================================================================

#[test]
fn test_record_and_drain_to_file() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();
    assert_eq!(rig.recorder.state(), CaptureState::Stopped);
    assert_eq!(rig.recorder.format(), Some(MONO));

    rig.recorder.record().unwrap();
    assert_eq!(rig.recorder.state(), CaptureState::Recording);
    for i in 0..6 {
        assert!(rig.backend.capture(&period(i as f32 * 0.1)));
        assert!(rig.recorder.tick());
    }
    assert_eq!(rig.recorder.captured_chunks(), 6);
    assert_eq!(rig.recorder.buffered_slots(), 0);
    assert_eq!(rig.recorder.frames_written(), 6 * CHUNK as u64);
    assert_relative_eq!(rig.recorder.current_time(), 6.0 * 256.0 / 8000.0);

    rig.recorder.stop().unwrap();
    rig.recorder.close().unwrap();

    let written = chunk_values(&read_wav(&rig.path));
    assert_eq!(written.len(), 6);
    for (i, value) in written.iter().enumerate() {
        assert_relative_eq!(*value, i as f32 * 0.1, epsilon = FLOAT_EPSILON);
    }
}

#[test]
fn test_short_periods_are_assembled() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();

    let samples: Vec<f32> = (0..CHUNK * 2).map(|i| i as f32 / 1024.0).collect();
    for part in samples.chunks(100) {
        rig.backend.capture(part);
    }
    assert_eq!(rig.recorder.captured_chunks(), 2);
    assert_eq!(rig.recorder.flush().unwrap(), 2);
    rig.recorder.close().unwrap();

    assert_eq!(read_wav(&rig.path), samples);
}

#[test]
fn test_device_default_format() {
    let dir = tempfile::tempdir().unwrap();
    let backend = OfflineBackend::new(StreamFormat::new(2, 48000));
    let mut recorder = Recorder::new(backend.clone());
    recorder.open(dir.path().join("take.wav")).unwrap();

    assert_eq!(recorder.format(), Some(StreamFormat::new(2, 48000)));
    let params = backend.input_params().unwrap();
    assert_eq!(params.period_frames, 4096);
    assert_eq!(params.format.channels, 2);
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_full_ring_drops_without_terminating() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();

    // the control thread stalls while the device keeps delivering
    for i in 0..10 {
        assert!(rig.backend.capture(&period(i as f32)));
    }
    assert_eq!(rig.recorder.captured_chunks(), 10);
    assert_eq!(rig.recorder.dropped_chunks(), 6);
    assert_eq!(rig.recorder.buffered_slots(), 4);
    assert!(rig.recorder.is_active());
    assert_eq!(rig.recorder.state(), CaptureState::Recording);

    // the loss is reported and recording carries on
    assert!(rig.recorder.tick());
    assert!(rig.backend.capture(&period(10.0)));
    assert_eq!(rig.recorder.flush().unwrap(), 4);
    rig.recorder.close().unwrap();

    assert_eq!(
        chunk_values(&read_wav(&rig.path)),
        vec![0.0, 1.0, 2.0, 3.0, 10.0]
    );
}

#[test]
fn test_hold_over_keeps_one_chunk() {
    let mut rig = rig(OverflowPolicy::HoldOver);
    assert_eq!(rig.recorder.overflow_policy(), OverflowPolicy::HoldOver);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();

    for i in 0..10 {
        rig.backend.capture(&period(i as f32));
    }
    // chunk 4 is held, 5..=9 are lost
    assert_eq!(rig.recorder.dropped_chunks(), 5);

    assert!(rig.recorder.tick());
    rig.backend.capture(&period(10.0));
    rig.recorder.flush().unwrap();
    rig.recorder.close().unwrap();

    assert_eq!(
        chunk_values(&read_wav(&rig.path)),
        vec![0.0, 1.0, 2.0, 3.0, 4.0]
    );
}

// =============================================================================
// Stopping
// =============================================================================

#[test]
fn test_graceful_stop_drains_everything() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();
    rig.backend.capture(&period(0.25));
    rig.backend.capture(&period(0.5));

    rig.recorder.request_stop().unwrap();
    assert_eq!(rig.recorder.state(), CaptureState::StopRequested);

    // input after the request is not taken
    assert!(rig.backend.capture(&period(0.75)));
    assert_eq!(rig.recorder.captured_chunks(), 2);

    assert!(rig.recorder.tick());
    assert_eq!(rig.recorder.state(), CaptureState::ShouldStop);
    assert_eq!(rig.recorder.buffered_slots(), 0);

    // the next period completes the stream
    assert!(rig.backend.capture(&period(1.0)));
    assert_eq!(rig.recorder.state(), CaptureState::Stopped);
    assert!(!rig.backend.capture(&period(1.0)));
    assert!(!rig.recorder.tick());
    assert!(!rig.recorder.is_active());

    rig.recorder.close().unwrap();
    assert_eq!(chunk_values(&read_wav(&rig.path)), vec![0.25, 0.5]);
}

#[test]
fn test_graceful_stop_writes_held_over_chunk() {
    let mut rig = rig(OverflowPolicy::HoldOver);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();
    for i in 0..5 {
        rig.backend.capture(&period(i as f32));
    }
    assert_eq!(rig.recorder.buffered_slots(), 4);

    rig.recorder.request_stop().unwrap();
    // the ring is still full, so the held chunk waits
    assert!(rig.backend.capture(&period(9.0)));
    assert!(rig.recorder.tick());
    assert_eq!(rig.recorder.state(), CaptureState::ShouldStop);

    // the completing period parks it in the drained ring
    assert!(rig.backend.capture(&period(9.0)));
    assert_eq!(rig.recorder.state(), CaptureState::Stopped);
    assert!(!rig.recorder.tick());
    rig.recorder.close().unwrap();

    let written = chunk_values(&read_wav(&rig.path));
    assert_eq!(written, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(rig.recorder.captured_chunks(), 5);
    assert_eq!(rig.recorder.dropped_chunks(), 0);
}

#[test]
fn test_close_counts_held_over_chunk_as_dropped() {
    let mut rig = rig(OverflowPolicy::HoldOver);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();
    for i in 0..5 {
        rig.backend.capture(&period(i as f32));
    }
    assert_eq!(rig.recorder.dropped_chunks(), 0);
    assert_eq!(rig.recorder.flush().unwrap(), 4);
    rig.recorder.close().unwrap();

    let written = chunk_values(&read_wav(&rig.path)).len() as u64;
    assert_eq!(rig.recorder.dropped_chunks(), 1);
    assert_eq!(written + rig.recorder.dropped_chunks(), rig.recorder.captured_chunks());
}

#[test]
fn test_stop_keeps_queue_until_close() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();
    for i in 0..3 {
        rig.backend.capture(&period(i as f32));
    }

    rig.recorder.stop().unwrap();
    assert_eq!(rig.recorder.state(), CaptureState::Stopped);
    assert!(rig.backend.input_closed());
    assert!(!rig.backend.capture(&period(9.0)));
    assert_eq!(rig.recorder.buffered_slots(), 3);
    assert!(matches!(rig.recorder.record(), Err(Error::NotOpen)));

    assert_eq!(rig.recorder.flush().unwrap(), 3);
    rig.recorder.close().unwrap();
    assert_eq!(chunk_values(&read_wav(&rig.path)), vec![0.0, 1.0, 2.0]);
}

#[test]
fn test_close_discards_undrained() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();
    rig.recorder.record().unwrap();
    rig.backend.capture(&period(0.5));
    rig.recorder.tick();
    rig.backend.capture(&period(0.6));

    rig.recorder.close().unwrap();
    rig.recorder.close().unwrap();

    assert!(!rig.recorder.is_open());
    assert_eq!(rig.recorder.state(), CaptureState::Stopped);
    assert_eq!(rig.recorder.free_space(), None);
    assert_eq!(chunk_values(&read_wav(&rig.path)), vec![0.5]);
    assert!(matches!(rig.recorder.record(), Err(Error::NotOpen)));
    assert!(matches!(rig.recorder.flush(), Err(Error::NotOpen)));
}

#[test]
fn test_free_space_tracks_recording_volume() {
    let mut rig = rig(OverflowPolicy::Drop);
    assert_eq!(rig.recorder.free_space(), None);
    rig.recorder.open(&rig.path).unwrap();

    let volume = spool::available_space(rig._dir.path());
    assert_eq!(rig.recorder.free_space().is_some(), volume.is_some());

    rig.recorder.record().unwrap();
    rig.backend.capture(&period(0.5));
    assert!(rig.recorder.tick());
    assert_eq!(rig.recorder.free_space().is_some(), volume.is_some());
}

#[test]
fn test_no_input_device() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = Recorder::new(OfflineBackend::without_devices());
    assert!(matches!(
        recorder.open(dir.path().join("take.wav")),
        Err(Error::Core(spool::core::Error::NoDevice(_)))
    ));
    assert!(!recorder.is_open());
    assert!(!recorder.tick());
}

// =============================================================================
// Effects
// =============================================================================

#[test]
fn test_effect_runs_before_storage() {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path).unwrap();

    let meter = LevelMeter::new(1);
    rig.recorder
        .insert_effect(EffectChain::new().with(Gain::new(0.5)).with(meter.clone()));
    rig.recorder.record().unwrap();
    rig.backend.capture(&period(0.8));
    rig.recorder.flush().unwrap();
    rig.recorder.close().unwrap();

    assert_eq!(chunk_values(&read_wav(&rig.path)), vec![0.4]);
    assert_relative_eq!(meter.level_db(0).unwrap(), 20.0 * 0.4f32.log10(), epsilon = 1e-4);
}

#[test]
fn test_errors_propagate_through_umbrella_result() -> spool::Result<()> {
    let mut rig = rig(OverflowPolicy::Drop);
    rig.recorder.open(&rig.path)?;
    rig.recorder.record()?;
    rig.backend.capture(&period(0.125));
    rig.recorder.flush()?;
    rig.recorder.close()?;

    let err = rig.recorder.record().map_err(spool::Error::from).unwrap_err();
    assert!(matches!(err, spool::Error::Stream(Error::NotOpen)));
    Ok(())
}
