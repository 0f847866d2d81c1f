//! Playback engine scenarios against the offline backend.
//!
//! Run with:
//! ```bash
//! cargo test -p spool --test playback
//! ```

#[path = "helpers/mod.rs"]
mod helpers;

use approx::assert_relative_eq;
use helpers::tolerances::TIME_EPSILON;
use helpers::{init_tracing, is_silent, ramp_fixture, ramp_sample, step};
use parking_lot::Mutex;
use spool::prelude::*;
use spool::stream::Error;
use std::sync::Arc;
use std::time::Duration;

const CD: StreamFormat = StreamFormat {
    channels: 2,
    sample_rate: 44100,
};

fn player(backend: &OfflineBackend) -> Player<OfflineBackend> {
    Player::with_config(backend.clone(), PlayerConfig::default()).unwrap()
}

// =============================================================================
// Full run
// =============================================================================

#[test]
fn test_ten_seconds_play_to_stopped() {
    init_tracing();
    let (_dir, path) = ramp_fixture(CD, 10.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);

    player.load(&path).unwrap();
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.buffered_slots(), 4);
    assert_relative_eq!(player.duration(), 10.0);
    assert_eq!(
        backend.output_params().unwrap().period_frames,
        player.config().chunk_size as u32
    );

    player.play().unwrap();
    assert_eq!(player.state(), PlaybackState::HasData);

    let mut periods = 0;
    while step(&backend, &mut player).is_some() {
        periods += 1;
        assert!(periods <= 200, "playback never finished");
    }

    // 441000 frames in 4096-frame chunks
    assert_eq!(periods, 108);
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert_eq!(player.underruns(), 0);
    assert_relative_eq!(player.current_time(), 10.0);
    assert_relative_eq!(player.position_ratio(), 1.0);

    // the stream is finished: no more callbacks, tick has nothing to do
    assert!(!player.tick());
    assert!(!player.is_active());
    assert!(backend.render_period().is_none());
    assert_eq!(backend.output_callbacks(), 108);
}

#[test]
fn test_played_samples_match_file() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();

    let mut frame = 0u64;
    while let Some(out) = step(&backend, &mut player) {
        for chunk in out.chunks(2) {
            if frame < 44100 {
                assert_eq!(chunk[0], ramp_sample(frame, 0), "frame {frame}");
                assert_eq!(chunk[1], ramp_sample(frame, 1), "frame {frame}");
            } else {
                // zero padding after the last frame
                assert_eq!(chunk, [0.0, 0.0]);
            }
            frame += 1;
        }
    }
    assert!(frame >= 44100);
}

#[test]
fn test_device_period_differs_from_chunk() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();

    let mut frame = 0u64;
    for _ in 0..20 {
        let out = backend.render(1000).unwrap();
        player.tick();
        for chunk in out.chunks(2) {
            assert_eq!(chunk[0], ramp_sample(frame, 0));
            frame += 1;
        }
    }
    assert_relative_eq!(player.current_time(), 20_000.0 / 44100.0, epsilon = TIME_EPSILON);
}

// =============================================================================
// Seek
// =============================================================================

#[test]
fn test_seek_while_playing_drops_stale_audio() {
    let (_dir, path) = ramp_fixture(CD, 10.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();

    // leave a partially played slot behind
    for _ in 0..3 {
        backend.render(1000).unwrap();
        player.tick();
    }

    player.seek(5000.0).unwrap();
    assert_relative_eq!(player.current_time(), 5.0);
    assert_eq!(player.buffered_slots(), 4);
    assert!(player.is_active());

    let out = backend.render(1000).unwrap();
    assert_eq!(out[0], ramp_sample(220_500, 0));
    assert_eq!(out[1], ramp_sample(220_500, 1));
    assert_eq!(out[2], ramp_sample(220_501, 0));
    assert_relative_eq!(
        player.current_time(),
        5.0 + 1000.0 / 44100.0,
        epsilon = TIME_EPSILON
    );
}

#[test]
fn test_seek_while_paused_stays_paused() {
    let (_dir, path) = ramp_fixture(CD, 10.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();
    step(&backend, &mut player).unwrap();

    player.pause().unwrap();
    player.seek(2000.0).unwrap();
    assert!(!player.is_active());
    assert!(backend.render_period().is_none());

    player.play().unwrap();
    let out = backend.render_period().unwrap();
    assert_eq!(out[0], ramp_sample(88_200, 0));
}

/// Constant-level source whose seeks always fail, like a file on a detached drive.
struct UnseekableReader {
    frames_left: u64,
}

impl spool::SampleReader for UnseekableReader {
    fn format(&self) -> StreamFormat {
        CD
    }

    fn total_frames(&self) -> u64 {
        2 * 44100
    }

    fn read_some(&mut self, buf: &mut [f32]) -> spool::stream::Result<usize> {
        let frames = (buf.len() as u64 / 2).min(self.frames_left);
        self.frames_left -= frames;
        let samples = frames as usize * 2;
        buf[..samples].fill(0.25);
        Ok(samples)
    }

    fn seek_frame(&mut self, _frame: u64) -> spool::stream::Result<()> {
        Err(Error::Io(std::io::Error::other("device removed")))
    }
}

#[test]
fn test_failed_seek_closes_stream() {
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player
        .load_reader(Box::new(UnseekableReader {
            frames_left: 2 * 44100,
        }))
        .unwrap();
    player.play().unwrap();
    step(&backend, &mut player).unwrap();

    assert!(matches!(player.seek(1000.0), Err(Error::Io(_))));
    assert!(!player.is_loaded());
    assert!(!player.is_active());
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!(backend.output_closed());
    assert!(backend.render_period().is_none());
    assert!(!player.tick());
    assert!(matches!(player.seek(0.0), Err(Error::NotLoaded)));
}

#[test]
fn test_seek_clamps() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();

    player.seek(-250.0).unwrap();
    assert_eq!(player.current_time(), 0.0);

    player.play().unwrap();
    player.seek(60_000.0).unwrap();
    assert_relative_eq!(player.current_time(), 1.0);
    assert_eq!(player.state(), PlaybackState::ShouldStop);

    // nothing left to play: the next period completes the stream
    let out = backend.render_period().unwrap();
    assert!(is_silent(&out));
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!(backend.render_period().is_none());

    assert!(matches!(player.seek(f64::NAN), Err(Error::InvalidSeek(_))));
}

// =============================================================================
// Underrun
// =============================================================================

#[test]
fn test_underrun_emits_silence() {
    init_tracing();
    let (_dir, path) = ramp_fixture(CD, 10.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();

    // the control thread stalls: drain the prebuffer without ticking
    for _ in 0..4 {
        let out = backend.render_period().unwrap();
        assert!(!is_silent(&out[2..]));
    }
    assert_eq!(player.state(), PlaybackState::NeedData);

    let out = backend.render_period().unwrap();
    assert_eq!(out.len(), 4096 * 2);
    assert!(out.iter().all(|&s| s == 0.0));
    assert_eq!(player.state(), PlaybackState::NeedData);
    assert_eq!(player.underruns(), 1);
    assert!(player.is_active());

    // the control thread catches up and playback continues where it left off
    assert!(player.tick());
    assert_eq!(player.buffered_slots(), 4);
    let out = backend.render_period().unwrap();
    assert_eq!(out[0], ramp_sample(4 * 4096, 0));
    assert_eq!(player.state(), PlaybackState::HasData);
}

// =============================================================================
// Boundaries and misuse
// =============================================================================

#[test]
fn test_zero_length_file() {
    let (_dir, path) = ramp_fixture(CD, 0.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);

    player.load(&path).unwrap();
    assert_eq!(player.duration(), 0.0);
    assert_eq!(player.position_ratio(), 0.0);
    assert_eq!(player.buffered_slots(), 0);
    player.seek(1000.0).unwrap();

    player.play().unwrap();
    assert_eq!(player.state(), PlaybackState::ShouldStop);
    let out = backend.render_period().unwrap();
    assert!(is_silent(&out));
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!(!player.tick());
    assert_eq!(player.position_ratio(), 0.0);
}

#[test]
fn test_unload_twice() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);

    player.unload().unwrap();
    player.load(&path).unwrap();
    player.play().unwrap();
    player.unload().unwrap();
    player.unload().unwrap();

    assert!(!player.is_loaded());
    assert_eq!(player.state(), PlaybackState::Stopped);
    assert!(backend.output_closed());
    assert!(backend.render_period().is_none());
    assert!(matches!(player.play(), Err(Error::NotLoaded)));
    assert!(matches!(player.seek(0.0), Err(Error::NotLoaded)));
}

#[test]
fn test_reload_replaces_stream() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);

    player.load(&path).unwrap();
    player.load(&path).unwrap();
    assert_eq!(backend.streams_opened(), 2);
    assert_eq!(player.path(), Some(path.as_path()));
    assert_eq!(player.channels(), 2);
    assert_eq!(player.sample_rate(), 44100);
}

#[test]
fn test_volume() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();

    assert!(matches!(
        player.set_volume(1.5),
        Err(Error::VolumeOutOfRange(v)) if v == 1.5
    ));
    assert!(player.set_volume(-0.1).is_err());
    assert!(player.set_volume(f32::NAN).is_err());
    assert_eq!(player.volume(), 1.0);

    player.set_volume(0.5).unwrap();
    let out = backend.render_period().unwrap();
    assert_eq!(out[2], ramp_sample(1, 0) * 0.5);
    assert_eq!(out[3], ramp_sample(1, 1) * 0.5);
}

#[test]
fn test_no_output_device() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let mut player = Player::new(OfflineBackend::without_devices());
    assert!(matches!(
        player.load(&path),
        Err(Error::Core(spool::core::Error::NoDevice(_)))
    ));
    assert!(!player.is_loaded());
}

// =============================================================================
// Effects
// =============================================================================

#[test]
fn test_meter_sees_source_not_volume() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();

    let meter = LevelMeter::new(2);
    assert!(player.insert_effect(meter.clone()).is_none());
    player.set_volume(0.0).unwrap();
    player.play().unwrap();

    let out = backend.render_period().unwrap();
    assert!(out.iter().all(|&s| s == 0.0));
    let left = meter.level_db(0).unwrap();
    let right = meter.level_db(1).unwrap();
    assert!(left.is_finite() && left < 0.0);
    assert_relative_eq!(left, right, epsilon = 1e-4);

    assert!(player.remove_effect().is_some());
    assert!(player.remove_effect().is_none());
}

#[test]
fn test_rms_meter_callback() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();

    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    player.insert_effect(RmsMeter::new(move |levels: &[f32]| {
        sink.lock().push(levels.to_vec());
    }));
    player.play().unwrap();
    for _ in 0..3 {
        step(&backend, &mut player).unwrap();
    }

    let reports = reports.lock();
    assert_eq!(reports.len(), 3);
    assert!(reports.iter().all(|levels| levels.len() == 2));
    // the ramp rises, so each chunk is louder than the last
    assert!(reports[2][0] > reports[1][0] && reports[1][0] > reports[0][0]);
}

// =============================================================================
// Tick driver
// =============================================================================

#[test]
fn test_driver_runs_playback_to_completion() {
    let (_dir, path) = ramp_fixture(CD, 1.0);
    let backend = OfflineBackend::new(CD);
    let mut player = player(&backend);
    player.load(&path).unwrap();
    player.play().unwrap();

    let player = Arc::new(Mutex::new(player));
    let driver = TickDriver::spawn(Arc::clone(&player), Duration::from_millis(1)).unwrap();

    let mut periods = 0;
    while backend.render_period().is_some() {
        periods += 1;
        assert!(periods < 10_000, "playback never finished");
        std::thread::sleep(Duration::from_millis(1));
    }

    for _ in 0..5000 {
        if !driver.is_running() {
            break;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(!driver.is_running());
    assert_eq!(player.lock().state(), PlaybackState::Stopped);
}
