//! Streaming file adapter.
//!
//! The engines only ever call into files from the control thread, through
//! [`SampleReader`] and [`SampleWriter`]. Counts are in interleaved samples and
//! always cover whole frames; a short count means end of file (read) or a failed
//! write, never "try again".

use crate::{Error, Result};
use hound::{SampleFormat, WavSpec};
use spool_core::StreamFormat;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Sequential sample source.
pub trait SampleReader: Send {
    fn format(&self) -> StreamFormat;

    /// Frames in the whole source.
    fn total_frames(&self) -> u64;

    fn path(&self) -> Option<&Path> {
        None
    }

    /// Read up to `buf.len()` samples, rounded down to whole frames.
    fn read_some(&mut self, buf: &mut [f32]) -> Result<usize>;

    /// Position the next read at `frame`, clamped to the end of the source.
    fn seek_frame(&mut self, frame: u64) -> Result<()>;

    fn channels(&self) -> u16 {
        self.format().channels
    }

    fn sample_rate(&self) -> u32 {
        self.format().sample_rate
    }

    /// Length in seconds; zero for empty sources.
    fn duration(&self) -> f64 {
        match self.sample_rate() {
            0 => 0.0,
            sr => self.total_frames() as f64 / sr as f64,
        }
    }

    /// Position the next read at `time_ms`.
    fn seek_ms(&mut self, time_ms: f64) -> Result<()> {
        let frame = ms_to_frame(time_ms, self.sample_rate()).min(self.total_frames());
        self.seek_frame(frame)
    }
}

/// Sequential sample sink.
pub trait SampleWriter: Send {
    fn format(&self) -> StreamFormat;

    fn path(&self) -> Option<&Path> {
        None
    }

    /// Write `samples`; returns how many were written.
    fn write_some(&mut self, samples: &[f32]) -> Result<usize>;

    /// Frames written so far.
    fn frames_written(&self) -> u64;

    fn flush(&mut self) -> Result<()>;

    /// Complete the file (headers, trailing buffers).
    fn finalize(self: Box<Self>) -> Result<()>;
}

/// Frame index for a time in milliseconds; negative and non-finite times map to 0.
pub fn ms_to_frame(time_ms: f64, sample_rate: u32) -> u64 {
    if !time_ms.is_finite() || time_ms <= 0.0 {
        return 0;
    }
    (time_ms / 1000.0 * sample_rate as f64).round() as u64
}

/// WAV file reader. Integer files are scaled to `[-1, 1)`.
pub struct WavReader {
    reader: hound::WavReader<BufReader<File>>,
    spec: WavSpec,
    path: PathBuf,
    total_frames: u64,
}

impl WavReader {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = hound::WavReader::open(&path)?;
        let spec = reader.spec();

        match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Float, 32) | (SampleFormat::Int, 8..=32) => {}
            (format, bits) => {
                return Err(Error::UnsupportedFile(format!(
                    "{}: {bits}-bit {format:?}",
                    path.display()
                )));
            }
        }
        if spec.channels == 0 {
            return Err(Error::UnsupportedFile(format!(
                "{}: no channels",
                path.display()
            )));
        }

        let total_frames = reader.duration() as u64;
        debug!(
            path = %path.display(),
            channels = spec.channels,
            sample_rate = spec.sample_rate,
            frames = total_frames,
            "opened wav for reading"
        );

        Ok(Self {
            reader,
            spec,
            path,
            total_frames,
        })
    }
}

impl SampleReader for WavReader {
    fn format(&self) -> StreamFormat {
        StreamFormat::new(self.spec.channels, self.spec.sample_rate)
    }

    fn total_frames(&self) -> u64 {
        self.total_frames
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn read_some(&mut self, buf: &mut [f32]) -> Result<usize> {
        let channels = self.spec.channels as usize;
        let wanted = buf.len() - buf.len() % channels;
        let mut read = 0;

        match self.spec.sample_format {
            SampleFormat::Float => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    buf[read] = sample?;
                    read += 1;
                }
            }
            SampleFormat::Int => {
                let scale = 1.0 / (1u64 << (self.spec.bits_per_sample - 1)) as f32;
                for sample in self.reader.samples::<i32>().take(wanted) {
                    buf[read] = sample? as f32 * scale;
                    read += 1;
                }
            }
        }

        // A truncated final frame is not playable.
        Ok(read - read % channels)
    }

    fn seek_frame(&mut self, frame: u64) -> Result<()> {
        let frame = frame.min(self.total_frames);
        self.reader.seek(frame as u32)?;
        Ok(())
    }
}

/// WAV file writer producing 32-bit float files.
pub struct WavWriter {
    writer: hound::WavWriter<BufWriter<File>>,
    format: StreamFormat,
    path: PathBuf,
}

impl WavWriter {
    pub fn create(path: impl AsRef<Path>, format: StreamFormat) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let spec = WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = hound::WavWriter::create(&path, spec)?;
        debug!(
            path = %path.display(),
            channels = format.channels,
            sample_rate = format.sample_rate,
            "opened wav for writing"
        );

        Ok(Self {
            writer,
            format,
            path,
        })
    }
}

impl SampleWriter for WavWriter {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn path(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn write_some(&mut self, samples: &[f32]) -> Result<usize> {
        for (written, &sample) in samples.iter().enumerate() {
            if let Err(err) = self.writer.write_sample(sample) {
                if written == 0 {
                    return Err(err.into());
                }
                return Ok(written);
            }
        }
        Ok(samples.len())
    }

    fn frames_written(&self) -> u64 {
        self.writer.duration() as u64
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn finalize(self: Box<Self>) -> Result<()> {
        debug!(path = %self.path.display(), "finalizing wav");
        self.writer.finalize()?;
        Ok(())
    }
}
