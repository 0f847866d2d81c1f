//! CPAL device backend.

use super::{
    AudioBackend, Completion, DeviceStream, Direction, FinishedCallback, InputCallback,
    OutputCallback, StreamFormat, StreamParams,
};
use crate::{AtomicFlag, Error, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::Arc;

/// Wrapper to hold `cpal::Stream` in a `Send` context.
///
/// `cpal::Stream` is `!Send` due to platform internals. The stream is only ever
/// touched through `&mut CpalStream`, and the engines that own it are driven by a
/// single control thread at a time.
struct StreamHandle(cpal::Stream);

// SAFETY: see above; the handle is never shared, only moved with its owner.
unsafe impl Send for StreamHandle {}

/// Backend for the platform's default audio host.
#[derive(Debug, Clone, Default)]
pub struct CpalBackend {
    output_device: Option<usize>,
    input_device: Option<usize>,
}

impl CpalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use output device `index` (as listed by [`Self::list_output_devices`]).
    pub fn with_output_device(mut self, index: usize) -> Self {
        self.output_device = Some(index);
        self
    }

    pub fn with_input_device(mut self, index: usize) -> Self {
        self.input_device = Some(index);
        self
    }

    pub fn list_output_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .output_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name().unwrap_or_else(|_| "Unknown".into()))))
            .collect()
    }

    pub fn list_input_devices() -> Result<Vec<String>> {
        cpal::default_host()
            .input_devices()?
            .enumerate()
            .map(|(i, d)| Ok(format!("{i}: {}", d.name().unwrap_or_else(|_| "Unknown".into()))))
            .collect()
    }

    fn device(&self, direction: Direction) -> Result<cpal::Device> {
        let host = cpal::default_host();
        let index = match direction {
            Direction::Output => self.output_device,
            Direction::Input => self.input_device,
        };

        match index {
            Some(i) => {
                let devices: Vec<_> = match direction {
                    Direction::Output => host.output_devices()?.collect(),
                    Direction::Input => host.input_devices()?.collect(),
                };
                let count = devices.len();
                devices.into_iter().nth(i).ok_or_else(|| {
                    Error::InvalidConfig(format!(
                        "{direction} device index {i} out of range ({count} available)"
                    ))
                })
            }
            None => match direction {
                Direction::Output => host.default_output_device(),
                Direction::Input => host.default_input_device(),
            }
            .ok_or(Error::NoDevice(direction)),
        }
    }
}

fn stream_config(params: &StreamParams) -> cpal::StreamConfig {
    cpal::StreamConfig {
        channels: params.format.channels,
        sample_rate: cpal::SampleRate(params.format.sample_rate),
        buffer_size: cpal::BufferSize::Fixed(params.period_frames),
    }
}

impl AudioBackend for CpalBackend {
    fn default_output_format(&self) -> Result<StreamFormat> {
        let config = self.device(Direction::Output)?.default_output_config()?;
        Ok(StreamFormat::new(config.channels(), config.sample_rate().0))
    }

    fn default_input_format(&self) -> Result<StreamFormat> {
        let config = self.device(Direction::Input)?.default_input_config()?;
        Ok(StreamFormat::new(config.channels(), config.sample_rate().0))
    }

    fn open_output(
        &mut self,
        params: StreamParams,
        callback: OutputCallback,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>> {
        let device = self.device(Direction::Output)?;
        let sample_format = device.default_output_config()?.sample_format();
        let config = stream_config(&params);
        let completion = Completion::new(finished);
        let done = completion.flag();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_output::<f32>(&device, &config, &params, callback, completion)?
            }
            cpal::SampleFormat::I16 => {
                build_output::<i16>(&device, &config, &params, callback, completion)?
            }
            cpal::SampleFormat::U16 => {
                build_output::<u16>(&device, &config, &params, callback, completion)?
            }
            format => {
                return Err(Error::UnsupportedFormat(format!("{format:?}")));
            }
        };

        Ok(Box::new(CpalStream::new(stream, done)?))
    }

    fn open_input(
        &mut self,
        params: StreamParams,
        callback: InputCallback,
        finished: FinishedCallback,
    ) -> Result<Box<dyn DeviceStream>> {
        let device = self.device(Direction::Input)?;
        let sample_format = device.default_input_config()?.sample_format();
        let config = stream_config(&params);
        let completion = Completion::new(finished);
        let done = completion.flag();

        let stream = match sample_format {
            cpal::SampleFormat::F32 => {
                build_input::<f32>(&device, &config, &params, callback, completion)?
            }
            cpal::SampleFormat::I16 => {
                build_input::<i16>(&device, &config, &params, callback, completion)?
            }
            cpal::SampleFormat::U16 => {
                build_input::<u16>(&device, &config, &params, callback, completion)?
            }
            format => {
                return Err(Error::UnsupportedFormat(format!("{format:?}")));
            }
        };

        Ok(Box::new(CpalStream::new(stream, done)?))
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: &StreamParams,
    mut callback: OutputCallback,
    mut completion: Completion,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let mut scratch = vec![0.0f32; scratch_len(params)];

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                render_output(data, &mut scratch, &mut completion, &mut callback);
            }));

            if result.is_err() {
                output_silence(data);
            }
        },
        |err| tracing::error!("output stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    params: &StreamParams,
    mut callback: InputCallback,
    mut completion: Completion,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    let mut scratch = vec![0.0f32; scratch_len(params)];

    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                capture_input(data, &mut scratch, &mut completion, &mut callback);
            }));
        },
        |err| tracing::error!("input stream error: {err}"),
        None,
    )?;

    Ok(stream)
}

/// Conversion buffer length: the requested period, never zero. Allocated once
/// when the stream is built.
fn scratch_len(params: &StreamParams) -> usize {
    params.period_samples().max(params.format.channels.max(1) as usize)
}

/// Run the output callback into `data` through `scratch`. A host period longer
/// than the scratch buffer is rendered in scratch-sized pieces.
fn render_output<T>(
    data: &mut [T],
    scratch: &mut [f32],
    completion: &mut Completion,
    callback: &mut OutputCallback,
) where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    for piece in data.chunks_mut(scratch.len()) {
        let buf = &mut scratch[..piece.len()];
        completion.run_output(callback, buf);
        for (out, &sample) in piece.iter_mut().zip(buf.iter()) {
            *out = T::from_sample(sample);
        }
    }
}

fn capture_input<T>(
    data: &[T],
    scratch: &mut [f32],
    completion: &mut Completion,
    callback: &mut InputCallback,
) where
    T: cpal::SizedSample,
    f32: cpal::FromSample<T>,
{
    for piece in data.chunks(scratch.len()) {
        let buf = &mut scratch[..piece.len()];
        for (dst, &sample) in buf.iter_mut().zip(piece.iter()) {
            *dst = sample.to_sample::<f32>();
        }
        completion.run_input(callback, buf);
    }
}

#[inline]
fn output_silence<T: cpal::SizedSample + cpal::FromSample<f32>>(data: &mut [T]) {
    for sample in data.iter_mut() {
        *sample = T::from_sample(0.0);
    }
}

/// A CPAL stream opened by [`CpalBackend`].
pub struct CpalStream {
    stream: Option<StreamHandle>,
    done: Arc<AtomicFlag>,
    running: bool,
}

impl CpalStream {
    fn new(stream: cpal::Stream, done: Arc<AtomicFlag>) -> Result<Self> {
        // Some hosts start streams on build; ours start on `start()`.
        let _ = stream.pause();
        Ok(Self {
            stream: Some(StreamHandle(stream)),
            done,
            running: false,
        })
    }
}

impl DeviceStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        let handle = self.stream.as_ref().ok_or(Error::StreamClosed)?;
        self.done.set(false);
        handle.0.play()?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.stream.as_ref() {
            if self.running {
                self.running = false;
                handle.0.pause()?;
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let result = self.stop();
        self.stream = None;
        result
    }

    fn is_active(&self) -> bool {
        self.stream.is_some() && self.running && !self.done.get()
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
