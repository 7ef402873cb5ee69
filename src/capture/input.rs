//! Live audio input as a sample source
//!
//! The cpal input callback runs on a real-time thread, so it never blocks:
//! it averages each frame across channels and pushes it into a lock-free
//! SPSC ring. `read()` drains whatever arrived since the last call and keeps
//! only the newest frame. The device produces far more frames than the
//! render loop consumes, so everything older is dropped.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample};
use ringbuf::{
    traits::{Consumer, Producer, Split},
    HeapCons, HeapProd, HeapRb,
};

use super::source::{SampleSource, SourceError};

/// Frames buffered between two reads before the callback starts dropping
const QUEUE_CAPACITY: usize = 8192;

/// Average one interleaved frame and push it, dropping when the ring is full
fn push_frames<T>(data: &[T], channels: usize, producer: &mut HeapProd<f32>)
where
    T: Sample,
    f32: FromSample<T>,
{
    for frame in data.chunks(channels) {
        let sum: f32 = frame.iter().map(|s| f32::from_sample(*s)).sum();
        let _ = producer.try_push(sum / channels as f32);
    }
}

/// Map an audio sample in `[-1, 1]` to the normalized `[0, 1]` range
pub fn normalize(sample: f32) -> f32 {
    ((sample + 1.0) / 2.0).clamp(0.0, 1.0)
}

/// Default input device read through cpal
pub struct AudioInputSource {
    consumer: HeapCons<f32>,
    /// Kept alive for as long as the source exists
    _stream: cpal::Stream,
    name: String,
}

impl AudioInputSource {
    /// Open the default input device and start capturing
    pub fn open() -> Result<Self, SourceError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(SourceError::NoDevice)?;

        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        log::info!("Using input device: {}", name);

        let config = device
            .default_input_config()
            .map_err(|e| SourceError::Device(e.to_string()))?;
        log::info!("Input config: {:?}", config);

        let channels = config.channels() as usize;
        let sample_format = config.sample_format();
        let stream_config: cpal::StreamConfig = config.into();

        let (mut producer, consumer) = HeapRb::<f32>::new(QUEUE_CAPACITY).split();
        let on_error = |err: cpal::StreamError| log::error!("Input stream error: {}", err);

        let stream = match sample_format {
            cpal::SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    push_frames(data, channels, &mut producer)
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    push_frames(data, channels, &mut producer)
                },
                on_error,
                None,
            ),
            cpal::SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    push_frames(data, channels, &mut producer)
                },
                on_error,
                None,
            ),
            format => return Err(SourceError::UnsupportedFormat(format!("{:?}", format))),
        }
        .map_err(|e| SourceError::Device(e.to_string()))?;

        stream
            .play()
            .map_err(|e| SourceError::Device(e.to_string()))?;

        Ok(Self {
            consumer,
            _stream: stream,
            name,
        })
    }
}

impl SampleSource for AudioInputSource {
    fn read(&mut self) -> Result<f32, SourceError> {
        let mut latest = None;
        while let Some(frame) = self.consumer.try_pop() {
            latest = Some(frame);
        }
        latest.map(normalize).ok_or(SourceError::Starved)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
