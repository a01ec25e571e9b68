/// Microphone capture
///
/// Feeds the default input device into a [`PcmProducer`] so a detector
/// session can read live audio through the paired [`crate::PcmSource`].

use crate::audio_buffer::PcmProducer;
use crate::engine::AudioFormat;
use crate::error::DetectorError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tracing::{error, info};

/// Start capturing from the default input device
///
/// The returned stream must be kept alive for capture to continue; dropping
/// it stops capture and closes the producer.
pub fn start_default_input(
    format: AudioFormat,
    mut producer: PcmProducer,
) -> Result<Stream, DetectorError> {
    if format.bits_per_sample != 16 {
        return Err(DetectorError::InvalidAudioFormat(format!(
            "microphone capture supports 16-bit samples only, engine wants {}",
            format.bits_per_sample
        )));
    }

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| DetectorError::Config("no default input device".to_string()))?;

    info!(
        "Capturing from {} at {} Hz, {} channel(s)",
        device.name().unwrap_or_else(|_| "unknown device".to_string()),
        format.sample_rate,
        format.channels
    );

    let config = StreamConfig {
        channels: format.channels,
        sample_rate: SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                producer.push_samples(data);
            },
            |e| error!("Input stream error: {}", e),
            None,
        )
        .map_err(|e| DetectorError::Config(format!("cannot open input stream: {}", e)))?;

    stream
        .play()
        .map_err(|e| DetectorError::Config(format!("cannot start input stream: {}", e)))?;

    Ok(stream)
}
