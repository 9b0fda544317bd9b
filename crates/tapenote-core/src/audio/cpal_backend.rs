//! cpal output backend
//!
//! ```text
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │     UI Thread    │───push()───────────►│   Command Queue     │
//! │                  │                     │  (lock-free SPSC)   │
//! └──────────────────┘                     └──────────┬──────────┘
//!         ▲                                           │ pop()
//!         │ Relaxed atomics                           ▼
//! ┌──────────────────┐                     ┌─────────────────────┐
//! │  SessionAtomics  │◄────────────────────│  cpal Audio Thread  │
//! │   (lock-free)    │   publish per block │ (owns SessionEngine)│
//! └──────────────────┘                     └─────────────────────┘
//! ```

use std::sync::Arc;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::{AudioConfig, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE};
use super::device::{resolve_device, Direction};
use super::error::{AudioError, AudioResult};
use super::microphone::CpalMicrophone;
use crate::config::SessionConfig;
use crate::engine::{create_engine, CommandSender, SessionAtomics, SessionEngine};
use crate::session::Session;

/// Keeps the output stream alive; drop it to stop audio
pub struct AudioHandle {
    _stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Buffer size in frames as requested from the device
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        (self.buffer_size as f32 / self.sample_rate as f32) * 1000.0
    }
}

/// A running audio system
pub struct AudioSystem {
    pub handle: AudioHandle,
    pub command_sender: CommandSender,
    pub atomics: Arc<SessionAtomics>,
}

/// Open the output device, create a session and start streaming
///
/// The session renders at whatever rate the device settles on.
pub fn start_audio_system(
    audio: &AudioConfig,
    session_config: &SessionConfig,
) -> AudioResult<AudioSystem> {
    let device = resolve_device(audio.output_device.as_ref(), Direction::Output)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
    log::info!("Using audio device: {}", device_name);

    let supported = get_output_config(&device, audio)?;
    let sample_rate = supported.sample_rate().0;
    let buffer_size = audio.buffer_size.frames();

    let stream_config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(buffer_size),
    };

    log::info!(
        "Audio config: {} channels, {}Hz, {} frames (~{:.1}ms latency)",
        stream_config.channels,
        sample_rate,
        buffer_size,
        audio.buffer_size.latency_ms(sample_rate)
    );

    let mic = CpalMicrophone::new(audio.input_device.clone(), session_config.chunk_interval());
    let session = Session::new(session_config, sample_rate, Box::new(mic));
    let (engine, command_sender, atomics) = create_engine(session);

    let stream = build_output_stream(&device, &stream_config, engine)?;
    stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio stream started");

    Ok(AudioSystem {
        handle: AudioHandle {
            _stream: stream,
            sample_rate,
            buffer_size,
        },
        command_sender,
        atomics,
    })
}

/// Pick an f32 stereo config at the requested rate, falling back as needed
fn get_output_config(
    device: &cpal::Device,
    config: &AudioConfig,
) -> AudioResult<cpal::SupportedStreamConfig> {
    let supported_configs: Vec<_> = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .collect();

    let target_sample_rate = config.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE);
    let in_range = |c: &cpal::SupportedStreamConfigRange| {
        target_sample_rate >= c.min_sample_rate().0 && target_sample_rate <= c.max_sample_rate().0
    };

    let best_config = supported_configs
        .iter()
        .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2 && in_range(*c))
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32 && c.channels() >= 2)
        })
        .or_else(|| {
            supported_configs
                .iter()
                .find(|c| c.sample_format() == SampleFormat::F32)
        })
        .ok_or_else(|| AudioError::UnsupportedFormat("No f32 output configuration".to_string()))?;

    let sample_rate = if in_range(best_config) {
        cpal::SampleRate(target_sample_rate)
    } else {
        let fallback = best_config.max_sample_rate();
        log::warn!(
            "Audio device doesn't support {}Hz, falling back to {}Hz",
            target_sample_rate,
            fallback.0
        );
        fallback
    };

    Ok(best_config.clone().with_sample_rate(sample_rate))
}

fn build_output_stream(
    device: &cpal::Device,
    config: &StreamConfig,
    mut engine: SessionEngine,
) -> AudioResult<Stream> {
    let channels = config.channels as usize;

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                // Devices may ask for more than one pre-allocated block
                for block in data.chunks_mut(MAX_BUFFER_SIZE * channels) {
                    let n_frames = block.len() / channels;
                    engine.process(n_frames);

                    let samples = engine.output();
                    for (i, frame) in block.chunks_mut(channels).enumerate() {
                        let sample = samples.get(i).copied().unwrap_or_default();
                        frame[0] = sample.left;
                        if channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
