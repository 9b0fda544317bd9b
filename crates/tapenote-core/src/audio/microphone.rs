//! cpal microphone for the take recorder
//!
//! Each capture session runs on its own thread, which opens the input
//! device, owns the cpal stream and ships i16 PCM chunks to the recorder at
//! a fixed interval. The stream callback only pushes samples into an `rtrb`
//! ring buffer; all allocation happens on the capture thread.
//!
//! ```text
//! cpal input callback ──push()──► ring buffer ──drain every 100ms──► CaptureSink
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, Stream, StreamConfig};

use super::config::DeviceId;
use super::device::{resolve_device, Direction};
use crate::codec::CaptureFormat;
use crate::recorder::{CaptureEvent, CaptureSink, Microphone};

/// Seconds of audio the ring buffer can hold between drains
const RING_SECONDS: usize = 2;

struct CaptureWorker {
    stop: Arc<AtomicBool>,
}

/// Microphone backed by a cpal input device
pub struct CpalMicrophone {
    device: Option<DeviceId>,
    chunk_interval: Duration,
    worker: Option<CaptureWorker>,
}

impl CpalMicrophone {
    /// `device` None uses the default input of the default host
    pub fn new(device: Option<DeviceId>, chunk_interval: Duration) -> Self {
        Self {
            device,
            chunk_interval,
            worker: None,
        }
    }
}

impl Microphone for CpalMicrophone {
    fn request(&mut self, sink: CaptureSink) {
        self.release();

        let stop = Arc::new(AtomicBool::new(false));
        let device = self.device.clone();
        let interval = self.chunk_interval;
        let thread_stop = Arc::clone(&stop);
        let thread_sink = sink.clone();

        let spawned = thread::Builder::new()
            .name("take-capture".to_string())
            .spawn(move || capture_thread(device, interval, thread_sink, thread_stop));

        match spawned {
            // The thread ends on its own after Stopped; it is never joined
            Ok(_) => self.worker = Some(CaptureWorker { stop }),
            Err(e) => {
                log::error!("Microphone: Failed to spawn capture thread: {}", e);
                sink.send(CaptureEvent::Failed(e.to_string()));
            }
        }
    }

    fn stop(&mut self) {
        if let Some(worker) = self.worker.as_ref() {
            worker.stop.store(true, Ordering::Release);
        }
    }

    fn release(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.stop.store(true, Ordering::Release);
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.release();
    }
}

fn capture_thread(
    device_id: Option<DeviceId>,
    interval: Duration,
    sink: CaptureSink,
    stop: Arc<AtomicBool>,
) {
    let device = match resolve_device(device_id.as_ref(), Direction::Input) {
        Ok(device) => device,
        Err(e) => {
            sink.send(CaptureEvent::Denied(e.to_string()));
            return;
        }
    };

    let supported = match device.default_input_config() {
        Ok(config) => config,
        Err(e) => {
            sink.send(CaptureEvent::Denied(e.to_string()));
            return;
        }
    };

    let format = CaptureFormat::new(supported.sample_rate().0, supported.channels());
    let capacity = format.sample_rate as usize * format.channels as usize * RING_SECONDS;
    let (producer, mut consumer) = rtrb::RingBuffer::<i16>::new(capacity);
    let failed = Arc::new(AtomicBool::new(false));
    let config: StreamConfig = supported.config();

    let stream = match supported.sample_format() {
        SampleFormat::F32 => build_stream(&device, &config, producer, &failed, f32_to_i16),
        SampleFormat::I16 => build_stream(&device, &config, producer, &failed, |s: i16| s),
        SampleFormat::U16 => build_stream(&device, &config, producer, &failed, u16_to_i16),
        other => Err(format!("Unsupported input sample format: {:?}", other)),
    };

    let stream = match stream {
        Ok(stream) => stream,
        Err(e) => {
            sink.send(CaptureEvent::Failed(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        sink.send(CaptureEvent::Denied(e.to_string()));
        return;
    }

    log::info!(
        "Microphone: Capturing {} Hz, {} ch",
        format.sample_rate,
        format.channels
    );
    sink.send(CaptureEvent::Granted(format));

    let mut reported_failure = false;
    loop {
        let stopping = stop.load(Ordering::Acquire);
        if !stopping {
            thread::sleep(interval);
        }

        let chunk = drain(&mut consumer);
        if !chunk.is_empty() && !sink.send(CaptureEvent::Chunk(chunk)) {
            // Recorder is gone
            return;
        }

        if failed.load(Ordering::Acquire) && !reported_failure {
            reported_failure = true;
            sink.send(CaptureEvent::Failed("Input stream error".to_string()));
        }

        if stopping {
            break;
        }
    }

    drop(stream);
    let tail = drain(&mut consumer);
    if !tail.is_empty() {
        sink.send(CaptureEvent::Chunk(tail));
    }
    sink.send(CaptureEvent::Stopped);
    log::debug!("Microphone: Capture thread finished");
}

fn build_stream<T: SizedSample>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: rtrb::Producer<i16>,
    failed: &Arc<AtomicBool>,
    convert: fn(T) -> i16,
) -> Result<Stream, String> {
    let failed = Arc::clone(failed);
    device
        .build_input_stream(
            config,
            move |data: &[T], _info: &cpal::InputCallbackInfo| {
                for &sample in data {
                    if producer.push(convert(sample)).is_err() {
                        // Capture thread fell behind; drop the rest of this block
                        break;
                    }
                }
            },
            move |err| {
                log::error!("Microphone stream error: {}", err);
                failed.store(true, Ordering::Release);
            },
            None,
        )
        .map_err(|e| e.to_string())
}

fn drain(consumer: &mut rtrb::Consumer<i16>) -> Vec<u8> {
    let available = consumer.slots();
    let mut bytes = Vec::with_capacity(available * 2);
    while let Ok(sample) = consumer.pop() {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}
