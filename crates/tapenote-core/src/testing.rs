//! Test doubles shared by the unit tests

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::codec::{encode_clip, CaptureFormat};
use crate::recorder::{CaptureEvent, CaptureSink, Microphone};
use crate::types::{AudioClip, StereoBuffer, StereoSample};

#[derive(Default)]
struct MicScript {
    sink: Option<CaptureSink>,
    requests: usize,
    stops: usize,
    releases: usize,
}

/// Microphone driven by the test through a [`MicHandle`]
///
/// `stop` answers with `Stopped` straight away, like a device with nothing
/// left to flush.
pub struct ScriptedMicrophone {
    script: Arc<Mutex<MicScript>>,
}

/// Test-side controls for a [`ScriptedMicrophone`]
#[derive(Clone)]
pub struct MicHandle {
    script: Arc<Mutex<MicScript>>,
}

impl ScriptedMicrophone {
    pub fn new() -> (Self, MicHandle) {
        let script = Arc::new(Mutex::new(MicScript::default()));
        (
            Self {
                script: Arc::clone(&script),
            },
            MicHandle { script },
        )
    }
}

impl Microphone for ScriptedMicrophone {
    fn request(&mut self, sink: CaptureSink) {
        let mut script = self.script.lock().unwrap();
        script.requests += 1;
        script.sink = Some(sink);
    }

    fn stop(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.stops += 1;
        if let Some(sink) = script.sink.as_ref() {
            sink.send(CaptureEvent::Stopped);
        }
    }

    fn release(&mut self) {
        let mut script = self.script.lock().unwrap();
        script.releases += 1;
        script.sink = None;
    }
}

impl MicHandle {
    fn send(&self, event: CaptureEvent) {
        let script = self.script.lock().unwrap();
        if let Some(sink) = script.sink.as_ref() {
            sink.send(event);
        }
    }

    pub fn grant(&self, format: CaptureFormat) {
        self.send(CaptureEvent::Granted(format));
    }

    pub fn deny(&self, reason: &str) {
        self.send(CaptureEvent::Denied(reason.to_string()));
    }

    pub fn chunk(&self, bytes: Vec<u8>) {
        self.send(CaptureEvent::Chunk(bytes));
    }

    pub fn fail(&self, reason: &str) {
        self.send(CaptureEvent::Failed(reason.to_string()));
    }

    pub fn requests(&self) -> usize {
        self.script.lock().unwrap().requests
    }

    pub fn stops(&self) -> usize {
        self.script.lock().unwrap().stops
    }

    pub fn releases(&self) -> usize {
        self.script.lock().unwrap().releases
    }
}

/// Constant-level clip of the given length
pub fn tone_clip(seconds: f64, sample_rate: u32, level: f32) -> AudioClip {
    let frames = (seconds * sample_rate as f64).round() as usize;
    AudioClip::new(
        StereoBuffer::from_vec(vec![StereoSample::mono(level); frames]),
        sample_rate,
    )
}

/// WAV bytes of a constant-level clip
pub fn tone_wav(seconds: f64, sample_rate: u32, level: f32) -> Vec<u8> {
    encode_clip(&tone_clip(seconds, sample_rate, level)).unwrap()
}

/// Call `step` until it returns true or the timeout passes
pub fn wait_until(timeout: Duration, mut step: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if step() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    step()
}
