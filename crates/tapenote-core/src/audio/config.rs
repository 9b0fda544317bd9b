//! Audio backend configuration
//!
//! Output device selection and buffer settings.

use serde::{Deserialize, Serialize};

/// Maximum buffer size to pre-allocate (covers typical configurations)
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Default buffer size when no preference is specified (frames)
pub const DEFAULT_BUFFER_SIZE: u32 = 512;

/// Default sample rate requested from the output device
pub const DEFAULT_SAMPLE_RATE: u32 = crate::types::SAMPLE_RATE;

/// Preferred buffer size for audio streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BufferSize {
    /// Let the system choose
    #[default]
    Default,
    /// Request a specific buffer size in frames (clamped to 64..=MAX_BUFFER_SIZE)
    Fixed(u32),
}

impl BufferSize {
    /// Buffer size in frames to request from the device
    pub fn frames(&self) -> u32 {
        match self {
            BufferSize::Default => DEFAULT_BUFFER_SIZE,
            BufferSize::Fixed(frames) => (*frames).clamp(64, MAX_BUFFER_SIZE as u32),
        }
    }

    /// Latency in milliseconds for a given sample rate
    pub fn latency_ms(&self, sample_rate: u32) -> f32 {
        (self.frames() as f32 / sample_rate.max(1) as f32) * 1000.0
    }
}

/// Audio device identifier
///
/// Includes the host backend so devices from different hosts (ALSA, JACK,
/// PipeWire...) can be told apart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceId {
    /// Device name as reported by the system
    pub name: String,
    /// Audio host identifier (e.g., "Alsa", "CoreAudio"); None = default host
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl DeviceId {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: None,
        }
    }

    /// Display label including the host if known
    pub fn display_label(&self) -> String {
        match &self.host {
            Some(host) => format!("[{}] {}", host, self.name),
            None => self.name.clone(),
        }
    }
}

/// Configuration for the audio backend
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_device: Option<DeviceId>,
    /// Input device for takes (None = system default)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_device: Option<DeviceId>,
    /// Requested sample rate (None = DEFAULT_SAMPLE_RATE)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Requested buffer size
    pub buffer_size: BufferSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_buffer_size_is_clamped() {
        assert_eq!(BufferSize::Fixed(16).frames(), 64);
        assert_eq!(BufferSize::Fixed(1 << 20).frames(), MAX_BUFFER_SIZE as u32);
        assert_eq!(BufferSize::Default.frames(), DEFAULT_BUFFER_SIZE);
    }

    #[test]
    fn test_device_label_includes_host() {
        let mut id = DeviceId::new("USB Mic");
        assert_eq!(id.display_label(), "USB Mic");
        id.host = Some("Alsa".to_string());
        assert_eq!(id.display_label(), "[Alsa] USB Mic");
    }
}
