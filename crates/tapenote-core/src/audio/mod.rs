//! Audio device backend
//!
//! Configuration and error types are always available. The cpal backend
//! (output stream, device enumeration, microphone) is behind the
//! `cpal-backend` feature so the core builds and tests without system
//! audio libraries.
//!
//! ```ignore
//! use tapenote_core::audio::start_audio_system;
//! use tapenote_core::engine::SessionCommand;
//!
//! let mut system = start_audio_system(&config.audio, &config.session)?;
//! system.command_sender.send(SessionCommand::TogglePlay).ok();
//! let position = system.atomics.position();
//! ```

mod config;
mod error;

#[cfg(feature = "cpal-backend")]
mod cpal_backend;
#[cfg(feature = "cpal-backend")]
mod device;
#[cfg(feature = "cpal-backend")]
mod microphone;

pub use config::{
    AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE, MAX_BUFFER_SIZE,
};
pub use error::{AudioError, AudioResult};

#[cfg(feature = "cpal-backend")]
pub use cpal_backend::{start_audio_system, AudioHandle, AudioSystem};
#[cfg(feature = "cpal-backend")]
pub use device::{find_device_by_id, list_devices, resolve_device, AudioDevice, Direction};
#[cfg(feature = "cpal-backend")]
pub use microphone::CpalMicrophone;
