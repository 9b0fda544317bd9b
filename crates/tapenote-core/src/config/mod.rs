//! Configuration for tapenote applications
//!
//! - Generic YAML config loading/saving
//! - Default config path
//! - Session timing thresholds (`SessionConfig`)
//!
//! # Usage
//!
//! ```ignore
//! use tapenote_core::config::{default_config_path, load_config, TapenoteConfig};
//!
//! let config: TapenoteConfig = load_config(&default_config_path());
//! ```

mod io;
mod paths;
mod session;

use serde::{Deserialize, Serialize};

use crate::audio::AudioConfig;

pub use io::{load_config, save_config};
pub use paths::{default_config_dir, default_config_path};
pub use session::{
    SessionConfig, DEFAULT_CHUNK_INTERVAL_MS, DEFAULT_HOLD_TO_RECORD_MS, DEFAULT_LOOP_RESET_HOLD_MS,
    DEFAULT_MIN_LOOP_GAP, DEFAULT_SKIP_SECONDS,
};

/// Top-level configuration file contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TapenoteConfig {
    /// Output device and buffer settings
    pub audio: AudioConfig,
    /// Gesture thresholds and transport steps
    pub session: SessionConfig,
}
