//! Session timing thresholds and transport steps

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Minimum hold on the transport control before it means "record" (ms)
pub const DEFAULT_HOLD_TO_RECORD_MS: u64 = 120;

/// Minimum hold on the loop control before it means "reset loop" (ms)
pub const DEFAULT_LOOP_RESET_HOLD_MS: u64 = 500;

/// Relative seek step for skip back / skip forward (seconds)
pub const DEFAULT_SKIP_SECONDS: f64 = 3.0;

/// Minimum distance between loop point A and loop point B (seconds)
pub const DEFAULT_MIN_LOOP_GAP: f64 = 0.5;

/// How often the microphone hands over a captured chunk (ms)
pub const DEFAULT_CHUNK_INTERVAL_MS: u64 = 100;

/// Tunable behaviour of an editing session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub hold_to_record_ms: u64,
    pub loop_reset_hold_ms: u64,
    pub skip_seconds: f64,
    pub min_loop_gap: f64,
    pub chunk_interval_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hold_to_record_ms: DEFAULT_HOLD_TO_RECORD_MS,
            loop_reset_hold_ms: DEFAULT_LOOP_RESET_HOLD_MS,
            skip_seconds: DEFAULT_SKIP_SECONDS,
            min_loop_gap: DEFAULT_MIN_LOOP_GAP,
            chunk_interval_ms: DEFAULT_CHUNK_INTERVAL_MS,
        }
    }
}

impl SessionConfig {
    pub fn hold_to_record(&self) -> Duration {
        Duration::from_millis(self.hold_to_record_ms)
    }

    pub fn loop_reset_hold(&self) -> Duration {
        Duration::from_millis(self.loop_reset_hold_ms)
    }

    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }
}
