//! Lock-free session state for the UI
//!
//! The audio thread publishes a [`SessionSnapshot`] after every block; the UI
//! reads individual fields with relaxed loads whenever it redraws. Values may
//! be one block stale, which is fine for display. Code that needs the exact
//! live position (stamping a lyric line) asks the session itself.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use crate::looping::LoopState;
use crate::session::SessionSnapshot;
use crate::types::Seconds;

/// Encoding for "no value" in optional atomics
const NONE_U8: u8 = u8::MAX;

/// Atomic mirror of the session's observable state
#[derive(Debug)]
pub struct SessionAtomics {
    has_audio: AtomicBool,
    loaded: AtomicBool,
    playing: AtomicBool,
    /// f64 bits
    position: AtomicU64,
    /// f64 bits
    duration: AtomicU64,
    /// f64 bits
    playback_rate: AtomicU64,
    /// 0 = off, 1 = A set, 2 = A/B loop
    loop_mode: AtomicU8,
    /// f64 bits
    loop_a: AtomicU64,
    /// f64 bits
    loop_b: AtomicU64,
    recording: AtomicBool,
    /// 0 = denied, 1 = granted, NONE_U8 = not asked yet
    permission: AtomicU8,
    take_count: AtomicU8,
    takes_enabled: AtomicBool,
    /// Slot being previewed, NONE_U8 = none
    take_preview: AtomicU8,
}

impl SessionAtomics {
    pub fn new() -> Self {
        Self {
            has_audio: AtomicBool::new(false),
            loaded: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            position: AtomicU64::new(0f64.to_bits()),
            duration: AtomicU64::new(0f64.to_bits()),
            playback_rate: AtomicU64::new(1f64.to_bits()),
            loop_mode: AtomicU8::new(0),
            loop_a: AtomicU64::new(0f64.to_bits()),
            loop_b: AtomicU64::new(0f64.to_bits()),
            recording: AtomicBool::new(false),
            permission: AtomicU8::new(NONE_U8),
            take_count: AtomicU8::new(0),
            takes_enabled: AtomicBool::new(true),
            take_preview: AtomicU8::new(NONE_U8),
        }
    }

    /// Store a snapshot (audio thread)
    pub fn publish(&self, snapshot: &SessionSnapshot) {
        self.has_audio.store(snapshot.has_audio, Ordering::Relaxed);
        self.loaded.store(snapshot.loaded, Ordering::Relaxed);
        self.playing.store(snapshot.playing, Ordering::Relaxed);
        store_f64(&self.position, snapshot.position);
        store_f64(&self.duration, snapshot.duration);
        store_f64(&self.playback_rate, snapshot.playback_rate);

        let (a, b) = match snapshot.loop_state {
            LoopState::Off => (0.0, 0.0),
            LoopState::PointA { a } => (a, 0.0),
            LoopState::LoopAB { a, b } => (a, b),
        };
        store_f64(&self.loop_a, a);
        store_f64(&self.loop_b, b);
        self.loop_mode.store(snapshot.loop_state.tag(), Ordering::Relaxed);

        self.recording.store(snapshot.recording, Ordering::Relaxed);
        self.permission.store(
            snapshot.permission.map(u8::from).unwrap_or(NONE_U8),
            Ordering::Relaxed,
        );
        self.take_count
            .store(snapshot.take_count.min(u8::MAX as usize) as u8, Ordering::Relaxed);
        self.takes_enabled
            .store(snapshot.takes_enabled, Ordering::Relaxed);
        self.take_preview.store(
            snapshot.take_preview.map(|s| s as u8).unwrap_or(NONE_U8),
            Ordering::Relaxed,
        );
    }

    #[inline]
    pub fn has_audio(&self) -> bool {
        self.has_audio.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Position as of the last block (seconds)
    #[inline]
    pub fn position(&self) -> Seconds {
        load_f64(&self.position)
    }

    #[inline]
    pub fn duration(&self) -> Seconds {
        load_f64(&self.duration)
    }

    #[inline]
    pub fn playback_rate(&self) -> f64 {
        load_f64(&self.playback_rate)
    }

    pub fn loop_state(&self) -> LoopState {
        match self.loop_mode.load(Ordering::Relaxed) {
            1 => LoopState::PointA {
                a: load_f64(&self.loop_a),
            },
            2 => LoopState::LoopAB {
                a: load_f64(&self.loop_a),
                b: load_f64(&self.loop_b),
            },
            _ => LoopState::Off,
        }
    }

    #[inline]
    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    /// Microphone permission (None until first asked)
    pub fn permission(&self) -> Option<bool> {
        match self.permission.load(Ordering::Relaxed) {
            NONE_U8 => None,
            v => Some(v == 1),
        }
    }

    #[inline]
    pub fn take_count(&self) -> usize {
        self.take_count.load(Ordering::Relaxed) as usize
    }

    #[inline]
    pub fn has_takes(&self) -> bool {
        self.take_count() > 0
    }

    #[inline]
    pub fn takes_enabled(&self) -> bool {
        self.takes_enabled.load(Ordering::Relaxed)
    }

    pub fn take_preview(&self) -> Option<usize> {
        match self.take_preview.load(Ordering::Relaxed) {
            NONE_U8 => None,
            slot => Some(slot as usize),
        }
    }
}

impl Default for SessionAtomics {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn store_f64(atomic: &AtomicU64, value: f64) {
    atomic.store(value.to_bits(), Ordering::Relaxed);
}

#[inline]
fn load_f64(atomic: &AtomicU64) -> f64 {
    f64::from_bits(atomic.load(Ordering::Relaxed))
}
