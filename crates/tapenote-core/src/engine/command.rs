//! Lock-free command queue from the UI to the audio thread
//!
//! The UI pushes [`SessionCommand`]s into an `rtrb` ring buffer; the audio
//! thread drains it at the start of every block, so all state changes land
//! on block boundaries and neither side ever blocks.
//!
//! Gesture commands carry the `Instant` the input happened at, so hold
//! thresholds are measured against input time rather than when the audio
//! thread got around to the command.

use std::sync::Arc;
use std::time::Instant;

use crate::types::Seconds;

/// Commands sent from the UI thread to the session
pub enum SessionCommand {
    // ─────────────────────────────────────────────────────────────
    // Source
    // ─────────────────────────────────────────────────────────────
    /// Attach an encoded backing track (None detaches)
    OpenTrack(Option<Arc<[u8]>>),

    // ─────────────────────────────────────────────────────────────
    // Gestures
    // ─────────────────────────────────────────────────────────────
    TransportPress { at: Instant },
    TransportRelease { at: Instant },
    LoopPress { at: Instant },
    LoopRelease { at: Instant },
    /// Pointer left the loop control
    LoopLeave,

    // ─────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────
    /// Loop-aware play/pause
    TogglePlay,
    Play,
    Pause,
    Seek(Seconds),
    SkipBack,
    SkipForward,
    SetPlaybackRate(f64),
    CyclePlaybackRate,

    // ─────────────────────────────────────────────────────────────
    // Loop
    // ─────────────────────────────────────────────────────────────
    CycleLoop,
    ResetLoop,

    // ─────────────────────────────────────────────────────────────
    // Takes
    // ─────────────────────────────────────────────────────────────
    StartRecording,
    StopRecording,
    ClearTakes,
    PlayTake(usize),
    StopTake,
    /// Stop the preview, or preview the most recent take
    ToggleTake,
    SetTakesEnabled(bool),
    ToggleTakesEnabled,

    // ─────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────
    /// Stop everything and close the mix graph
    EndSession,
}

/// Capacity of the command queue
///
/// Commands come from human input, so bursts stay small.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create a new command channel (producer/consumer pair)
///
/// Returns `(Producer, Consumer)`: the producer lives on the UI thread, the
/// consumer on the audio thread.
pub fn command_channel() -> (rtrb::Producer<SessionCommand>, rtrb::Consumer<SessionCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}
