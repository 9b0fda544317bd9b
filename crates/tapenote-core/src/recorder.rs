//! Push-to-record take recorder
//!
//! Captures microphone input into one of two round-robin take slots. Each
//! take remembers the transport position at the moment recording was
//! requested, so playback can line it up with the backing track later.
//!
//! The microphone itself is behind the [`Microphone`] trait. Device access is
//! asynchronous: a capture session is requested, then permission, audio
//! chunks and the final stop arrive as [`CaptureEvent`]s on a channel that
//! [`TakeRecorder::poll`] drains.
//!
//! The recorder is polled from the audio thread, so a finished capture is
//! encoded on the rayon pool and the stored take comes back through `poll`.
//! Payloads are `basedrop::Shared`; a take overwritten on the audio thread is
//! freed by the collector.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use basedrop::Shared;
use thiserror::Error;

use crate::codec::{encode_take, CaptureFormat, DecodeError};
use crate::engine::gc_handle;
use crate::types::{Seconds, TAKE_SLOTS};

/// Errors reported by microphone backends
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("Microphone failed: {0}")]
    DeviceFailed(String),

    #[error("Take could not be stored: {0}")]
    Encode(String),
}

/// Notifications from a capture session
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Access granted; audio in this format follows
    Granted(CaptureFormat),
    /// Access refused before any audio was captured
    Denied(String),
    /// A slice of interleaved i16 little-endian PCM
    Chunk(Vec<u8>),
    /// Capture ended; no more chunks follow
    Stopped,
    /// Capture broke mid-session
    Failed(String),
}

/// Sending half handed to a microphone for one capture session
#[derive(Debug, Clone)]
pub struct CaptureSink {
    session: u64,
    tx: Sender<(u64, CaptureEvent)>,
}

impl CaptureSink {
    /// Deliver an event; returns false once the recorder is gone
    pub fn send(&self, event: CaptureEvent) -> bool {
        self.tx.send((self.session, event)).is_ok()
    }
}

/// Source of microphone audio
///
/// `request` starts the asynchronous permission/open sequence and must report
/// back through the sink. `stop` ends capture; the backend flushes remaining
/// audio and then sends `Stopped`. `release` frees the device and is called
/// after every session, successful or not.
pub trait Microphone: Send {
    fn request(&mut self, sink: CaptureSink);
    fn stop(&mut self);
    fn release(&mut self);
}

/// One recorded take
#[derive(Clone)]
pub struct Take {
    /// Encoded audio (WAV)
    pub payload: Shared<Arc<[u8]>>,
    /// Transport position when recording was requested
    pub start_time: Seconds,
}

impl Take {
    pub fn new(payload: Vec<u8>, start_time: Seconds) -> Self {
        Self {
            payload: Shared::new(&gc_handle(), Arc::from(payload)),
            start_time,
        }
    }

    /// Encoded bytes
    pub fn bytes(&self) -> &[u8] {
        &self.payload[..]
    }
}

impl std::fmt::Debug for Take {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Take")
            .field("payload_len", &self.payload.len())
            .field("start_time", &self.start_time)
            .finish()
    }
}

/// Fixed set of take slots with a round-robin write pointer
#[derive(Debug, Clone, Default)]
pub struct TakeSlots {
    slots: [Option<Take>; TAKE_SLOTS],
    /// Bumped whenever a slot's content changes
    revisions: [u64; TAKE_SLOTS],
    next: usize,
}

impl TakeSlots {
    /// Store a take at the write pointer and advance it; returns the slot used
    pub fn write(&mut self, take: Take) -> usize {
        let slot = self.next;
        self.slots[slot] = Some(take);
        self.revisions[slot] += 1;
        self.next = (slot + 1) % TAKE_SLOTS;
        slot
    }

    /// Empty every slot and reset the write pointer
    pub fn clear(&mut self) {
        for (slot, revision) in self.slots.iter_mut().zip(self.revisions.iter_mut()) {
            if slot.take().is_some() {
                *revision += 1;
            }
        }
        self.next = 0;
    }

    pub fn get(&self, slot: usize) -> Option<&Take> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn revision(&self, slot: usize) -> u64 {
        self.revisions.get(slot).copied().unwrap_or(0)
    }

    /// Slot the next take will be written to
    pub fn write_pointer(&self) -> usize {
        self.next
    }

    /// Most recently written slot, if it still holds a take
    pub fn latest(&self) -> Option<usize> {
        let slot = (self.next + TAKE_SLOTS - 1) % TAKE_SLOTS;
        self.slots[slot].as_ref().map(|_| slot)
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CaptureState {
    Idle,
    /// Waiting for the microphone to grant access
    Requesting,
    Recording { format: CaptureFormat },
    /// Stop sent, waiting for the final flush
    Stopping { format: CaptureFormat, discard: bool },
}

/// Push-to-record state machine over a [`Microphone`]
pub struct TakeRecorder {
    mic: Box<dyn Microphone>,
    events_tx: Sender<(u64, CaptureEvent)>,
    events_rx: Receiver<(u64, CaptureEvent)>,
    /// Id of the current capture session; events from older ones are dropped
    session: u64,
    state: CaptureState,
    stop_requested: bool,
    anchor: Seconds,
    chunks: Vec<Vec<u8>>,
    slots: TakeSlots,
    /// Takes coming back from the encode workers
    encoded_tx: Sender<Result<Take, DecodeError>>,
    encoded_rx: Receiver<Result<Take, DecodeError>>,
    /// Set by shutdown; late encodes are dropped
    closed: bool,
    permission: Option<bool>,
    last_error: Option<CaptureError>,
}

impl TakeRecorder {
    pub fn new(mic: Box<dyn Microphone>) -> Self {
        let (events_tx, events_rx) = mpsc::channel();
        let (encoded_tx, encoded_rx) = mpsc::channel();
        Self {
            mic,
            events_tx,
            events_rx,
            session: 0,
            state: CaptureState::Idle,
            stop_requested: false,
            anchor: 0.0,
            chunks: Vec::new(),
            slots: TakeSlots::default(),
            encoded_tx,
            encoded_rx,
            closed: false,
            permission: None,
            last_error: None,
        }
    }

    /// Begin a capture anchored at `position` (the live transport position)
    ///
    /// Ignored with a warning while a capture is already in progress.
    pub fn start_recording(&mut self, position: Seconds) {
        if self.state != CaptureState::Idle {
            log::warn!("Recorder: Already recording");
            return;
        }

        self.session += 1;
        self.anchor = position;
        self.stop_requested = false;
        self.chunks.clear();
        self.state = CaptureState::Requesting;
        log::info!("Recorder: Requesting microphone (take anchored at {:.3}s)", position);

        self.mic.request(CaptureSink {
            session: self.session,
            tx: self.events_tx.clone(),
        });
    }

    /// End the current capture
    ///
    /// If access has not been granted yet, the stop is remembered and
    /// applied as soon as it is.
    pub fn stop_recording(&mut self) {
        match self.state {
            CaptureState::Idle | CaptureState::Stopping { .. } => {}
            CaptureState::Requesting => {
                log::debug!("Recorder: Stop requested before capture started");
                self.stop_requested = true;
            }
            CaptureState::Recording { format } => {
                self.state = CaptureState::Stopping {
                    format,
                    discard: false,
                };
                self.mic.stop();
            }
        }
    }

    /// Drain capture events and encoded takes; returns true if the take
    /// slots changed
    pub fn poll(&mut self) -> bool {
        while let Ok((session, event)) = self.events_rx.try_recv() {
            if session != self.session {
                log::debug!("Recorder: Dropping event from stale capture {}", session);
                continue;
            }
            self.handle_event(event);
        }

        let mut changed = false;
        while let Ok(result) = self.encoded_rx.try_recv() {
            if self.closed {
                continue;
            }
            match result {
                Ok(take) => {
                    let start_time = take.start_time;
                    let slot = self.slots.write(take);
                    log::info!(
                        "Recorder: Take stored in slot {} (starts at {:.3}s)",
                        slot,
                        start_time
                    );
                    changed = true;
                }
                Err(e) => {
                    log::error!("Recorder: Failed to store take: {}", e);
                    self.last_error = Some(CaptureError::Encode(e.to_string()));
                }
            }
        }
        changed
    }

    fn handle_event(&mut self, event: CaptureEvent) {
        match (self.state, event) {
            (CaptureState::Requesting, CaptureEvent::Granted(format)) => {
                self.permission = Some(true);
                self.last_error = None;
                if self.stop_requested {
                    log::info!("Recorder: Released before capture began, no take");
                    self.stop_requested = false;
                    self.state = CaptureState::Stopping {
                        format,
                        discard: true,
                    };
                    self.mic.stop();
                } else {
                    log::info!(
                        "Recorder: Recording ({} Hz, {} ch)",
                        format.sample_rate,
                        format.channels
                    );
                    self.state = CaptureState::Recording { format };
                }
            }
            (CaptureState::Requesting, CaptureEvent::Denied(reason)) => {
                log::warn!("Recorder: Microphone access denied: {}", reason);
                self.permission = Some(false);
                self.last_error = Some(CaptureError::PermissionDenied(reason));
                self.finish_session();
            }
            (CaptureState::Requesting, CaptureEvent::Failed(reason)) => {
                log::error!("Recorder: Microphone unavailable: {}", reason);
                self.last_error = Some(CaptureError::DeviceFailed(reason));
                self.finish_session();
            }
            (CaptureState::Recording { .. }, CaptureEvent::Chunk(bytes))
            | (CaptureState::Stopping { discard: false, .. }, CaptureEvent::Chunk(bytes)) => {
                if !bytes.is_empty() {
                    self.chunks.push(bytes);
                }
            }
            (CaptureState::Recording { format }, CaptureEvent::Failed(reason)) => {
                log::error!("Recorder: Capture failed, stopping: {}", reason);
                self.last_error = Some(CaptureError::DeviceFailed(reason));
                self.state = CaptureState::Stopping {
                    format,
                    discard: false,
                };
                self.mic.stop();
            }
            (CaptureState::Recording { format }, CaptureEvent::Stopped) => {
                self.state = CaptureState::Stopping {
                    format,
                    discard: false,
                };
                self.complete_capture();
            }
            (CaptureState::Stopping { .. }, CaptureEvent::Stopped) => self.complete_capture(),
            (CaptureState::Requesting, CaptureEvent::Stopped) => self.finish_session(),
            (_, event) => {
                log::debug!("Recorder: Ignoring {:?} in {:?}", event, self.state);
            }
        }
    }

    /// Hand the gathered chunks to an encode worker if they hold any audio
    fn complete_capture(&mut self) {
        let CaptureState::Stopping { format, discard } = self.state else {
            return;
        };

        let captured: usize = self.chunks.iter().map(Vec::len).sum();
        let frames = captured / format.frame_bytes();

        if !discard && frames > 0 {
            let chunks = std::mem::take(&mut self.chunks);
            let start_time = self.anchor;
            let tx = self.encoded_tx.clone();
            log::debug!("Recorder: Encoding {} frames", frames);
            rayon::spawn(move || {
                let result = encode_take(&chunks, format).map(|wav| Take::new(wav, start_time));
                let _ = tx.send(result);
            });
        } else {
            log::info!("Recorder: Empty capture discarded");
        }

        self.finish_session();
    }

    /// Release the device and return to idle
    fn finish_session(&mut self) {
        if !self.chunks.is_empty() {
            // Free abandoned audio on the pool
            let chunks = std::mem::take(&mut self.chunks);
            rayon::spawn(move || drop(chunks));
        }
        self.stop_requested = false;
        self.state = CaptureState::Idle;
        self.mic.release();
    }

    /// Empty both slots and reset the write pointer
    pub fn clear_takes(&mut self) {
        self.slots.clear();
        log::info!("Recorder: Takes cleared");
    }

    /// Stop any capture and free the device without producing a take
    ///
    /// Takes still being encoded are dropped.
    pub fn shutdown(&mut self) {
        self.closed = true;
        if matches!(self.state, CaptureState::Recording { .. }) {
            self.mic.stop();
        }
        if self.state != CaptureState::Idle {
            // Anything still in flight belongs to a session nobody will finish
            self.session += 1;
            self.finish_session();
        }
    }

    // --- Observables ---

    /// Whether a capture session is in progress (including start-up and flush)
    pub fn is_recording(&self) -> bool {
        self.state != CaptureState::Idle
    }

    /// Microphone permission: unknown, granted or denied
    pub fn permission(&self) -> Option<bool> {
        self.permission
    }

    pub fn last_error(&self) -> Option<&CaptureError> {
        self.last_error.as_ref()
    }

    pub fn slots(&self) -> &TakeSlots {
        &self.slots
    }

    pub fn take(&self, slot: usize) -> Option<&Take> {
        self.slots.get(slot)
    }

    pub fn take_count(&self) -> usize {
        self.slots.count()
    }

    /// Most recently written slot
    pub fn latest_slot(&self) -> Option<usize> {
        self.slots.latest()
    }
}
