//! Editing session: one backing track, its loop, its takes
//!
//! The session owns the transport clock, the loop machine, the take recorder
//! and the take mixer, and is the only place they talk to each other:
//!
//! - the two hold gestures turn raw press/release input into play/pause,
//!   record, loop and loop-reset actions
//! - every rendered sub-block is bracketed by position updates: the mixer
//!   checks for takes to trigger before mixing, the loop-back rule runs
//!   after the transport has advanced
//! - recorder and decoder results are drained by [`Session::poll`]
//!
//! Blocks are split at the loop end and at take start times so the jump
//! back to A and every take start happen on the exact frame.

use std::sync::Arc;
use std::time::Instant;

use basedrop::Shared;

use crate::audio::MAX_BUFFER_SIZE;
use crate::config::SessionConfig;
use crate::decoder::{DecodeResult, DecodeService, DecodeTarget};
use crate::engine::gc_handle;
use crate::gesture::{HoldGesture, Release};
use crate::looping::{LoopMachine, LoopState};
use crate::mixer::TakeMixer;
use crate::recorder::{Microphone, TakeRecorder};
use crate::transport::Transport;
use crate::types::{AudioClip, Seconds, SourceId, StereoBuffer, StereoSample};

/// Everything an observer may want to display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSnapshot {
    pub has_audio: bool,
    pub loaded: bool,
    pub playing: bool,
    pub position: Seconds,
    pub duration: Seconds,
    pub playback_rate: f64,
    pub loop_state: LoopState,
    pub recording: bool,
    pub permission: Option<bool>,
    pub take_count: usize,
    pub takes_enabled: bool,
    pub take_preview: Option<usize>,
}

/// One editing session
pub struct Session {
    transport: Transport,
    looper: LoopMachine,
    recorder: TakeRecorder,
    mixer: TakeMixer,
    decoder: DecodeService,
    record_hold: HoldGesture,
    loop_hold: HoldGesture,
    /// Transport output before mixing
    scratch: StereoBuffer,
    ended: bool,
}

impl Session {
    pub fn new(config: &SessionConfig, output_rate: u32, mic: Box<dyn Microphone>) -> Self {
        log::info!("Session: Started at {} Hz", output_rate);
        Self {
            transport: Transport::new(output_rate).with_skip_seconds(config.skip_seconds),
            looper: LoopMachine::new(config.min_loop_gap),
            recorder: TakeRecorder::new(mic),
            mixer: TakeMixer::new(output_rate),
            decoder: DecodeService::new(),
            record_hold: HoldGesture::new(config.hold_to_record()),
            loop_hold: HoldGesture::new(config.loop_reset_hold()),
            scratch: StereoBuffer::silence(MAX_BUFFER_SIZE),
            ended: false,
        }
    }

    // --- Sources ---

    /// Attach an encoded backing track, or detach with `None`
    ///
    /// Decoding happens in the background; the duration becomes known once
    /// [`Session::poll`] picks up the result.
    pub fn open_track(&mut self, audio: Option<Arc<[u8]>>) -> Option<SourceId> {
        let source = audio.as_ref().map(|_| SourceId::next());
        self.attach(source);
        if let (Some(id), Some(bytes)) = (source, audio) {
            self.decoder.submit(DecodeTarget::Track(id), bytes);
        }
        source
    }

    /// Attach an already decoded backing track
    pub fn open_clip(&mut self, clip: AudioClip) -> SourceId {
        let id = SourceId::next();
        self.attach(Some(id));
        self.transport.source_ready(id, Shared::new(&gc_handle(), clip));
        id
    }

    fn attach(&mut self, source: Option<SourceId>) {
        self.transport.attach(source);
        self.looper.clear();
        self.mixer.attach_source(source);
    }

    // --- Gestures ---

    /// Transport control went down
    pub fn transport_press(&mut self, now: Instant) {
        self.tick(now);
        self.record_hold.press(now);
    }

    /// Transport control came up: a tap toggles play, ending a hold stops recording
    pub fn transport_release(&mut self, now: Instant) {
        self.tick(now);
        match self.record_hold.release() {
            Release::Tap => self.toggle_play(),
            Release::AfterHold => self.stop_recording(),
            Release::Ignored => {}
        }
    }

    /// Loop control went down
    pub fn loop_press(&mut self, now: Instant) {
        self.tick(now);
        self.loop_hold.press(now);
    }

    /// Loop control came up: a tap cycles the loop
    pub fn loop_release(&mut self, now: Instant) {
        self.tick(now);
        if self.loop_hold.release() == Release::Tap {
            self.cycle_loop();
        }
    }

    /// Pointer left the loop control before the hold fired
    pub fn loop_leave(&mut self) {
        self.loop_hold.cancel();
    }

    /// Fire hold timers that have expired by `now`
    pub fn tick(&mut self, now: Instant) {
        if self.record_hold.poll(now) {
            self.start_recording();
        }
        if self.loop_hold.poll(now) {
            self.reset_loop();
        }
    }

    // --- Transport ---

    /// Loop-aware play/pause
    pub fn toggle_play(&mut self) {
        self.looper.toggle_play(&mut self.transport);
    }

    pub fn play(&mut self) {
        self.transport.play();
    }

    pub fn pause(&mut self) {
        self.transport.pause();
    }

    pub fn seek(&mut self, time: Seconds) {
        self.transport.seek(time);
    }

    pub fn skip_back(&mut self) {
        self.transport.skip_back();
    }

    pub fn skip_forward(&mut self) {
        self.transport.skip_forward();
    }

    pub fn set_playback_rate(&mut self, rate: f64) {
        self.transport.set_playback_rate(rate);
    }

    pub fn cycle_playback_rate(&mut self) {
        self.transport.cycle_playback_rate();
        log::debug!("Session: Rate {}x", self.transport.playback_rate());
    }

    /// Live playhead position
    pub fn current_position(&self) -> Seconds {
        self.transport.current_position()
    }

    // --- Loop ---

    pub fn cycle_loop(&mut self) {
        self.looper.cycle(&self.transport);
    }

    pub fn reset_loop(&mut self) {
        self.looper.reset(&mut self.transport);
    }

    // --- Takes ---

    /// Start a take anchored at the live position
    pub fn start_recording(&mut self) {
        self.recorder.start_recording(self.transport.current_position());
    }

    pub fn stop_recording(&mut self) {
        self.recorder.stop_recording();
    }

    pub fn clear_takes(&mut self) {
        self.mixer.stop_take();
        self.recorder.clear_takes();
        self.mixer.sync_takes(self.recorder.slots(), &self.decoder);
    }

    pub fn play_take(&mut self, slot: usize) -> bool {
        self.mixer.play_take(slot)
    }

    pub fn stop_take(&mut self) {
        self.mixer.stop_take();
    }

    /// Toggle a take preview, starting with the most recent take
    pub fn toggle_take(&mut self) {
        self.mixer.toggle_take(self.recorder.latest_slot());
    }

    pub fn set_takes_enabled(&mut self, enabled: bool) {
        self.mixer.set_takes_enabled(enabled);
    }

    pub fn toggle_takes_enabled(&mut self) {
        self.mixer.toggle_takes_enabled();
    }

    // --- Background results ---

    /// Drain capture events and finished decodes
    pub fn poll(&mut self) {
        if self.recorder.poll() {
            self.mixer.sync_takes(self.recorder.slots(), &self.decoder);
        }

        while let Some(DecodeResult { target, result }) = self.decoder.try_recv() {
            match target {
                DecodeTarget::Track(id) => match result {
                    Ok(clip) => {
                        self.transport.source_ready(id, clip);
                    }
                    Err(e) => {
                        log::error!("Session: Failed to load track: {}", e);
                        self.transport.source_failed(id);
                    }
                },
                DecodeTarget::Take { slot, revision } => {
                    self.mixer.install_decoded(slot, revision, result);
                }
            }
        }
    }

    // --- Rendering ---

    /// Render one output block
    ///
    /// The block is cut into sub-blocks at the loop end and at the next take
    /// start, so both land on their exact frame. Each sub-block starts with
    /// a position update for the mixer: takes whose span contains the
    /// playhead start in that sub-block, and a pause or restart since the
    /// last one silences the auto-triggered takes before anything is mixed.
    pub fn render(&mut self, out: &mut [StereoSample]) {
        let mut offset = 0;
        while offset < out.len() {
            self.mixer.on_position(
                self.transport.current_position(),
                self.transport.play_run(),
            );

            let mut len = (out.len() - offset).min(self.scratch.len());
            let boundaries = [
                self.looper.frames_until_boundary(&self.transport),
                self.mixer.frames_until_next_take(&self.transport),
            ];
            for frames in boundaries.into_iter().flatten() {
                len = len.min(frames.max(1));
            }

            let block = &mut self.scratch.as_mut_slice()[..len];
            self.transport.render(block);
            self.mixer
                .mix(&self.scratch.as_slice()[..len], &mut out[offset..offset + len]);

            self.looper.on_position_update(&mut self.transport);
            offset += len;
        }

        // Track end or loop-back in the last sub-block
        self.mixer.on_position(
            self.transport.current_position(),
            self.transport.play_run(),
        );
    }

    // --- Observables ---

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            has_audio: self.transport.has_audio(),
            loaded: self.transport.is_loaded(),
            playing: self.transport.is_playing(),
            position: self.transport.current_position(),
            duration: self.transport.duration(),
            playback_rate: self.transport.playback_rate(),
            loop_state: self.looper.state(),
            recording: self.recorder.is_recording(),
            permission: self.recorder.permission(),
            take_count: self.recorder.take_count(),
            takes_enabled: self.mixer.takes_enabled(),
            take_preview: self.mixer.manual_slot(),
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn recorder(&self) -> &TakeRecorder {
        &self.recorder
    }

    pub fn mixer(&self) -> &TakeMixer {
        &self.mixer
    }

    // --- Teardown ---

    /// Stop playback, abandon any capture and close the mix graph
    pub fn end(&mut self) {
        if self.ended {
            return;
        }
        self.ended = true;
        self.transport.pause();
        self.recorder.shutdown();
        self.mixer.close();
        log::info!("Session: Ended");
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.end();
    }
}
