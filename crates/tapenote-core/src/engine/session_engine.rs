//! Audio-thread side of a session
//!
//! [`SessionEngine`] owns the [`Session`] exclusively. Each block it drains
//! the command queue, fires hold timers, collects background results,
//! renders, and publishes the snapshot to [`SessionAtomics`].

use std::sync::Arc;
use std::time::Instant;

use crate::audio::MAX_BUFFER_SIZE;
use crate::session::Session;
use crate::types::{StereoBuffer, StereoSample};

use super::atomics::SessionAtomics;
use super::command::{command_channel, SessionCommand};

impl Session {
    /// Apply all pending commands from the UI (non-blocking)
    pub fn process_commands(&mut self, rx: &mut rtrb::Consumer<SessionCommand>) {
        while let Ok(cmd) = rx.pop() {
            self.apply_command(cmd);
        }
    }

    fn apply_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::OpenTrack(audio) => {
                self.open_track(audio);
            }
            SessionCommand::TransportPress { at } => self.transport_press(at),
            SessionCommand::TransportRelease { at } => self.transport_release(at),
            SessionCommand::LoopPress { at } => self.loop_press(at),
            SessionCommand::LoopRelease { at } => self.loop_release(at),
            SessionCommand::LoopLeave => self.loop_leave(),
            SessionCommand::TogglePlay => self.toggle_play(),
            SessionCommand::Play => self.play(),
            SessionCommand::Pause => self.pause(),
            SessionCommand::Seek(time) => self.seek(time),
            SessionCommand::SkipBack => self.skip_back(),
            SessionCommand::SkipForward => self.skip_forward(),
            SessionCommand::SetPlaybackRate(rate) => self.set_playback_rate(rate),
            SessionCommand::CyclePlaybackRate => self.cycle_playback_rate(),
            SessionCommand::CycleLoop => self.cycle_loop(),
            SessionCommand::ResetLoop => self.reset_loop(),
            SessionCommand::StartRecording => self.start_recording(),
            SessionCommand::StopRecording => self.stop_recording(),
            SessionCommand::ClearTakes => self.clear_takes(),
            SessionCommand::PlayTake(slot) => {
                self.play_take(slot);
            }
            SessionCommand::StopTake => self.stop_take(),
            SessionCommand::ToggleTake => self.toggle_take(),
            SessionCommand::SetTakesEnabled(enabled) => self.set_takes_enabled(enabled),
            SessionCommand::ToggleTakesEnabled => self.toggle_takes_enabled(),
            SessionCommand::EndSession => self.end(),
        }
    }
}

/// Session plus its command queue and output buffer
pub struct SessionEngine {
    session: Session,
    command_rx: rtrb::Consumer<SessionCommand>,
    atomics: Arc<SessionAtomics>,
    /// Pre-allocated output buffer
    output: StereoBuffer,
}

impl SessionEngine {
    /// Produce the next `n_frames` of output (at most `MAX_BUFFER_SIZE`)
    pub fn process(&mut self, n_frames: usize) {
        // Rendering into the pre-allocated buffer does not allocate. Capture
        // chunks and channel messages still do; encoding, decoding and freeing
        // take audio run on the rayon pool and the basedrop collector.
        self.output.set_len_from_capacity(n_frames.min(MAX_BUFFER_SIZE));

        self.session.process_commands(&mut self.command_rx);
        self.session.tick(Instant::now());
        self.session.poll();

        if self.session.is_ended() {
            self.output.fill_silence();
        } else {
            self.session.render(self.output.as_mut_slice());
        }

        self.atomics.publish(&self.session.snapshot());
    }

    /// Output of the last `process` call
    pub fn output(&self) -> &[StereoSample] {
        self.output.as_slice()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

/// UI-side handle for sending commands
///
/// Wraps the lock-free producer. All operations are non-blocking.
pub struct CommandSender {
    producer: rtrb::Producer<SessionCommand>,
}

impl CommandSender {
    /// Queue a command for the audio thread
    ///
    /// Returns `Err(cmd)` if the queue is full.
    pub fn send(&mut self, cmd: SessionCommand) -> Result<(), SessionCommand> {
        self.producer.push(cmd).map_err(|e| match e {
            rtrb::PushError::Full(value) => value,
        })
    }

    /// Check if the queue has space for more commands
    pub fn has_space(&self) -> bool {
        self.producer.slots() > 0
    }
}

/// Wire a session to a fresh command queue and atomics
pub fn create_engine(session: Session) -> (SessionEngine, CommandSender, Arc<SessionAtomics>) {
    let (producer, command_rx) = command_channel();
    let atomics = Arc::new(SessionAtomics::new());
    let engine = SessionEngine {
        session,
        command_rx,
        atomics: Arc::clone(&atomics),
        output: StereoBuffer::silence(MAX_BUFFER_SIZE),
    };
    (engine, CommandSender { producer }, atomics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::looping::LoopState;
    use crate::testing::{tone_wav, wait_until, ScriptedMicrophone};
    use std::time::Duration;

    const RATE: u32 = 8000;

    fn engine() -> (SessionEngine, CommandSender, Arc<SessionAtomics>) {
        let (mic, _handle) = ScriptedMicrophone::new();
        create_engine(Session::new(&SessionConfig::default(), RATE, Box::new(mic)))
    }

    fn load_track(engine: &mut SessionEngine, tx: &mut CommandSender, atomics: &SessionAtomics) {
        tx.send(SessionCommand::OpenTrack(Some(tone_wav(30.0, RATE, 0.5).into())))
            .ok()
            .unwrap();
        assert!(wait_until(Duration::from_secs(10), || {
            engine.process(64);
            atomics.is_loaded()
        }));
    }

    #[test]
    fn test_commands_reach_session_and_atomics() {
        let (mut engine, mut tx, atomics) = engine();
        load_track(&mut engine, &mut tx, &atomics);
        assert!((atomics.duration() - 30.0).abs() < 1e-6);

        tx.send(SessionCommand::Seek(4.0)).ok().unwrap();
        tx.send(SessionCommand::CycleLoop).ok().unwrap();
        tx.send(SessionCommand::CyclePlaybackRate).ok().unwrap();
        engine.process(64);

        assert_eq!(atomics.loop_state(), LoopState::PointA { a: 4.0 });
        assert_eq!(atomics.playback_rate(), 1.25);
        assert_eq!(atomics.position(), 4.0);
    }

    #[test]
    fn test_rendered_output_follows_transport() {
        let (mut engine, mut tx, atomics) = engine();
        load_track(&mut engine, &mut tx, &atomics);
        engine.process(128);
        assert_eq!(engine.output()[10], StereoSample::silence());

        tx.send(SessionCommand::TogglePlay).ok().unwrap();
        engine.process(128);
        assert!(atomics.is_playing());
        assert_eq!(engine.output().len(), 128);
        assert!(engine.output()[10].left > 0.4);
        assert!((atomics.position() - 128.0 / RATE as f64).abs() < 1e-9);
    }

    #[test]
    fn test_tap_gesture_via_commands() {
        let (mut engine, mut tx, atomics) = engine();
        load_track(&mut engine, &mut tx, &atomics);
        let now = Instant::now();
        tx.send(SessionCommand::TransportPress { at: now }).ok().unwrap();
        tx.send(SessionCommand::TransportRelease { at: now + Duration::from_millis(40) })
            .ok()
            .unwrap();
        engine.process(64);

        assert!(atomics.is_playing());
        assert!(!atomics.is_recording());
    }

    #[test]
    fn test_end_session_silences_output() {
        let (mut engine, mut tx, atomics) = engine();
        load_track(&mut engine, &mut tx, &atomics);
        tx.send(SessionCommand::Play).ok().unwrap();
        tx.send(SessionCommand::EndSession).ok().unwrap();
        engine.process(64);

        assert!(engine.session().is_ended());
        assert!(!atomics.is_playing());
        assert!(engine.output().iter().all(|s| *s == StereoSample::silence()));
    }

    #[test]
    fn test_full_queue_returns_command() {
        let (_engine, mut tx, _atomics) = engine();
        let mut rejected = false;
        for _ in 0..=crate::engine::COMMAND_QUEUE_CAPACITY {
            if tx.send(SessionCommand::SkipForward).is_err() {
                rejected = true;
            }
        }
        assert!(rejected);
        assert!(!tx.has_space());
    }
}
