//! A/B loop state machine
//!
//! Three states driven by one control: a tap cycles
//! `Off -> PointA -> LoopAB -> Off`, a long hold resets to `Off` and pauses.
//! While a full loop is set and the transport is playing, reaching B jumps
//! straight back to A.

use crate::config::DEFAULT_MIN_LOOP_GAP;
use crate::transport::{Transport, POSITION_EPSILON};
use crate::types::Seconds;

/// Current loop mode
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoopState {
    /// No loop
    #[default]
    Off,
    /// Cue point A is set; play/pause always restarts from A
    PointA { a: Seconds },
    /// Full loop; playback wraps from B back to A
    LoopAB { a: Seconds, b: Seconds },
}

impl LoopState {
    /// The point resume and restart go back to, if any
    pub fn cue_point(&self) -> Option<Seconds> {
        match *self {
            LoopState::Off => None,
            LoopState::PointA { a } | LoopState::LoopAB { a, .. } => Some(a),
        }
    }

    /// Loop end while a full loop is set
    pub fn loop_end(&self) -> Option<Seconds> {
        match *self {
            LoopState::LoopAB { b, .. } => Some(b),
            _ => None,
        }
    }

    /// Compact tag for atomics (0 = off, 1 = A set, 2 = A/B loop)
    pub fn tag(&self) -> u8 {
        match self {
            LoopState::Off => 0,
            LoopState::PointA { .. } => 1,
            LoopState::LoopAB { .. } => 2,
        }
    }
}

/// Loop state plus the rules for moving between states
#[derive(Debug, Clone)]
pub struct LoopMachine {
    state: LoopState,
    min_gap: Seconds,
}

impl LoopMachine {
    pub fn new(min_gap: Seconds) -> Self {
        let min_gap = if min_gap.is_finite() && min_gap > 0.0 {
            min_gap
        } else {
            DEFAULT_MIN_LOOP_GAP
        };
        Self {
            state: LoopState::Off,
            min_gap,
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    /// Short tap on the loop control
    ///
    /// Off sets A at the live position. PointA sets B at the live position,
    /// pushed out to at least `a + min_gap`. LoopAB clears the loop.
    pub fn cycle(&mut self, transport: &Transport) {
        if !transport.has_audio() {
            return;
        }
        let position = transport.current_position();
        self.state = match self.state {
            LoopState::Off => {
                log::info!("Loop: A set at {:.3}s", position);
                LoopState::PointA { a: position }
            }
            LoopState::PointA { a } => {
                let b = position.max(a + self.min_gap);
                log::info!("Loop: A/B loop {:.3}s -> {:.3}s", a, b);
                LoopState::LoopAB { a, b }
            }
            LoopState::LoopAB { .. } => {
                log::info!("Loop: Cleared");
                LoopState::Off
            }
        };
    }

    /// Long hold on the loop control: clear the loop and pause
    pub fn reset(&mut self, transport: &mut Transport) {
        if !transport.has_audio() {
            return;
        }
        self.state = LoopState::Off;
        transport.pause();
        log::info!("Loop: Reset");
    }

    /// Drop the loop without touching the transport (new source attached)
    pub fn clear(&mut self) {
        self.state = LoopState::Off;
    }

    /// Loop-aware play/pause
    ///
    /// - Off: plain toggle
    /// - PointA: always restart from A and play
    /// - LoopAB: pause if playing, otherwise restart from A and play
    pub fn toggle_play(&self, transport: &mut Transport) {
        match self.state {
            LoopState::Off => transport.toggle_play(),
            LoopState::PointA { a } => {
                transport.pause();
                transport.seek(a);
                transport.play();
            }
            LoopState::LoopAB { a, .. } => {
                if transport.is_playing() {
                    transport.pause();
                } else {
                    transport.seek(a);
                    transport.play();
                }
            }
        }
    }

    /// Apply the loop-back rule after the transport has advanced
    ///
    /// Returns true if the playhead was moved back to A.
    pub fn on_position_update(&self, transport: &mut Transport) -> bool {
        let LoopState::LoopAB { a, b } = self.state else {
            return false;
        };
        if transport.is_playing() && transport.current_position() >= b - POSITION_EPSILON {
            transport.jump_to(a);
            return true;
        }
        false
    }

    /// Output frames until the transport reaches B, while looping and playing
    ///
    /// Renderers split their block here so the jump lands on the right frame.
    pub fn frames_until_boundary(&self, transport: &Transport) -> Option<usize> {
        self.state.loop_end().and_then(|b| transport.frames_until(b))
    }
}

impl Default for LoopMachine {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_LOOP_GAP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;
    use crate::types::{AudioClip, SourceId, StereoBuffer, StereoSample};
    use basedrop::Shared;

    const RATE: u32 = 1000;

    fn transport(seconds: f64) -> Transport {
        let mut transport = Transport::new(RATE);
        let id = SourceId::next();
        transport.attach(Some(id));
        let clip = AudioClip::new(StereoBuffer::silence((seconds * RATE as f64) as usize), RATE);
        transport.source_ready(id, Shared::new(&gc_handle(), clip));
        transport
    }

    #[test]
    fn test_cycle_walks_through_states() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();

        transport.seek(10.0);
        looper.cycle(&transport);
        assert_eq!(looper.state(), LoopState::PointA { a: 10.0 });

        transport.seek(20.0);
        looper.cycle(&transport);
        assert_eq!(looper.state(), LoopState::LoopAB { a: 10.0, b: 20.0 });

        looper.cycle(&transport);
        assert_eq!(looper.state(), LoopState::Off);
    }

    #[test]
    fn test_loop_end_keeps_minimum_gap() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();

        transport.seek(10.0);
        looper.cycle(&transport);
        transport.seek(5.0);
        looper.cycle(&transport);
        assert_eq!(looper.state(), LoopState::LoopAB { a: 10.0, b: 10.5 });

        let mut looper = LoopMachine::default();
        transport.seek(10.0);
        looper.cycle(&transport);
        looper.cycle(&transport);
        match looper.state() {
            LoopState::LoopAB { a, b } => assert!(b >= a + 0.5),
            other => panic!("unexpected state {other:?}"),
        }
    }

    #[test]
    fn test_cycle_without_audio_is_noop() {
        let transport = Transport::new(RATE);
        let mut looper = LoopMachine::default();
        looper.cycle(&transport);
        assert_eq!(looper.state(), LoopState::Off);
    }

    #[test]
    fn test_reset_pauses_and_clears() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();
        transport.seek(4.0);
        looper.cycle(&transport);
        transport.play();

        looper.reset(&mut transport);
        assert_eq!(looper.state(), LoopState::Off);
        assert!(!transport.is_playing());
    }

    #[test]
    fn test_point_a_toggle_always_restarts() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();
        transport.seek(8.0);
        looper.cycle(&transport);
        transport.seek(15.0);

        looper.toggle_play(&mut transport);
        assert!(transport.is_playing());
        assert_eq!(transport.current_position(), 8.0);

        transport.seek(12.0);
        looper.toggle_play(&mut transport);
        assert!(transport.is_playing());
        assert_eq!(transport.current_position(), 8.0);
    }

    #[test]
    fn test_loop_ab_toggle_pauses_then_restarts_from_a() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();
        transport.seek(10.0);
        looper.cycle(&transport);
        transport.seek(20.0);
        looper.cycle(&transport);

        transport.seek(14.0);
        looper.toggle_play(&mut transport);
        assert!(transport.is_playing());
        assert_eq!(transport.current_position(), 10.0);

        transport.seek(16.0);
        looper.toggle_play(&mut transport);
        assert!(!transport.is_playing());
        assert_eq!(transport.current_position(), 16.0);
    }

    #[test]
    fn test_loop_back_jumps_to_a() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();
        transport.seek(10.0);
        looper.cycle(&transport);
        transport.seek(20.0);
        looper.cycle(&transport);

        transport.seek(19.9);
        transport.play();
        let frames = looper.frames_until_boundary(&transport).unwrap();
        assert_eq!(frames, 100);
        let mut block = vec![StereoSample::silence(); frames];
        transport.render(&mut block);
        assert!(looper.on_position_update(&mut transport));
        assert_eq!(transport.current_position(), 10.0);
        assert!(transport.is_playing());
    }

    #[test]
    fn test_no_loop_back_while_paused() {
        let mut transport = transport(60.0);
        let mut looper = LoopMachine::default();
        transport.seek(10.0);
        looper.cycle(&transport);
        transport.seek(20.0);
        looper.cycle(&transport);

        transport.seek(25.0);
        assert!(!looper.on_position_update(&mut transport));
        assert_eq!(transport.current_position(), 25.0);
    }
}
