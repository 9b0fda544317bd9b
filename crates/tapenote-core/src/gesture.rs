//! Press-and-hold detection for the transport and loop controls
//!
//! A control is pressed, optionally held past a threshold, then released.
//! Time is passed in explicitly so callers decide which clock drives the
//! timer (UI event time, audio block time, or a fake clock in tests).

use std::time::{Duration, Instant};

/// Outcome of releasing a control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// Released before the hold threshold
    Tap,
    /// Released after the hold had already fired
    AfterHold,
    /// Release without a matching press (cancelled or never pressed)
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed { since: Instant },
    Fired,
}

/// Hold timer for one control
#[derive(Debug, Clone)]
pub struct HoldGesture {
    threshold: Duration,
    phase: Phase,
}

impl HoldGesture {
    pub fn new(threshold: Duration) -> Self {
        Self {
            threshold,
            phase: Phase::Idle,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Control went down
    pub fn press(&mut self, now: Instant) {
        self.phase = Phase::Armed { since: now };
    }

    /// Advance the timer; returns true exactly once when the hold fires
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Armed { since } if now.saturating_duration_since(since) >= self.threshold => {
                self.phase = Phase::Fired;
                true
            }
            _ => false,
        }
    }

    /// Control came up
    ///
    /// Callers should `poll` with the same `now` first so a hold that expired
    /// before the release is reported as fired.
    pub fn release(&mut self) -> Release {
        let outcome = match self.phase {
            Phase::Idle => Release::Ignored,
            Phase::Armed { .. } => Release::Tap,
            Phase::Fired => Release::AfterHold,
        };
        self.phase = Phase::Idle;
        outcome
    }

    /// Pointer left the control: drop a pending timer without an action
    ///
    /// Returns true if a timer was pending.
    pub fn cancel(&mut self) -> bool {
        let was_armed = matches!(self.phase, Phase::Armed { .. });
        if was_armed {
            self.phase = Phase::Idle;
        }
        was_armed
    }

    /// Whether the control is currently down
    pub fn is_pressed(&self) -> bool {
        !matches!(self.phase, Phase::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_quick_release_is_tap() {
        let start = Instant::now();
        let mut gesture = HoldGesture::new(ms(120));
        gesture.press(start);
        assert!(!gesture.poll(start + ms(50)));
        assert_eq!(gesture.release(), Release::Tap);
        assert!(!gesture.is_pressed());
    }

    #[test]
    fn test_hold_fires_once() {
        let start = Instant::now();
        let mut gesture = HoldGesture::new(ms(120));
        gesture.press(start);
        assert!(gesture.poll(start + ms(120)));
        assert!(!gesture.poll(start + ms(300)));
        assert_eq!(gesture.release(), Release::AfterHold);
    }

    #[test]
    fn test_cancel_drops_pending_hold() {
        let start = Instant::now();
        let mut gesture = HoldGesture::new(ms(500));
        gesture.press(start);
        assert!(gesture.cancel());
        assert!(!gesture.poll(start + ms(600)));
        assert_eq!(gesture.release(), Release::Ignored);
    }

    #[test]
    fn test_cancel_after_fire_keeps_hold() {
        let start = Instant::now();
        let mut gesture = HoldGesture::new(ms(500));
        gesture.press(start);
        assert!(gesture.poll(start + ms(500)));
        assert!(!gesture.cancel());
        assert_eq!(gesture.release(), Release::AfterHold);
    }

    #[test]
    fn test_release_without_press_is_ignored() {
        let mut gesture = HoldGesture::new(ms(120));
        assert_eq!(gesture.release(), Release::Ignored);
    }
}
