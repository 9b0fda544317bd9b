//! Transport clock - playback position, play state and rate of the backing track
//!
//! The transport is the single source of truth for "where are we in the track
//! and is it advancing". It renders the backing track into a block of output
//! frames and advances its position by exactly the amount it rendered, so every
//! render call is one position update.

use basedrop::Shared;

use crate::config::DEFAULT_SKIP_SECONDS;
use crate::types::{AudioClip, Seconds, SourceId, StereoSample, SAMPLE_RATE};

/// Selectable playback rates, in cycling order
pub const PLAYBACK_RATES: [f64; 5] = [0.5, 0.75, 1.0, 1.25, 1.5];

/// Index of 1.0 in `PLAYBACK_RATES`
pub const DEFAULT_RATE_INDEX: usize = 2;

/// Slack for comparing accumulated playhead positions against a target
pub(crate) const POSITION_EPSILON: Seconds = 1e-9;

/// Transport clock for one attached audio source
pub struct Transport {
    /// Identity of the attached source (None = detached)
    source: Option<SourceId>,
    /// Decoded backing track (None until the source has loaded)
    clip: Option<Shared<AudioClip>>,
    /// Output sample rate the transport renders at
    output_rate: u32,
    /// Live playhead position in seconds
    position: Seconds,
    /// Track length in seconds (0 = unknown)
    duration: Seconds,
    /// Index into PLAYBACK_RATES
    rate_index: usize,
    /// Whether the playhead is advancing
    playing: bool,
    /// Bumped on every transition from paused to playing
    run: u64,
    /// Step for skip back / skip forward
    skip_seconds: Seconds,
}

impl Transport {
    /// Create a detached transport rendering at `output_rate`
    pub fn new(output_rate: u32) -> Self {
        Self {
            source: None,
            clip: None,
            output_rate: output_rate.max(1),
            position: 0.0,
            duration: 0.0,
            rate_index: DEFAULT_RATE_INDEX,
            playing: false,
            run: 0,
            skip_seconds: DEFAULT_SKIP_SECONDS,
        }
    }

    /// Override the skip step (seconds)
    pub fn with_skip_seconds(mut self, seconds: Seconds) -> Self {
        if seconds.is_finite() && seconds > 0.0 {
            self.skip_seconds = seconds;
        }
        self
    }

    /// Bind to a new audio source, or detach with `None`
    ///
    /// Playback is stopped before the old source is dropped. Position and
    /// duration reset to 0; the rate is kept.
    pub fn attach(&mut self, source: Option<SourceId>) {
        self.playing = false;
        self.clip = None;
        self.source = source;
        self.position = 0.0;
        self.duration = 0.0;

        match source {
            Some(id) => log::debug!("Transport: Attached source {}", id.raw()),
            None => log::debug!("Transport: Detached"),
        }
    }

    /// The source finished loading; its duration is now known
    ///
    /// Returns false (and ignores the clip) if `source` is no longer attached.
    pub fn source_ready(&mut self, source: SourceId, clip: Shared<AudioClip>) -> bool {
        if self.source != Some(source) {
            log::debug!("Transport: Ignoring stale load for source {}", source.raw());
            return false;
        }
        self.duration = clip.duration();
        self.position = self.position.min(self.duration);
        self.clip = Some(clip);
        log::info!("Transport: Source loaded, {:.2}s", self.duration);
        true
    }

    /// The source failed to load; stay attached with an unknown duration
    pub fn source_failed(&mut self, source: SourceId) {
        if self.source == Some(source) {
            self.playing = false;
            log::warn!("Transport: Source {} failed to load", source.raw());
        }
    }

    /// Whether any source is attached
    pub fn has_audio(&self) -> bool {
        self.source.is_some()
    }

    /// Whether the attached source has loaded
    pub fn is_loaded(&self) -> bool {
        self.clip.is_some()
    }

    /// Identity of the attached source
    pub fn source(&self) -> Option<SourceId> {
        self.source
    }

    /// Output sample rate
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    // --- Playback controls ---

    /// Start advancing
    ///
    /// Starting from the end of the track restarts it from the top.
    pub fn play(&mut self) {
        if !self.has_audio() {
            return;
        }
        if self.is_loaded() && self.duration > 0.0 && self.position >= self.duration {
            self.position = 0.0;
        }
        if !self.playing {
            self.run += 1;
        }
        self.playing = true;
    }

    /// Stop advancing (position is kept)
    pub fn pause(&mut self) {
        self.playing = false;
    }

    /// Plain play/pause toggle, ignoring loop state
    pub fn toggle_play(&mut self) {
        if self.playing {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Jump to `time`, clamped to `[0, duration]`
    ///
    /// Non-finite input lands on 0. Does not change the play state.
    pub fn seek(&mut self, time: Seconds) {
        if !self.has_audio() {
            return;
        }
        self.position = self.clamp_time(time);
    }

    /// Seek back by the skip step
    pub fn skip_back(&mut self) {
        self.seek(self.position - self.skip_seconds);
    }

    /// Seek forward by the skip step
    pub fn skip_forward(&mut self) {
        self.seek(self.position + self.skip_seconds);
    }

    /// Move the playhead without going through the user seek path
    ///
    /// Used by the loop machine for its loop-back jump.
    pub(crate) fn jump_to(&mut self, time: Seconds) {
        if self.has_audio() {
            self.position = self.clamp_time(time);
        }
    }

    fn clamp_time(&self, time: Seconds) -> Seconds {
        if time.is_nan() {
            return 0.0;
        }
        time.clamp(0.0, self.duration.max(0.0))
    }

    // --- Rate ---

    /// Set the playback rate, snapping to the nearest value in `PLAYBACK_RATES`
    pub fn set_playback_rate(&mut self, rate: f64) {
        self.rate_index = if rate.is_nan() {
            DEFAULT_RATE_INDEX
        } else {
            PLAYBACK_RATES
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| {
                    (**a - rate).abs().total_cmp(&(**b - rate).abs())
                })
                .map(|(i, _)| i)
                .unwrap_or(DEFAULT_RATE_INDEX)
        };
    }

    /// Advance to the next rate, wrapping from the last to the first
    pub fn cycle_playback_rate(&mut self) {
        self.rate_index = (self.rate_index + 1) % PLAYBACK_RATES.len();
    }

    /// Current playback rate
    pub fn playback_rate(&self) -> f64 {
        PLAYBACK_RATES[self.rate_index]
    }

    // --- State ---

    /// Whether the playhead is advancing
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Identity of the current play run, or None while paused
    ///
    /// A pause followed by play yields a new run even if nobody observed
    /// the paused state in between.
    pub fn play_run(&self) -> Option<u64> {
        self.playing.then_some(self.run)
    }

    /// Track length in seconds (0 while unknown)
    pub fn duration(&self) -> Seconds {
        self.duration
    }

    /// Live playhead position
    ///
    /// This is the true "now" (e.g. for stamping a lyric line), not the
    /// throttled value the UI last observed.
    pub fn current_position(&self) -> Seconds {
        self.position
    }

    /// Number of output frames until the playhead reaches `time`
    ///
    /// Returns None while paused or unloaded, and 0 if `time` is already behind.
    pub fn frames_until(&self, time: Seconds) -> Option<usize> {
        if !self.playing || !self.is_loaded() {
            return None;
        }
        let remaining = time - self.position - POSITION_EPSILON;
        if remaining <= 0.0 {
            return Some(0);
        }
        let frames = (remaining * self.output_rate as f64 / self.playback_rate()).ceil();
        Some(frames.min(usize::MAX as f64) as usize)
    }

    // --- Rendering ---

    /// Render the backing track into `out` and advance the playhead
    ///
    /// Outputs silence while paused, detached or still loading. Reaching the
    /// end of the track stops playback and silences the rest of the block.
    /// Returns true if the end of the track was reached in this block.
    pub fn render(&mut self, out: &mut [StereoSample]) -> bool {
        let Some(clip) = self.clip.as_ref().filter(|_| self.playing) else {
            out.fill(StereoSample::silence());
            return false;
        };

        let clip_rate = clip.sample_rate() as f64;
        let step = self.playback_rate() / self.output_rate as f64;

        let mut rendered = 0;
        while rendered < out.len() && self.position < self.duration {
            out[rendered] = clip.frame_at(self.position * clip_rate);
            self.position += step;
            rendered += 1;
        }
        out[rendered..].fill(StereoSample::silence());

        if self.position >= self.duration {
            self.position = self.duration;
            self.playing = false;
            log::debug!("Transport: End of track");
            return true;
        }
        false
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(SAMPLE_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;
    use crate::types::StereoBuffer;

    const RATE: u32 = 1000;

    fn loaded(seconds: f64) -> Transport {
        let mut transport = Transport::new(RATE);
        let id = SourceId::next();
        transport.attach(Some(id));
        let frames = (seconds * RATE as f64) as usize;
        let clip = AudioClip::new(StereoBuffer::silence(frames), RATE);
        assert!(transport.source_ready(id, Shared::new(&gc_handle(), clip)));
        transport
    }

    #[test]
    fn test_detached_transport_ignores_controls() {
        let mut transport = Transport::new(RATE);
        transport.play();
        transport.seek(10.0);
        transport.skip_forward();
        assert!(!transport.is_playing());
        assert!(!transport.has_audio());
        assert_eq!(transport.current_position(), 0.0);
    }

    #[test]
    fn test_seek_clamps_to_track() {
        let mut transport = loaded(60.0);
        for time in [-5.0, 1e12, f64::NAN, f64::INFINITY, f64::NEG_INFINITY, 30.0] {
            transport.seek(time);
            let position = transport.current_position();
            assert!((0.0..=60.0).contains(&position), "{time} -> {position}");
        }
        transport.seek(f64::NAN);
        assert_eq!(transport.current_position(), 0.0);
        transport.seek(1e12);
        assert_eq!(transport.current_position(), 60.0);
    }

    #[test]
    fn test_seek_before_load_stays_at_zero() {
        let mut transport = Transport::new(RATE);
        transport.attach(Some(SourceId::next()));
        transport.seek(12.0);
        assert_eq!(transport.current_position(), 0.0);
        assert_eq!(transport.duration(), 0.0);
    }

    #[test]
    fn test_skip_steps_are_clamped() {
        let mut transport = loaded(10.0);
        transport.skip_back();
        assert_eq!(transport.current_position(), 0.0);
        transport.skip_forward();
        assert_eq!(transport.current_position(), 3.0);
        transport.seek(9.0);
        transport.skip_forward();
        assert_eq!(transport.current_position(), 10.0);
    }

    #[test]
    fn test_rate_cycle_returns_to_default_after_five() {
        let mut transport = Transport::new(RATE);
        assert_eq!(transport.playback_rate(), 1.0);
        let mut seen = Vec::new();
        for _ in 0..5 {
            transport.cycle_playback_rate();
            seen.push(transport.playback_rate());
        }
        assert_eq!(seen, vec![1.25, 1.5, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn test_rate_snaps_to_allowed_values() {
        let mut transport = Transport::new(RATE);
        transport.set_playback_rate(0.8);
        assert_eq!(transport.playback_rate(), 0.75);
        transport.set_playback_rate(9.0);
        assert_eq!(transport.playback_rate(), 1.5);
        transport.set_playback_rate(f64::NAN);
        assert_eq!(transport.playback_rate(), 1.0);
    }

    #[test]
    fn test_render_advances_by_rate() {
        let mut transport = loaded(10.0);
        transport.set_playback_rate(1.5);
        transport.play();
        let mut block = vec![StereoSample::silence(); 1000];
        transport.render(&mut block);
        assert!((transport.current_position() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_end_of_track_stops_playback() {
        let mut transport = loaded(1.0);
        transport.play();
        let mut block = vec![StereoSample::mono(1.0); 1500];
        assert!(transport.render(&mut block));
        assert!(!transport.is_playing());
        assert_eq!(transport.current_position(), 1.0);
        assert_eq!(block[1499], StereoSample::silence());

        // Playing again from the end restarts the track
        transport.play();
        assert_eq!(transport.current_position(), 0.0);
    }

    #[test]
    fn test_play_run_changes_on_restart() {
        let mut transport = loaded(5.0);
        assert_eq!(transport.play_run(), None);
        transport.play();
        let first = transport.play_run().unwrap();
        transport.play();
        assert_eq!(transport.play_run(), Some(first));
        transport.pause();
        transport.play();
        assert_ne!(transport.play_run(), Some(first));
    }

    #[test]
    fn test_attach_resets_and_stops() {
        let mut transport = loaded(5.0);
        transport.seek(2.0);
        transport.play();
        transport.attach(None);
        assert!(!transport.is_playing());
        assert_eq!(transport.current_position(), 0.0);
        assert_eq!(transport.duration(), 0.0);
    }

    #[test]
    fn test_stale_load_is_ignored() {
        let mut transport = Transport::new(RATE);
        let old = SourceId::next();
        transport.attach(Some(old));
        transport.attach(Some(SourceId::next()));
        let clip = AudioClip::new(StereoBuffer::silence(100), RATE);
        assert!(!transport.source_ready(old, Shared::new(&gc_handle(), clip)));
        assert!(!transport.is_loaded());
    }

    #[test]
    fn test_frames_until_accounts_for_rate() {
        let mut transport = loaded(10.0);
        transport.set_playback_rate(0.5);
        assert_eq!(transport.frames_until(2.0), None);
        transport.play();
        assert_eq!(transport.frames_until(2.0), Some(4000));
        assert_eq!(transport.frames_until(-1.0), Some(0));
    }
}
