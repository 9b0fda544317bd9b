//! Take mixer
//!
//! Plays recorded takes alongside the backing track:
//!
//! - **Auto-trigger**: while the transport plays, a take starts when the
//!   playhead enters `[start_time, start_time + duration)`, at the matching
//!   offset inside the take. Each take fires at most once per play run.
//! - **Manual preview**: one take at a time, from its beginning.
//! - **Takes on/off**: a single gain on the take bus; muting also stops every
//!   playing take.
//!
//! The mix graph is only built on first need (a source attached or a take
//! arriving) and is torn down by [`TakeMixer::close`].

mod graph;

use std::sync::Arc;

use basedrop::Shared;

pub use graph::{MixError, MixGraph, VoiceInfo, VoiceKind};

use crate::codec::DecodeError;
use crate::decoder::{DecodeService, DecodeTarget};
use crate::recorder::TakeSlots;
use crate::transport::{Transport, POSITION_EPSILON};
use crate::types::{AudioClip, Seconds, SourceId, StereoSample, TAKE_SLOTS};

/// A take ready to play
#[derive(Clone)]
pub struct DecodedTake {
    pub clip: Shared<AudioClip>,
    pub start_time: Seconds,
}

impl DecodedTake {
    pub fn duration(&self) -> Seconds {
        self.clip.duration()
    }

    /// Whether `position` falls inside this take's span on the timeline
    pub fn covers(&self, position: Seconds) -> bool {
        position >= self.start_time - POSITION_EPSILON
            && position < self.start_time + self.duration()
    }
}

/// Mixer for the transport and up to two takes
pub struct TakeMixer {
    output_rate: u32,
    graph: Option<MixGraph>,
    decoded: [Option<DecodedTake>; TAKE_SLOTS],
    /// Slot revision each decoded (or pending) take belongs to
    revisions: [u64; TAKE_SLOTS],
    /// Start time recorded for the pending decode of each slot
    anchors: [Seconds; TAKE_SLOTS],
    /// Takes already auto-triggered in the current play run
    triggered: [bool; TAKE_SLOTS],
    /// Play run last observed (None = transport paused)
    current_run: Option<u64>,
    takes_enabled: bool,
    manual_slot: Option<usize>,
    take_count: usize,
}

impl TakeMixer {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            graph: None,
            decoded: Default::default(),
            revisions: [0; TAKE_SLOTS],
            anchors: [0.0; TAKE_SLOTS],
            triggered: [false; TAKE_SLOTS],
            current_run: None,
            takes_enabled: true,
            manual_slot: None,
            take_count: 0,
        }
    }

    fn ensure_graph(&mut self) -> &mut MixGraph {
        let takes_enabled = self.takes_enabled;
        let output_rate = self.output_rate;
        self.graph.get_or_insert_with(|| {
            let mut graph = MixGraph::new(output_rate);
            graph.set_take_gain(if takes_enabled { 1.0 } else { 0.0 });
            graph
        })
    }

    /// Route the transport's current source through the graph
    ///
    /// Attaching the same source again is a logged no-op.
    pub fn attach_source(&mut self, source: Option<SourceId>) {
        let Some(source) = source else {
            return;
        };
        match self.ensure_graph().connect_source(source) {
            Ok(()) => log::debug!("Mixer: Connected source {}", source.raw()),
            Err(MixError::AlreadyConnected(id)) => {
                log::debug!("Mixer: Source {} already connected", id)
            }
            Err(e) => log::warn!("Mixer: Could not connect source: {}", e),
        }
    }

    /// Bring decoded takes in line with the recorder's slots
    ///
    /// Changed slots drop their old audio and are queued for decoding.
    pub fn sync_takes(&mut self, slots: &TakeSlots, decoder: &DecodeService) {
        for slot in 0..TAKE_SLOTS {
            let revision = slots.revision(slot);
            if revision == self.revisions[slot] {
                continue;
            }
            self.revisions[slot] = revision;
            self.decoded[slot] = None;
            self.triggered[slot] = false;
            self.stop_slot(slot);

            if let Some(take) = slots.get(slot) {
                self.anchors[slot] = take.start_time;
                self.ensure_graph();
                decoder.submit(
                    DecodeTarget::Take { slot, revision },
                    Arc::clone(&take.payload),
                );
            }
        }
        self.take_count = (0..TAKE_SLOTS).filter(|&s| slots.get(s).is_some()).count();
    }

    /// Accept a finished take decode
    ///
    /// Results for a revision the slot has moved past are dropped. A failed
    /// decode leaves the slot silent.
    pub fn install_decoded(
        &mut self,
        slot: usize,
        revision: u64,
        result: Result<Shared<AudioClip>, DecodeError>,
    ) {
        if slot >= TAKE_SLOTS || self.revisions[slot] != revision {
            log::debug!("Mixer: Dropping stale decode for slot {}", slot);
            return;
        }
        match result {
            Ok(clip) => {
                log::info!(
                    "Mixer: Take {} ready ({:.2}s at {:.3}s)",
                    slot,
                    clip.duration(),
                    self.anchors[slot]
                );
                self.decoded[slot] = Some(DecodedTake {
                    clip,
                    start_time: self.anchors[slot],
                });
            }
            Err(e) => {
                log::error!("Mixer: Failed to decode take {}: {}", slot, e);
                self.decoded[slot] = None;
            }
        }
    }

    /// Follow the transport
    ///
    /// `run` is the transport's play run (None while paused). A new run
    /// re-arms every take; pausing stops takes that were auto-triggered.
    /// Takes whose span contains `position` start at the matching offset.
    pub fn on_position(&mut self, position: Seconds, run: Option<u64>) {
        let Some(run) = run else {
            if self.current_run.take().is_some() {
                self.stop_auto_voices();
            }
            return;
        };
        if self.current_run != Some(run) {
            self.triggered = [false; TAKE_SLOTS];
            self.stop_auto_voices();
            self.current_run = Some(run);
        }

        if !self.takes_enabled {
            return;
        }

        for slot in 0..TAKE_SLOTS {
            if self.triggered[slot] {
                continue;
            }
            let Some(take) = self.decoded[slot].clone() else {
                continue;
            };
            if !take.covers(position) {
                continue;
            }
            let offset = (position - take.start_time).max(0.0);
            self.triggered[slot] = true;
            if let Err(e) = self
                .ensure_graph()
                .start_voice(slot, VoiceKind::Auto, take.clip, offset)
            {
                log::warn!("Mixer: Could not start take {}: {}", slot, e);
            } else {
                log::debug!("Mixer: Take {} triggered at offset {:.3}s", slot, offset);
            }
        }
    }

    /// Output frames until the transport reaches the next take still waiting
    /// to be triggered in this run
    ///
    /// Renderers split their block here so a take starts on the frame the
    /// playhead reaches its start time. Call after [`TakeMixer::on_position`]
    /// for the current position.
    pub fn frames_until_next_take(&self, transport: &Transport) -> Option<usize> {
        if !self.takes_enabled || transport.play_run() != self.current_run {
            return None;
        }
        let position = transport.current_position();
        (0..TAKE_SLOTS)
            .filter(|&slot| !self.triggered[slot])
            .filter_map(|slot| self.decoded[slot].as_ref())
            .filter(|take| take.start_time > position + POSITION_EPSILON)
            .filter_map(|take| transport.frames_until(take.start_time))
            .min()
    }

    fn stop_auto_voices(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.stop_voices(|_, kind| kind == VoiceKind::Auto);
        }
    }

    fn stop_slot(&mut self, slot: usize) {
        if let Some(graph) = self.graph.as_mut() {
            graph.stop_voices(|s, _| s == slot);
        }
        if self.manual_slot == Some(slot) {
            self.manual_slot = None;
        }
    }

    // --- Manual preview ---

    /// Play one take from its beginning, replacing any manual preview
    ///
    /// Returns false if the slot has no decoded take.
    pub fn play_take(&mut self, slot: usize) -> bool {
        let Some(take) = self.decoded.get(slot).cloned().flatten() else {
            return false;
        };
        self.stop_take();
        match self
            .ensure_graph()
            .start_voice(slot, VoiceKind::Manual, take.clip, 0.0)
        {
            Ok(()) => {
                self.manual_slot = Some(slot);
                log::debug!("Mixer: Previewing take {}", slot);
                true
            }
            Err(e) => {
                log::warn!("Mixer: Could not preview take {}: {}", slot, e);
                false
            }
        }
    }

    /// Stop the manual preview
    pub fn stop_take(&mut self) {
        if let Some(graph) = self.graph.as_mut() {
            graph.stop_voices(|_, kind| kind == VoiceKind::Manual);
        }
        self.manual_slot = None;
    }

    /// Stop the preview if one is playing, otherwise preview a take
    ///
    /// `preferred` is tried first, then the other slots in order.
    pub fn toggle_take(&mut self, preferred: Option<usize>) {
        if self.manual_slot.is_some() {
            self.stop_take();
            return;
        }
        let order = preferred
            .into_iter()
            .chain(0..TAKE_SLOTS)
            .filter(|&slot| slot < TAKE_SLOTS);
        for slot in order {
            if self.play_take(slot) {
                return;
            }
        }
    }

    // --- Takes on/off ---

    pub fn set_takes_enabled(&mut self, enabled: bool) {
        self.takes_enabled = enabled;
        if let Some(graph) = self.graph.as_mut() {
            graph.set_take_gain(if enabled { 1.0 } else { 0.0 });
            if !enabled {
                graph.stop_voices(|_, _| true);
            }
        }
        if !enabled {
            self.manual_slot = None;
        }
        log::info!("Mixer: Takes {}", if enabled { "on" } else { "off" });
    }

    pub fn toggle_takes_enabled(&mut self) {
        self.set_takes_enabled(!self.takes_enabled);
    }

    // --- Rendering ---

    /// Mix the rendered transport block and playing takes into `out`
    pub fn mix(&mut self, transport: &[StereoSample], out: &mut [StereoSample]) {
        match self.graph.as_mut() {
            Some(graph) => {
                graph.mix(transport, out);
                if self.manual_slot.is_some() && !graph.has_voice(VoiceKind::Manual) {
                    self.manual_slot = None;
                }
            }
            None => out.copy_from_slice(&transport[..out.len()]),
        }
    }

    /// Stop all voices and drop the graph
    ///
    /// Safe to call with no graph or no playing voices.
    pub fn close(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.close();
        }
        self.manual_slot = None;
        self.current_run = None;
    }

    // --- Observables ---

    pub fn takes_enabled(&self) -> bool {
        self.takes_enabled
    }

    /// Takes stored by the recorder (decoded or not)
    pub fn take_count(&self) -> usize {
        self.take_count
    }

    pub fn has_takes(&self) -> bool {
        self.take_count > 0
    }

    pub fn is_decoded(&self, slot: usize) -> bool {
        self.decoded.get(slot).is_some_and(Option::is_some)
    }

    pub fn decoded_take(&self, slot: usize) -> Option<&DecodedTake> {
        self.decoded.get(slot).and_then(Option::as_ref)
    }

    /// Whether a manual preview is playing
    pub fn manual_voice_playing(&self) -> bool {
        self.manual_slot.is_some()
    }

    pub fn manual_slot(&self) -> Option<usize> {
        self.manual_slot
    }

    /// Whether any take (auto or manual) is sounding
    pub fn any_voice_playing(&self) -> bool {
        self.graph
            .as_ref()
            .is_some_and(|g| g.has_voice(VoiceKind::Auto) || g.has_voice(VoiceKind::Manual))
    }

    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.graph.as_ref().map(MixGraph::voices).unwrap_or_default()
    }

    pub fn graph(&self) -> Option<&MixGraph> {
        self.graph.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;
    use crate::testing::tone_clip;

    const RATE: u32 = 1000;

    fn mixer_with_take(slot: usize, start: Seconds, seconds: f64) -> TakeMixer {
        let mut mixer = TakeMixer::new(RATE);
        mixer.revisions[slot] = 1;
        mixer.anchors[slot] = start;
        let clip = Shared::new(&gc_handle(), tone_clip(seconds, RATE, 0.5));
        mixer.install_decoded(slot, 1, Ok(clip));
        mixer
    }

    #[test]
    fn test_auto_trigger_fires_once_per_run() {
        let mut mixer = mixer_with_take(0, 30.0, 5.0);

        mixer.on_position(29.9, Some(1));
        assert!(mixer.voices().is_empty());

        mixer.on_position(30.0, Some(1));
        assert_eq!(mixer.voices().len(), 1);
        assert_eq!(mixer.voices()[0].kind, VoiceKind::Auto);

        mixer.on_position(31.0, Some(1));
        assert_eq!(mixer.voices().len(), 1);
    }

    #[test]
    fn test_auto_trigger_starts_at_offset() {
        let mut mixer = mixer_with_take(0, 30.0, 5.0);
        mixer.on_position(32.0, None);
        mixer.on_position(32.0, Some(1));

        let voices = mixer.voices();
        assert_eq!(voices.len(), 1);
        assert!((voices[0].position - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_new_play_run_retriggers() {
        let mut mixer = mixer_with_take(1, 10.0, 2.0);
        mixer.on_position(10.5, Some(1));
        mixer.on_position(11.0, None);
        assert!(mixer.voices().is_empty());

        mixer.on_position(10.5, Some(2));
        assert_eq!(mixer.voices().len(), 1);
    }

    #[test]
    fn test_restart_without_observed_pause_retriggers() {
        let mut mixer = mixer_with_take(0, 8.0, 4.0);
        mixer.on_position(8.5, Some(1));
        mixer.on_position(8.0, Some(2));
        let voices = mixer.voices();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].position, 0.0);
    }

    #[test]
    fn test_outside_span_does_not_trigger() {
        let mut mixer = mixer_with_take(0, 30.0, 5.0);
        mixer.on_position(35.0, Some(1));
        mixer.on_position(12.0, Some(1));
        assert!(mixer.voices().is_empty());
    }

    #[test]
    fn test_muted_takes_do_not_trigger_until_unmuted() {
        let mut mixer = mixer_with_take(0, 30.0, 5.0);
        mixer.set_takes_enabled(false);
        mixer.on_position(31.0, Some(1));
        assert!(mixer.voices().is_empty());

        mixer.set_takes_enabled(true);
        mixer.on_position(31.5, Some(1));
        assert!((mixer.voices()[0].position - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_muting_stops_playing_takes() {
        let mut mixer = mixer_with_take(0, 0.0, 5.0);
        assert!(mixer.play_take(0));
        mixer.on_position(1.0, Some(1));
        assert_eq!(mixer.voices().len(), 2);

        mixer.toggle_takes_enabled();
        assert!(!mixer.takes_enabled());
        assert!(mixer.voices().is_empty());
        assert!(!mixer.manual_voice_playing());
        assert_eq!(mixer.graph().unwrap().take_gain(), 0.0);
    }

    #[test]
    fn test_only_one_manual_preview() {
        let mut mixer = mixer_with_take(0, 0.0, 5.0);
        mixer.revisions[1] = 1;
        mixer.install_decoded(1, 1, Ok(Shared::new(&gc_handle(), tone_clip(1.0, RATE, 0.1))));

        assert!(mixer.play_take(0));
        assert!(mixer.play_take(1));
        let voices = mixer.voices();
        assert_eq!(voices.len(), 1);
        assert_eq!(voices[0].slot, 1);
        assert_eq!(mixer.manual_slot(), Some(1));
    }

    #[test]
    fn test_toggle_take_prefers_given_slot() {
        let mut mixer = mixer_with_take(1, 0.0, 5.0);
        mixer.toggle_take(Some(0));
        assert_eq!(mixer.manual_slot(), Some(1));

        mixer.toggle_take(Some(0));
        assert!(!mixer.manual_voice_playing());
        assert!(mixer.voices().is_empty());
    }

    #[test]
    fn test_play_missing_take_is_noop() {
        let mut mixer = TakeMixer::new(RATE);
        assert!(!mixer.play_take(0));
        assert!(!mixer.play_take(7));
        mixer.toggle_take(None);
        assert!(!mixer.manual_voice_playing());
    }

    #[test]
    fn test_manual_preview_ends_naturally() {
        let mut mixer = mixer_with_take(0, 0.0, 0.1);
        mixer.play_take(0);
        let transport = vec![StereoSample::silence(); 200];
        let mut out = vec![StereoSample::silence(); 200];
        mixer.mix(&transport, &mut out);
        assert!(!mixer.manual_voice_playing());
    }

    #[test]
    fn test_stale_decode_is_dropped() {
        let mut mixer = TakeMixer::new(RATE);
        mixer.revisions[0] = 2;
        let clip = Shared::new(&gc_handle(), tone_clip(1.0, RATE, 0.5));
        mixer.install_decoded(0, 1, Ok(clip));
        assert!(!mixer.is_decoded(0));
    }

    #[test]
    fn test_failed_decode_leaves_slot_empty() {
        let mut mixer = mixer_with_take(0, 0.0, 1.0);
        mixer.install_decoded(0, 1, Err(DecodeError::Empty));
        assert!(!mixer.is_decoded(0));
    }

    #[test]
    fn test_attach_same_source_twice_connects_once() {
        let mut mixer = TakeMixer::new(RATE);
        let id = SourceId::next();
        mixer.attach_source(Some(id));
        mixer.attach_source(Some(id));
        let graph = mixer.graph().unwrap();
        assert_eq!(graph.connection_count(), 1);
        assert_eq!(graph.connected_source(), Some(id));
    }

    #[test]
    fn test_graph_is_lazy_and_passes_transport_through() {
        let mut mixer = TakeMixer::new(RATE);
        assert!(mixer.graph().is_none());
        let transport = vec![StereoSample::mono(0.3); 8];
        let mut out = vec![StereoSample::silence(); 8];
        mixer.mix(&transport, &mut out);
        assert_eq!(out, transport);
    }

    #[test]
    fn test_close_without_voices() {
        let mut mixer = TakeMixer::new(RATE);
        mixer.close();
        let mut mixer = mixer_with_take(0, 0.0, 1.0);
        mixer.play_take(0);
        mixer.close();
        mixer.close();
        assert!(mixer.graph().is_none());
        assert!(!mixer.manual_voice_playing());
    }
}
