//! Mix graph: transport bus, take bus and the take voices feeding it
//!
//! ```text
//! transport ──► [transport gain] ──┐
//!                                  ├──► output
//! take voices ─► [take gain] ──────┘
//! ```
//!
//! Voices read their decoded take at its native rate and are resampled to the
//! output rate by linear interpolation. Takes always play at normal speed.

use basedrop::Shared;
use thiserror::Error;

use crate::types::{AudioClip, Sample, Seconds, SourceId, StereoSample};

/// Errors raised by the mix graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MixError {
    #[error("Source {0} is already connected to the mix graph")]
    AlreadyConnected(u64),

    #[error("Mix graph is closed")]
    Closed,
}

/// Why a voice is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceKind {
    /// Triggered by the transport reaching the take's start time
    Auto,
    /// Started explicitly by the user
    Manual,
}

/// A playing take
pub(crate) struct TakeVoice {
    slot: usize,
    kind: VoiceKind,
    clip: Shared<AudioClip>,
    /// Read position in clip frames
    cursor: f64,
    /// Clip frames per output frame
    step: f64,
}

impl TakeVoice {
    fn is_finished(&self) -> bool {
        self.cursor >= self.clip.len() as f64
    }
}

/// Snapshot of one voice for observers and tests
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInfo {
    pub slot: usize,
    pub kind: VoiceKind,
    /// Playback position inside the take
    pub position: Seconds,
}

/// Gain stage
#[derive(Debug, Clone, Copy)]
struct Bus {
    gain: Sample,
}

/// Audio graph the mixer owns once it is first needed
pub struct MixGraph {
    output_rate: u32,
    transport_bus: Bus,
    take_bus: Bus,
    voices: Vec<TakeVoice>,
    connected: Option<SourceId>,
    connections: usize,
    closed: bool,
}

/// Voices that can play at once (two auto plus one manual, with headroom)
const MAX_VOICES: usize = 8;

impl MixGraph {
    pub fn new(output_rate: u32) -> Self {
        log::debug!("MixGraph: Created at {} Hz", output_rate);
        Self {
            output_rate: output_rate.max(1),
            transport_bus: Bus { gain: 1.0 },
            take_bus: Bus { gain: 1.0 },
            voices: Vec::with_capacity(MAX_VOICES),
            connected: None,
            connections: 0,
            closed: false,
        }
    }

    /// Route a transport source through the transport bus
    ///
    /// A source instance can only be connected once.
    pub fn connect_source(&mut self, source: SourceId) -> Result<(), MixError> {
        if self.closed {
            return Err(MixError::Closed);
        }
        if self.connected == Some(source) {
            return Err(MixError::AlreadyConnected(source.raw()));
        }
        self.connected = Some(source);
        self.connections += 1;
        Ok(())
    }

    pub fn connected_source(&self) -> Option<SourceId> {
        self.connected
    }

    /// Number of successful source connections over the graph's life
    pub fn connection_count(&self) -> usize {
        self.connections
    }

    pub fn set_transport_gain(&mut self, gain: Sample) {
        self.transport_bus.gain = gain;
    }

    pub fn set_take_gain(&mut self, gain: Sample) {
        self.take_bus.gain = gain;
    }

    pub fn take_gain(&self) -> Sample {
        self.take_bus.gain
    }

    /// Start a take voice `offset` seconds into the clip
    pub(crate) fn start_voice(
        &mut self,
        slot: usize,
        kind: VoiceKind,
        clip: Shared<AudioClip>,
        offset: Seconds,
    ) -> Result<(), MixError> {
        if self.closed {
            return Err(MixError::Closed);
        }
        let clip_rate = clip.sample_rate() as f64;
        let voice = TakeVoice {
            slot,
            kind,
            cursor: offset.max(0.0) * clip_rate,
            step: clip_rate / self.output_rate as f64,
            clip,
        };
        if voice.is_finished() {
            return Ok(());
        }
        if self.voices.len() >= MAX_VOICES {
            log::warn!("MixGraph: Voice limit reached, dropping oldest voice");
            self.voices.remove(0);
        }
        self.voices.push(voice);
        Ok(())
    }

    /// Stop voices matching the filter; returns how many were stopped
    pub(crate) fn stop_voices(&mut self, mut filter: impl FnMut(usize, VoiceKind) -> bool) -> usize {
        let before = self.voices.len();
        self.voices.retain(|v| !filter(v.slot, v.kind));
        before - self.voices.len()
    }

    pub fn voices(&self) -> Vec<VoiceInfo> {
        self.voices
            .iter()
            .map(|v| VoiceInfo {
                slot: v.slot,
                kind: v.kind,
                position: v.cursor / v.clip.sample_rate() as f64,
            })
            .collect()
    }

    pub fn has_voice(&self, kind: VoiceKind) -> bool {
        self.voices.iter().any(|v| v.kind == kind)
    }

    /// Mix the transport block and all voices into `out`
    ///
    /// Finished voices are removed.
    pub fn mix(&mut self, transport: &[StereoSample], out: &mut [StereoSample]) {
        let transport_gain = self.transport_bus.gain;
        for (dst, src) in out.iter_mut().zip(transport.iter()) {
            *dst = *src * transport_gain;
        }

        let take_gain = self.take_bus.gain;
        for voice in self.voices.iter_mut() {
            for dst in out.iter_mut() {
                if voice.is_finished() {
                    break;
                }
                *dst += voice.clip.frame_at(voice.cursor) * take_gain;
                voice.cursor += voice.step;
            }
        }

        self.voices.retain(|v| !v.is_finished());
    }

    /// Stop everything and refuse further voices or connections
    pub fn close(&mut self) {
        self.voices.clear();
        self.connected = None;
        self.closed = true;
        log::debug!("MixGraph: Closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::gc_handle;
    use crate::testing::tone_clip;

    fn shared(clip: AudioClip) -> Shared<AudioClip> {
        Shared::new(&gc_handle(), clip)
    }

    #[test]
    fn test_same_source_connects_once() {
        let mut graph = MixGraph::new(1000);
        let id = SourceId::next();
        assert!(graph.connect_source(id).is_ok());
        assert_eq!(
            graph.connect_source(id),
            Err(MixError::AlreadyConnected(id.raw()))
        );
        assert_eq!(graph.connection_count(), 1);

        assert!(graph.connect_source(SourceId::next()).is_ok());
        assert_eq!(graph.connection_count(), 2);
    }

    #[test]
    fn test_voice_is_resampled_to_output_rate() {
        let mut graph = MixGraph::new(1000);
        graph
            .start_voice(0, VoiceKind::Manual, shared(tone_clip(1.0, 500, 0.5)), 0.0)
            .unwrap();

        let transport = vec![StereoSample::silence(); 400];
        let mut out = vec![StereoSample::silence(); 400];
        graph.mix(&transport, &mut out);

        assert_eq!(out[10], StereoSample::mono(0.5));
        assert!((graph.voices()[0].position - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_voice_with_offset_and_removal_at_end() {
        let mut graph = MixGraph::new(1000);
        graph
            .start_voice(1, VoiceKind::Auto, shared(tone_clip(1.0, 1000, 0.25)), 0.9)
            .unwrap();

        let transport = vec![StereoSample::mono(0.5); 200];
        let mut out = vec![StereoSample::silence(); 200];
        graph.mix(&transport, &mut out);

        assert_eq!(out[0], StereoSample::mono(0.75));
        assert_eq!(out[150], StereoSample::mono(0.5));
        assert!(graph.voices().is_empty());
    }

    #[test]
    fn test_take_gain_mutes_voices_only() {
        let mut graph = MixGraph::new(1000);
        graph.set_take_gain(0.0);
        graph
            .start_voice(0, VoiceKind::Auto, shared(tone_clip(1.0, 1000, 1.0)), 0.0)
            .unwrap();

        let transport = vec![StereoSample::mono(0.5); 10];
        let mut out = vec![StereoSample::silence(); 10];
        graph.mix(&transport, &mut out);
        assert_eq!(out[5], StereoSample::mono(0.5));
    }

    #[test]
    fn test_closed_graph_rejects_work() {
        let mut graph = MixGraph::new(1000);
        graph.close();
        graph.close();
        assert_eq!(graph.connect_source(SourceId::next()), Err(MixError::Closed));
        assert!(graph
            .start_voice(0, VoiceKind::Manual, shared(tone_clip(0.1, 1000, 1.0)), 0.0)
            .is_err());
    }
}
