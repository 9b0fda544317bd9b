//! Common types for Tapenote
//!
//! Stereo sample/buffer handling shared by the transport, the take voices
//! and the device backends, plus the decoded clip type both of them read from.

use std::ops::{Index, IndexMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default output sample rate (48kHz)
/// The actual rate is negotiated with the output device at startup.
pub const SAMPLE_RATE: u32 = 48000;

/// Number of take slots held by the recorder
pub const TAKE_SLOTS: usize = 2;

/// Audio sample type (32-bit float for processing)
pub type Sample = f32;

/// Time in seconds on the backing track timeline
pub type Seconds = f64;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` so `&[StereoSample]` can be viewed as interleaved
/// `&[f32]` through bytemuck when handing frames to a device.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    /// Create a new stereo sample
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Create a mono sample (same value in both channels)
    #[inline]
    pub fn mono(value: Sample) -> Self {
        Self { left: value, right: value }
    }

    /// Linear blend between two samples (`t` in 0..1)
    #[inline]
    pub fn lerp(&self, other: &Self, t: Sample) -> Self {
        Self {
            left: self.left + (other.left - self.left) * t,
            right: self.right + (other.right - self.right) * t,
        }
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

/// A buffer of stereo samples
#[derive(Debug, Clone, Default)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    /// Create a buffer from interleaved samples with any channel count
    ///
    /// Mono input is duplicated to both sides; channels past the second are dropped.
    pub fn from_interleaved(interleaved: &[Sample], channels: usize) -> Self {
        let channels = channels.max(1);
        let samples = interleaved
            .chunks_exact(channels)
            .map(|frame| match frame {
                [mono] => StereoSample::mono(*mono),
                [left, right, ..] => StereoSample::new(*left, *right),
                [] => StereoSample::silence(),
            })
            .collect();
        Self { samples }
    }

    /// Create a buffer from an existing Vec of StereoSamples
    pub fn from_vec(samples: Vec<StereoSample>) -> Self {
        Self { samples }
    }

    /// Get the number of stereo samples in the buffer
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Check if the buffer is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills any newly exposed elements with silence.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        if new_len > self.samples.len() {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    /// Get a slice of the samples
    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    /// Get a mutable slice of the samples
    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    /// Get an iterator over the samples
    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

/// Decoded audio at its native sample rate
///
/// Used for both the backing track and decoded takes. Reads are done at a
/// fractional frame position so callers can play it back at any output rate.
#[derive(Debug, Clone)]
pub struct AudioClip {
    frames: StereoBuffer,
    sample_rate: u32,
}

impl AudioClip {
    pub fn new(frames: StereoBuffer, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate: sample_rate.max(1),
        }
    }

    /// Native sample rate of the clip
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames
    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Clip length in seconds
    pub fn duration(&self) -> Seconds {
        self.frames.len() as f64 / self.sample_rate as f64
    }

    /// Read a frame at a fractional position with linear interpolation
    ///
    /// Positions outside the clip read as silence.
    #[inline]
    pub fn frame_at(&self, position: f64) -> StereoSample {
        if position < 0.0 {
            return StereoSample::silence();
        }
        let index = position.floor() as usize;
        let Some(current) = self.frames.as_slice().get(index) else {
            return StereoSample::silence();
        };
        let frac = (position - index as f64) as Sample;
        match self.frames.as_slice().get(index + 1) {
            Some(next) if frac > 0.0 => current.lerp(next, frac),
            _ => *current,
        }
    }

    /// Raw frames
    pub fn frames(&self) -> &StereoBuffer {
        &self.frames
    }
}

/// Identity of one attached audio source instance
///
/// Every attach of a backing track gets a fresh id, so "the same source"
/// means the same instance, not the same bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

static NEXT_SOURCE_ID: AtomicU64 = AtomicU64::new(1);

impl SourceId {
    /// Allocate a new, process-unique source id
    pub fn next() -> Self {
        Self(NEXT_SOURCE_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw value (0 is never allocated and is used as "none" in atomics)
    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stereo_sample_operations() {
        let a = StereoSample::new(1.0, 2.0);
        let b = StereoSample::new(0.5, 0.5);

        let sum = a + b;
        assert_eq!(sum.left, 1.5);
        assert_eq!(sum.right, 2.5);

        let scaled = a * 0.5;
        assert_eq!(scaled.left, 0.5);
        assert_eq!(scaled.right, 1.0);
    }

    #[test]
    fn test_buffer_from_mono_interleaved() {
        let buffer = StereoBuffer::from_interleaved(&[0.25, -0.5], 1);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[1], StereoSample::mono(-0.5));
    }

    #[test]
    fn test_buffer_from_multichannel_drops_extra_channels() {
        let buffer = StereoBuffer::from_interleaved(&[1.0, 2.0, 9.0, 3.0, 4.0, 9.0], 3);
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer[1], StereoSample::new(3.0, 4.0));
    }

    #[test]
    fn test_clip_interpolates_between_frames() {
        let clip = AudioClip::new(StereoBuffer::from_interleaved(&[0.0, 1.0], 1), 2);
        assert_eq!(clip.duration(), 1.0);
        assert!((clip.frame_at(0.5).left - 0.5).abs() < 1e-6);
        assert_eq!(clip.frame_at(-1.0), StereoSample::silence());
        assert_eq!(clip.frame_at(5.0), StereoSample::silence());
    }

    #[test]
    fn test_source_ids_are_unique() {
        assert_ne!(SourceId::next(), SourceId::next());
    }
}
