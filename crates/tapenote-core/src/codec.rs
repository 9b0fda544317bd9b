//! Encoding captured takes and decoding audio payloads
//!
//! Takes are captured as little-endian i16 PCM chunks and stored as WAV
//! (hound). Anything that comes back in, takes or backing tracks, is decoded
//! with symphonia into an [`AudioClip`] at its native rate.

use std::io::Cursor;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::types::{AudioClip, StereoBuffer};

/// Shape of the raw PCM a microphone delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureFormat {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Bytes per interleaved frame of i16 PCM
    pub fn frame_bytes(&self) -> usize {
        self.channels as usize * 2
    }
}

/// Errors turning bytes into audio or audio into bytes
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("No audio track in payload")]
    NoTrack,

    #[error("Payload decoded to zero frames")]
    Empty,

    #[error("WAV encoding failed: {0}")]
    Encode(#[from] hound::Error),
}

/// Assemble captured i16 LE chunks into a WAV payload
///
/// A trailing odd byte (a split sample) is dropped.
pub fn encode_take(chunks: &[Vec<u8>], format: CaptureFormat) -> Result<Vec<u8>, DecodeError> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        let bytes = chunks.iter().flat_map(|chunk| chunk.iter().copied());
        let mut pending: Option<u8> = None;
        for byte in bytes {
            match pending.take() {
                None => pending = Some(byte),
                Some(low) => writer.write_sample(i16::from_le_bytes([low, byte]))?,
            }
        }
        // Partial frames would make hound reject the file on finalize
        let samples = writer.len() as usize;
        let channels = format.channels as usize;
        for _ in 0..(channels - samples % channels) % channels {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

/// Decode a complete audio payload (WAV, FLAC, MP3, ...) into a clip
pub fn decode_clip(bytes: &[u8]) -> Result<AudioClip, DecodeError> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(DecodeError::NoTrack)?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::UnsupportedFormat(e.to_string()))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                log::warn!("Codec: Error reading packet: {}", e);
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("Codec: Skipping bad packet: {}", e);
                continue;
            }
            Err(e) => return Err(DecodeError::UnsupportedFormat(e.to_string())),
        };

        if sample_buf.is_none() {
            let spec = *decoded.spec();
            sample_rate = sample_rate.or(Some(spec.rate));
            channels = spec.channels.count();
            sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
        }

        if let Some(buf) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    let sample_rate = sample_rate
        .ok_or_else(|| DecodeError::UnsupportedFormat("Unknown sample rate".to_string()))?;

    let frames = StereoBuffer::from_interleaved(&samples, channels);
    if frames.is_empty() {
        return Err(DecodeError::Empty);
    }

    log::debug!(
        "Codec: Decoded {} frames at {} Hz ({} ch)",
        frames.len(),
        sample_rate,
        channels
    );
    Ok(AudioClip::new(frames, sample_rate))
}

/// Encode float stereo frames as a 16-bit WAV payload
///
/// Samples are clamped to [-1, 1] before quantising.
pub fn encode_clip(clip: &AudioClip) -> Result<Vec<u8>, DecodeError> {
    let pcm: Vec<u8> = clip
        .frames()
        .as_interleaved()
        .iter()
        .flat_map(|s| ((s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16).to_le_bytes())
        .collect();
    encode_take(&[pcm], CaptureFormat::new(clip.sample_rate(), 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    fn pcm(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn test_take_chunks_decode_back() {
        let format = CaptureFormat::new(8000, 1);
        let chunks = vec![pcm(&[0, 16384]), pcm(&[-16384, 0])];
        let wav = encode_take(&chunks, format).unwrap();

        let clip = decode_clip(&wav).unwrap();
        assert_eq!(clip.sample_rate(), 8000);
        assert_eq!(clip.len(), 4);
        assert!((clip.frames()[1].left - 0.5).abs() < 1e-3);
        assert_eq!(clip.frames()[1].left, clip.frames()[1].right);
    }

    #[test]
    fn test_chunk_boundary_splitting_a_sample() {
        let format = CaptureFormat::new(8000, 1);
        let bytes = pcm(&[1000, 2000, 3000]);
        let chunks = vec![bytes[..3].to_vec(), bytes[3..].to_vec()];
        let wav = encode_take(&chunks, format).unwrap();

        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        let samples: Vec<i16> = reader.into_samples().map(|s| s.unwrap()).collect();
        assert_eq!(samples, vec![1000, 2000, 3000]);
    }

    #[test]
    fn test_partial_stereo_frame_is_padded() {
        let format = CaptureFormat::new(8000, 2);
        let wav = encode_take(&[pcm(&[10, 20, 30])], format).unwrap();
        let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.len(), 4);
    }

    #[test]
    fn test_encode_clip_keeps_rate_and_length() {
        let frames = StereoBuffer::from_vec(vec![StereoSample::new(0.25, -0.25); 480]);
        let clip = AudioClip::new(frames, 48000);
        let decoded = decode_clip(&encode_clip(&clip).unwrap()).unwrap();
        assert_eq!(decoded.len(), 480);
        assert!((decoded.duration() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_garbage_is_rejected() {
        let result = decode_clip(b"definitely not audio");
        assert!(matches!(result, Err(DecodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_empty_wav_is_rejected() {
        let wav = encode_take(&[], CaptureFormat::new(8000, 1)).unwrap();
        assert!(decode_clip(&wav).is_err());
    }
}
