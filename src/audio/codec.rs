//! # PCM Wire Encoding
//!
//! The voice service exchanges raw 16-bit little-endian PCM wrapped in base64:
//! - **Outbound**: 16kHz mono frames from the microphone, tagged `audio/pcm;rate=16000`
//! - **Inbound**: 24kHz mono chunks of synthesized speech
//!
//! Samples inside the crate are `f32` in [-1.0, 1.0].

use crate::error::{AppError, AppResult};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use byteorder::{ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};

/// One encoded media payload as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    /// Base64 of PCM16 little-endian samples
    pub data: String,
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// Decoded, playable audio.
///
/// `samples` are interleaved when `channels > 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Playback length in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Mime type for raw PCM at the given rate.
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Convert float samples to PCM16 little-endian bytes.
///
/// Input is clamped to [-1.0, 1.0] first so full-scale or clipping input saturates instead of
/// wrapping around.
pub fn encode_pcm16(samples: &[f32]) -> Vec<u8> {
    let pcm: Vec<i16> = samples
        .iter()
        .map(|&sample| {
            let clamped = if sample.is_nan() { 0.0 } else { sample.clamp(-1.0, 1.0) };
            (clamped * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
        })
        .collect();

    let mut bytes = vec![0u8; pcm.len() * 2];
    LittleEndian::write_i16_into(&pcm, &mut bytes);
    bytes
}

/// Encode one outbound frame into a wire blob.
pub fn create_blob(samples: &[f32], sample_rate: u32) -> MediaBlob {
    MediaBlob {
        data: BASE64.encode(encode_pcm16(samples)),
        mime_type: pcm_mime_type(sample_rate),
    }
}

/// Decode PCM16 little-endian bytes into a playable buffer.
pub fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> AppResult<AudioBuffer> {
    if bytes.len() % 2 != 0 {
        return Err(AppError::Processing(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    let mut pcm = vec![0i16; bytes.len() / 2];
    LittleEndian::read_i16_into(bytes, &mut pcm);

    let samples = pcm.iter().map(|&sample| sample as f32 / 32768.0).collect();
    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

/// Decode a base64 inbound chunk straight into a playable buffer.
pub fn decode_chunk(data: &str, sample_rate: u32, channels: u16) -> AppResult<AudioBuffer> {
    let bytes = BASE64.decode(data)?;
    decode_pcm16(&bytes, sample_rate, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_saturates_instead_of_wrapping() {
        let bytes = encode_pcm16(&[1.0, -1.0, 2.0, 0.0]);
        let mut pcm = vec![0i16; 4];
        LittleEndian::read_i16_into(&bytes, &mut pcm);
        assert_eq!(pcm, vec![i16::MAX, i16::MIN, i16::MAX, 0]);
    }

    #[test]
    fn test_blob_carries_rate_in_mime_type() {
        let blob = create_blob(&[0.0; 8], 16000);
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        assert_eq!(BASE64.decode(&blob.data).unwrap().len(), 16);
    }

    #[test]
    fn test_decode_duration_at_output_rate() {
        let bytes = vec![0u8; 24000 * 2];
        let buffer = decode_pcm16(&bytes, 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 24000);
        assert!((buffer.duration() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_rejects_odd_length() {
        let err = decode_pcm16(&[0u8; 3], 24000, 1).unwrap_err();
        assert_eq!(err.kind(), "processing_error");
    }

    #[test]
    fn test_decode_chunk_rejects_bad_base64() {
        assert!(decode_chunk("not base64!", 24000, 1).is_err());
    }

    #[test]
    fn test_decode_chunk_scales_samples() {
        let mut bytes = vec![0u8; 4];
        LittleEndian::write_i16_into(&[16384, -32768], &mut bytes);
        let buffer = decode_chunk(&BASE64.encode(bytes), 24000, 1).unwrap();
        assert_eq!(buffer.samples, vec![0.5, -1.0]);
    }

    #[test]
    fn test_blob_serializes_camel_case() {
        let blob = create_blob(&[0.0], 16000);
        let json = serde_json::to_value(&blob).unwrap();
        assert_eq!(json["mimeType"], "audio/pcm;rate=16000");
        assert!(json.get("data").is_some());
    }
}
