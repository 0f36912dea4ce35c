//! 16-bit PCM framing for the live stream.
//!
//! Outbound: microphone blocks of `f32` samples become little-endian `i16`
//! bytes tagged `audio/pcm;rate=16000`. Inbound: base64 payloads of the same
//! encoding (24kHz) become `f32` samples for playback.

use base64::Engine;

use crate::error::{LiveError, Result};

/// Microphone capture rate expected by the remote endpoint.
pub const INPUT_SAMPLE_RATE: u32 = 16000;

/// Rate of the audio the remote endpoint sends back.
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Samples per capture block handed to the encoder.
pub const CAPTURE_BLOCK_SIZE: usize = 4096;

/// Descriptor attached to every outbound frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Wire-ready encoding of one captured block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// Little-endian i16 PCM bytes
    pub data: Vec<u8>,
    pub mime_type: &'static str,
}

impl EncodedFrame {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }

    pub fn sample_count(&self) -> usize {
        self.data.len() / 2
    }
}

/// Encode a block of samples nominally in [-1.0, 1.0].
///
/// Samples are clamped, negative values scale by 32768 and non-negative
/// values by 32767. NaN encodes as silence.
pub fn encode_frame(samples: &[f32]) -> EncodedFrame {
    let data: Vec<u8> = samples
        .iter()
        .flat_map(|&s| sample_to_i16(s).to_le_bytes())
        .collect();

    EncodedFrame {
        data,
        mime_type: INPUT_MIME_TYPE,
    }
}

fn sample_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Decode little-endian i16 PCM bytes into `f32` samples in [-1.0, 1.0).
pub fn decode_pcm16(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.is_empty() {
        return Err(LiveError::decode("empty audio payload"));
    }
    if bytes.len() % 2 != 0 {
        return Err(LiveError::decode(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect())
}

/// Decode a base64 inbound audio payload into playable samples.
pub fn decode_base64_pcm16(payload: &str) -> Result<Vec<f32>> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| LiveError::decode(format!("invalid base64 audio: {}", e)))?;
    decode_pcm16(&bytes)
}
