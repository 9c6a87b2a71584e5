//! PCM16 codec
//!
//! Converts between float samples, little-endian 16-bit PCM and the base64 text
//! carried by the realtime protocol.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Scale applied to negative samples (two's-complement minimum)
const NEGATIVE_SCALE: f32 = 32768.0;

/// Scale applied to non-negative samples
const POSITIVE_SCALE: f32 = 32767.0;

/// Immutable chunk of mono PCM16 audio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFrame {
    samples: Arc<[i16]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioFrame {
    /// Create a mono frame from PCM16 samples
    pub fn new(samples: impl Into<Arc<[i16]>>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into(),
            sample_rate,
            channels: 1,
        }
    }

    /// Quantize float samples into a frame
    #[must_use]
    pub fn from_f32(samples: &[f32], sample_rate: u32) -> Self {
        let pcm: Vec<i16> = samples.iter().map(|&s| float_to_pcm16(s)).collect();
        Self::new(pcm, sample_rate)
    }

    /// Reinterpret little-endian bytes as PCM16
    ///
    /// # Errors
    ///
    /// Returns `DecodeAnomaly` if the byte count is odd
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Result<Self> {
        if bytes.len() % 2 != 0 {
            return Err(Error::DecodeAnomaly(format!(
                "odd PCM16 payload length: {} bytes",
                bytes.len()
            )));
        }

        let pcm: Vec<i16> = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Ok(Self::new(pcm, sample_rate))
    }

    #[must_use]
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[must_use]
    pub const fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples in the frame
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback duration at the frame's sample rate
    #[must_use]
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        #[allow(clippy::cast_precision_loss)]
        let secs = self.samples.len() as f64 / f64::from(self.sample_rate);
        Duration::from_secs_f64(secs)
    }

    /// Serialize as little-endian bytes
    #[must_use]
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.samples.len() * 2);
        for sample in self.samples.iter() {
            bytes.extend_from_slice(&sample.to_le_bytes());
        }
        bytes
    }

    /// Rescale to float samples in [-1, 1]
    #[must_use]
    pub fn to_f32(&self) -> Vec<f32> {
        self.samples.iter().map(|&s| pcm16_to_float(s)).collect()
    }
}

/// Encoded frame ready for the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedFrame {
    /// e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
    /// Base64 of the little-endian PCM16 bytes
    pub data: String,
}

/// MIME type for raw PCM16 at a given rate
#[must_use]
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={sample_rate}")
}

/// Convert one float sample to PCM16
///
/// Input is clamped to [-1, 1]; negatives scale by 32768, the rest by 32767.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn float_to_pcm16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let s = sample.clamp(-1.0, 1.0);
    let scaled = if s < 0.0 {
        s * NEGATIVE_SCALE
    } else {
        s * POSITIVE_SCALE
    };
    scaled.round() as i16
}

/// Convert one PCM16 sample back to float
///
/// Exact inverse of [`float_to_pcm16`]'s scaling.
#[must_use]
pub fn pcm16_to_float(sample: i16) -> f32 {
    if sample < 0 {
        f32::from(sample) / NEGATIVE_SCALE
    } else {
        f32::from(sample) / POSITIVE_SCALE
    }
}

/// Encode float samples into a transportable frame
#[must_use]
pub fn encode_frame(samples: &[f32], sample_rate: u32) -> EncodedFrame {
    let frame = AudioFrame::from_f32(samples, sample_rate);
    EncodedFrame {
        mime_type: pcm_mime_type(sample_rate),
        data: STANDARD.encode(frame.to_le_bytes()),
    }
}

/// Decode base64 PCM16 text into a frame
///
/// Converting the result with [`AudioFrame::to_f32`] divides negative samples by
/// 32768 and the rest by 32767, the exact inverse of [`encode_frame`], rather than
/// a uniform division by 32768.
///
/// # Errors
///
/// Returns `DecodeAnomaly` on invalid base64 or an odd byte count
pub fn decode_frame(data: &str, sample_rate: u32) -> Result<AudioFrame> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| Error::DecodeAnomaly(format!("invalid base64: {e}")))?;
    AudioFrame::from_le_bytes(&bytes, sample_rate)
}
