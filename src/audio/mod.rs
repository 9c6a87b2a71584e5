//! Audio pipeline
//!
//! PCM16 codec, microphone capture, and scheduled gap-free playback.
//! Devices sit behind the traits in [`device`] so the pipeline runs without hardware.

mod capture;
mod codec;
pub mod device;
mod output;
mod playback;

pub use capture::{CpalInput, Framer};
pub use codec::{
    AudioFrame, EncodedFrame, decode_frame, encode_frame, float_to_pcm16, pcm16_to_float,
    pcm_mime_type,
};
pub use device::{AudioInput, AudioOutput, BufferId, CaptureSession, FrameSink, OutputSink};
pub use output::{CpalOutput, Mixer};
pub use playback::{PlaybackScheduler, Scheduled};

/// Sample rate for microphone frames (16kHz for speech)
pub const CAPTURE_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech from the remote model
pub const PLAYBACK_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured frame
pub const FRAME_SIZE: usize = 4096;
