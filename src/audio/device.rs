//! Device seams for capture and playback
//!
//! The cpal implementations live in `capture` and `output`; tests supply fakes.

use std::sync::Arc;

use crate::Result;

/// Consumer of captured frames, invoked once per fixed-size frame in hardware order
pub type FrameSink = Box<dyn FnMut(Vec<f32>) + Send + 'static>;

/// Source of microphone sessions
pub trait AudioInput: Send + Sync {
    /// Acquire the microphone at a mono fixed sample rate
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if permission is denied or no device exists
    fn open(&self, sample_rate: u32, frame_size: usize) -> Result<Box<dyn CaptureSession>>;
}

/// One active microphone acquisition
pub trait CaptureSession: Send {
    /// Begin delivering frames to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    fn start(&mut self, sink: FrameSink) -> Result<()>;

    /// Enable or disable the track; a disabled track delivers silence
    fn set_enabled(&self, enabled: bool);

    fn is_enabled(&self) -> bool;

    /// Release the device; no frames are delivered afterwards. Idempotent.
    fn stop(&mut self);

    fn is_capturing(&self) -> bool;
}

/// Identifies a buffer scheduled on an [`OutputSink`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

/// Source of output sinks
pub trait AudioOutput: Send + Sync {
    /// Open the output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns `DeviceUnavailable` if no suitable output device exists
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputSink>>;
}

/// Output clock plus mixer accepting buffers scheduled at absolute positions
///
/// Positions are counted in frames at [`OutputSink::sample_rate`].
pub trait OutputSink: Send {
    fn sample_rate(&self) -> u32;

    /// Current position of the playback clock
    fn now(&self) -> u64;

    /// Schedule `samples` to start playing at `start`, or at the clock if it has
    /// already passed `start`
    ///
    /// Returns the buffer id and the position it will actually start at.
    fn schedule(&mut self, start: u64, samples: Arc<[f32]>) -> (BufferId, u64);

    /// Stop a buffer that has not finished; unknown ids are ignored
    fn stop(&mut self, id: BufferId);

    /// Release the device. Idempotent.
    fn close(&mut self);
}
