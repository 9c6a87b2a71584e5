//! Gap-free playback scheduling
//!
//! Inbound frames are placed on the output clock back-to-back. Each buffer starts
//! at `max(cursor, now)` and the cursor advances by its length, so buffers keep
//! arrival order, never overlap, and are never scheduled in the past.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use super::PLAYBACK_SAMPLE_RATE;
use super::codec::{AudioFrame, decode_frame};
use super::device::{BufferId, OutputSink};
use crate::{Error, Result};

/// A buffer placed on the output clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scheduled {
    pub id: BufferId,
    /// First frame on the output clock
    pub start: u64,
    /// One past the last frame
    pub end: u64,
    /// Turn the buffer belongs to
    pub turn: u64,
}

impl Scheduled {
    #[must_use]
    pub const fn len(&self) -> u64 {
        self.end - self.start
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.end == self.start
    }
}

/// Schedules decoded speech on a shared output clock
pub struct PlaybackScheduler {
    sink: Box<dyn OutputSink>,
    cursor: u64,
    pending: VecDeque<Scheduled>,
    /// Chunks tagged with an older turn were superseded by an interruption
    first_live_turn: u64,
    closed: bool,
}

impl PlaybackScheduler {
    #[must_use]
    pub fn new(sink: Box<dyn OutputSink>) -> Self {
        let cursor = sink.now();
        Self {
            sink,
            cursor,
            pending: VecDeque::new(),
            first_live_turn: 0,
            closed: false,
        }
    }

    /// Output clock rate; inbound frames must match it
    #[must_use]
    pub fn sample_rate(&self) -> u32 {
        self.sink.sample_rate()
    }

    /// Position where the next buffer would start if the clock stood still
    #[must_use]
    pub const fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Current output clock position
    #[must_use]
    pub fn now(&self) -> u64 {
        self.sink.now()
    }

    /// Scheduled buffers that have not finished
    #[must_use]
    pub fn pending(&self) -> &VecDeque<Scheduled> {
        &self.pending
    }

    /// Drop finished buffers from the pending set
    pub fn reap(&mut self) -> usize {
        let now = self.sink.now();
        let before = self.pending.len();
        self.pending.retain(|s| s.end > now);
        before - self.pending.len()
    }

    /// Schedule a frame of the current turn
    ///
    /// # Errors
    ///
    /// Returns `DecodeAnomaly` if the frame rate doesn't match the output clock
    pub fn enqueue(&mut self, frame: &AudioFrame) -> Result<Option<Scheduled>> {
        self.enqueue_turn(self.first_live_turn, frame)
    }

    /// Schedule a frame tagged with `turn`
    ///
    /// Returns `Ok(None)` for empty frames, superseded turns, or after close.
    ///
    /// # Errors
    ///
    /// Returns `DecodeAnomaly` if the frame rate doesn't match the output clock
    pub fn enqueue_turn(&mut self, turn: u64, frame: &AudioFrame) -> Result<Option<Scheduled>> {
        if self.closed {
            return Ok(None);
        }

        if turn < self.first_live_turn {
            tracing::debug!(
                turn,
                first_live_turn = self.first_live_turn,
                "dropping chunk from superseded turn"
            );
            return Ok(None);
        }

        if frame.sample_rate() != self.sink.sample_rate() {
            return Err(Error::DecodeAnomaly(format!(
                "frame rate {} does not match output rate {}",
                frame.sample_rate(),
                self.sink.sample_rate()
            )));
        }

        if frame.is_empty() {
            return Ok(None);
        }

        self.reap();

        let samples: Arc<[f32]> = frame.to_f32().into();
        let len = samples.len() as u64;
        let now = self.sink.now();

        // the clock may move between `now()` and `schedule`; the sink reports where it landed
        let (id, start) = self.sink.schedule(self.cursor.max(now), samples);
        let end = start + len;
        self.cursor = end;

        let scheduled = Scheduled {
            id,
            start,
            end,
            turn,
        };
        self.pending.push_back(scheduled);

        tracing::trace!(start, end, now, turn, "scheduled playback buffer");
        Ok(Some(scheduled))
    }

    /// Decode a base64 PCM16 chunk and schedule it
    ///
    /// # Errors
    ///
    /// Returns `DecodeAnomaly` on a malformed payload, or when the output clock does
    /// not run at the inbound wire rate; the queue is unaffected
    pub fn enqueue_encoded(&mut self, turn: u64, data: &str) -> Result<Option<Scheduled>> {
        let frame = decode_frame(data, PLAYBACK_SAMPLE_RATE)?;
        self.enqueue_turn(turn, &frame)
    }

    /// Stop every unfinished buffer and reset the cursor to the clock
    pub fn flush(&mut self) {
        let stopped = self.pending.len();
        for scheduled in self.pending.drain(..) {
            self.sink.stop(scheduled.id);
        }
        self.cursor = self.sink.now();

        if stopped > 0 {
            tracing::debug!(stopped, "playback flushed");
        }
    }

    /// Flush and discard any later chunk of `turn` or earlier
    pub fn interrupt(&mut self, turn: u64) {
        self.first_live_turn = self.first_live_turn.max(turn + 1);
        self.flush();
    }

    /// Time still queued ahead of the clock
    #[must_use]
    pub fn queued_duration(&self) -> Duration {
        let rate = self.sink.sample_rate();
        if rate == 0 {
            return Duration::ZERO;
        }
        let ahead = self.cursor.saturating_sub(self.sink.now());
        #[allow(clippy::cast_precision_loss)]
        Duration::from_secs_f64(ahead as f64 / f64::from(rate))
    }

    /// Flush and release the output device. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.flush();
        self.sink.close();
        self.closed = true;
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        self.close();
    }
}
