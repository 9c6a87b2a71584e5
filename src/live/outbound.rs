//! Bounded outbound frame queue
//!
//! Capture pushes without waiting; when the queue is full the oldest frame is
//! discarded so queued audio never grows past `capacity` frames of latency.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

use crate::audio::EncodedFrame;

/// Result of pushing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after dropping the oldest frame
    Displaced,
    /// Queue already closed; frame dropped
    Closed,
}

/// Drop-oldest queue between capture and the websocket writer
#[derive(Debug)]
pub struct OutboundQueue {
    frames: Mutex<VecDeque<EncodedFrame>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
}

impl OutboundQueue {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            frames: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    pub fn push(&self, frame: EncodedFrame) -> PushOutcome {
        if self.is_closed() {
            return PushOutcome::Closed;
        }

        let Ok(mut frames) = self.frames.lock() else {
            return PushOutcome::Closed;
        };

        let outcome = if frames.len() >= self.capacity {
            frames.pop_front();
            PushOutcome::Displaced
        } else {
            PushOutcome::Queued
        };
        frames.push_back(frame);
        drop(frames);

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next frame; `None` once the queue is closed
    pub async fn pop(&self) -> Option<EncodedFrame> {
        loop {
            if self.is_closed() {
                return None;
            }
            if let Some(frame) = self.frames.lock().ok().and_then(|mut f| f.pop_front()) {
                return Some(frame);
            }
            self.notify.notified().await;
        }
    }

    /// Close the queue and discard pending frames. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Ok(mut frames) = self.frames.lock() {
            frames.clear();
        }
        self.notify.notify_one();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.frames.lock().map(|f| f.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
