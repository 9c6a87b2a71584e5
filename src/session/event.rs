//! Events consumed by the session controller

use tokio::sync::{mpsc, watch};

use super::status::StatusSnapshot;
use crate::live::TransportEvent;

/// User actions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    ToggleMic,
    Close,
}

/// Everything the controller reacts to
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Transport(TransportEvent),
    /// One fixed-size frame of microphone samples
    CaptureFrame(Vec<f32>),
    Command(Command),
}

impl From<TransportEvent> for SessionEvent {
    fn from(event: TransportEvent) -> Self {
        Self::Transport(event)
    }
}

impl From<Command> for SessionEvent {
    fn from(command: Command) -> Self {
        Self::Command(command)
    }
}

/// Cloneable handle for driving a running session from the UI
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub(crate) events: mpsc::UnboundedSender<SessionEvent>,
    pub(crate) status: watch::Receiver<StatusSnapshot>,
}

impl SessionHandle {
    pub fn toggle_mic(&self) {
        let _ = self.events.send(Command::ToggleMic.into());
    }

    pub fn close(&self) {
        let _ = self.events.send(Command::Close.into());
    }

    /// Latest published status
    #[must_use]
    pub fn status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Wait for the next status change; `None` once the session is gone
    pub async fn changed(&mut self) -> Option<StatusSnapshot> {
        self.status.changed().await.ok()?;
        Some(self.status.borrow_and_update().clone())
    }
}
