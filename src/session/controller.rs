//! Session lifecycle controller
//!
//! Owns every resource of one voice session and is the only place session state
//! changes. Capture, transport and UI all feed events into one loop.
//!
//! ```text
//!  mic ──CaptureFrame──▶ ┌────────────┐ ──send──▶ Transport ──▶ model
//!  UI  ──Command───────▶ │ VoiceSession│
//!  model ──Transport───▶ └────────────┘ ──enqueue──▶ Playback ──▶ speakers
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::Instrument;
use uuid::Uuid;

use super::event::{Command, SessionEvent, SessionHandle};
use super::status::{StatusSnapshot, VoiceStatus};
use crate::audio::{
    AudioInput, AudioOutput, CaptureSession, CpalInput, CpalOutput, FrameSink,
    PlaybackScheduler, encode_frame,
};
use crate::config::{AudioConfig, Config, LiveConfig};
use crate::live::{Connector, LiveConnector, SendOutcome, Transport, TransportEvent};
use crate::{Error, Result};

/// External collaborators a session acquires resources from
#[derive(Clone)]
pub struct Devices {
    pub input: Arc<dyn AudioInput>,
    pub output: Arc<dyn AudioOutput>,
    pub connector: Arc<dyn Connector>,
}

impl Devices {
    /// Default microphone, default speakers, Gemini Live transport
    ///
    /// # Errors
    ///
    /// Returns error if no API key is configured
    pub fn system(config: &Config) -> Result<Self> {
        let api_key = config.api_key()?;
        Ok(Self {
            input: Arc::new(CpalInput),
            output: Arc::new(CpalOutput),
            connector: Arc::new(LiveConnector::new(
                api_key,
                config.audio.outbound_queue_frames,
            )),
        })
    }
}

/// Resources held by a session, released together
#[derive(Default)]
struct Resources {
    capture: Option<Box<dyn CaptureSession>>,
    playback: Option<PlaybackScheduler>,
    transport: Option<Box<dyn Transport>>,
}

impl Resources {
    /// Release everything still held. Safe in any state, including twice.
    fn release(&mut self) {
        let held = !self.is_empty();

        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        if let Some(mut playback) = self.playback.take() {
            playback.close();
        }
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }

        if held {
            tracing::debug!("session resources released");
        }
    }

    const fn is_empty(&self) -> bool {
        self.capture.is_none() && self.playback.is_none() && self.transport.is_none()
    }
}

impl Drop for Resources {
    fn drop(&mut self) {
        self.release();
    }
}

/// One voice conversation with the remote model
///
/// Single use: after `Error` or `Disconnected`, retrying means building a new one.
pub struct VoiceSession {
    id: Uuid,
    live: LiveConfig,
    audio: AudioConfig,
    devices: Devices,

    status: VoiceStatus,
    error: Option<String>,
    mic_enabled: bool,
    close_requested: bool,
    opened: bool,

    resources: Resources,

    events_tx: mpsc::UnboundedSender<SessionEvent>,
    events_rx: mpsc::UnboundedReceiver<SessionEvent>,
    transport_tx: mpsc::UnboundedSender<TransportEvent>,
    transport_rx: mpsc::UnboundedReceiver<TransportEvent>,
    status_tx: watch::Sender<StatusSnapshot>,
}

impl VoiceSession {
    #[must_use]
    pub fn new(live: LiveConfig, audio: AudioConfig, devices: Devices) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (transport_tx, transport_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = watch::channel(StatusSnapshot::default());

        Self {
            id: Uuid::new_v4(),
            live,
            audio,
            devices,
            status: VoiceStatus::Connecting,
            error: None,
            mic_enabled: true,
            close_requested: false,
            opened: false,
            resources: Resources::default(),
            events_tx,
            events_rx,
            transport_tx,
            transport_rx,
            status_tx,
        }
    }

    /// Build a session from loaded configuration
    #[must_use]
    pub fn from_config(config: &Config, devices: Devices) -> Self {
        Self::new(config.live.clone(), config.audio, devices)
    }

    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub const fn status(&self) -> VoiceStatus {
        self.status
    }

    /// User-facing message, set only in `Error`
    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }

    #[must_use]
    pub const fn mic_enabled(&self) -> bool {
        self.mic_enabled
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            error: self.error.clone(),
            mic_enabled: self.mic_enabled,
        }
    }

    /// Handle for sending commands and observing status
    #[must_use]
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            events: self.events_tx.clone(),
            status: self.status_tx.subscribe(),
        }
    }

    /// Playback scheduler, present while the session holds the output device
    #[must_use]
    pub const fn playback(&self) -> Option<&PlaybackScheduler> {
        self.resources.playback.as_ref()
    }

    /// True once capture, playback and transport are all released
    #[must_use]
    pub const fn resources_released(&self) -> bool {
        self.resources.is_empty()
    }

    /// Acquire output, microphone and transport, in that order
    ///
    /// Failure moves the session to `Error` with everything released.
    pub fn open(&mut self) {
        if self.opened || self.status.is_terminal() {
            tracing::warn!(session = %self.id, status = %self.status, "session already used");
            return;
        }

        self.opened = true;
        self.status = VoiceStatus::Connecting;
        self.error = None;
        self.publish();

        tracing::info!(session = %self.id, model = %self.live.model, "opening voice session");

        if let Err(e) = self.acquire() {
            self.fail(&e);
        }
    }

    fn acquire(&mut self) -> Result<()> {
        let sink = self.devices.output.open(self.audio.playback_sample_rate)?;
        self.resources.playback = Some(PlaybackScheduler::new(sink));

        let capture = self
            .devices
            .input
            .open(self.audio.capture_sample_rate, self.audio.frame_size)?;
        self.resources.capture = Some(capture);

        let transport = self
            .devices
            .connector
            .connect(&self.live, self.transport_tx.clone())?;
        self.resources.transport = Some(transport);

        Ok(())
    }

    /// User hangup: release everything. Safe from any state, including twice.
    pub fn close(&mut self) {
        self.close_requested = true;
        self.resources.release();

        if !self.status.is_terminal() {
            tracing::info!(session = %self.id, "voice session closed");
            self.status = VoiceStatus::Disconnected;
        }
        self.publish();
    }

    /// Flip whether captured audio is transmitted; only while connected
    ///
    /// Returns true if the toggle applied.
    pub fn toggle_mic(&mut self) -> bool {
        if self.status != VoiceStatus::Connected {
            tracing::debug!(status = %self.status, "mic toggle ignored");
            return false;
        }
        let Some(capture) = self.resources.capture.as_ref() else {
            return false;
        };

        self.mic_enabled = !self.mic_enabled;
        capture.set_enabled(self.mic_enabled);
        tracing::info!(session = %self.id, mic_enabled = self.mic_enabled, "microphone toggled");
        self.publish();
        true
    }

    /// Apply one event
    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Transport(event) => self.on_transport(event),
            SessionEvent::CaptureFrame(samples) => self.on_capture_frame(&samples),
            SessionEvent::Command(Command::ToggleMic) => {
                self.toggle_mic();
            }
            SessionEvent::Command(Command::Close) => self.close(),
        }
    }

    /// Open if needed, then process events until the session ends
    pub async fn run(mut self) -> StatusSnapshot {
        let span = tracing::info_span!("voice_session", id = %self.id);

        async move {
            if !self.opened {
                self.open();
            }

            while !self.status.is_terminal() {
                let event = tokio::select! {
                    Some(event) = self.transport_rx.recv() => SessionEvent::Transport(event),
                    Some(event) = self.events_rx.recv() => event,
                    else => break,
                };
                self.handle_event(event);
            }

            self.snapshot()
        }
        .instrument(span)
        .await
    }

    fn on_transport(&mut self, event: TransportEvent) {
        if self.status.is_terminal() {
            tracing::trace!(?event, "ignoring transport event after session end");
            return;
        }

        match event {
            TransportEvent::Open => self.on_open(),
            TransportEvent::AudioChunk { turn, data } => self.on_audio_chunk(turn, &data),
            TransportEvent::Interrupted { turn } => {
                tracing::debug!(turn, "response interrupted");
                if let Some(playback) = self.resources.playback.as_mut() {
                    playback.interrupt(turn);
                }
            }
            TransportEvent::TurnComplete { turn } => {
                tracing::debug!(turn, "response turn complete");
            }
            TransportEvent::Closed { reason } => self.on_remote_close(reason),
            TransportEvent::Error(reason) => self.fail(&Error::Transport(reason)),
        }
    }

    fn on_open(&mut self) {
        if self.status != VoiceStatus::Connecting {
            tracing::warn!(status = %self.status, "duplicate open ignored");
            return;
        }

        self.status = VoiceStatus::Connected;
        self.publish();
        tracing::info!(session = %self.id, "voice session connected");

        let events = self.events_tx.clone();
        let sink: FrameSink = Box::new(move |frame| {
            let _ = events.send(SessionEvent::CaptureFrame(frame));
        });

        let Some(capture) = self.resources.capture.as_mut() else {
            self.fail(&Error::DeviceUnavailable(
                "microphone released before open".to_string(),
            ));
            return;
        };

        capture.set_enabled(self.mic_enabled);
        if let Err(e) = capture.start(sink) {
            self.fail(&e);
        }
    }

    fn on_capture_frame(&self, samples: &[f32]) {
        if self.status != VoiceStatus::Connected {
            return;
        }
        let capturing = self
            .resources
            .capture
            .as_ref()
            .is_some_and(|c| c.is_capturing());
        let Some(transport) = self.resources.transport.as_ref() else {
            return;
        };
        if !capturing {
            return;
        }

        let frame = encode_frame(samples, self.audio.capture_sample_rate);
        match transport.send(frame) {
            SendOutcome::Sent => {}
            SendOutcome::Displaced => {
                tracing::debug!("outbound queue full, dropped oldest frame");
            }
            outcome @ (SendOutcome::NotOpen | SendOutcome::Stale) => {
                tracing::trace!(?outcome, "capture frame dropped");
            }
        }
    }

    fn on_audio_chunk(&mut self, turn: u64, data: &str) {
        let Some(playback) = self.resources.playback.as_mut() else {
            return;
        };

        let Err(e) = playback.enqueue_encoded(turn, data) else {
            return;
        };
        if e.is_recoverable() {
            tracing::debug!(error = %e, turn, "dropping malformed audio chunk");
        } else {
            self.fail(&e);
        }
    }

    fn on_remote_close(&mut self, reason: Option<String>) {
        if self.close_requested {
            return;
        }

        match self.status {
            VoiceStatus::Connected => {
                tracing::info!(session = %self.id, reason = ?reason, "remote ended the session");
                self.status = VoiceStatus::Disconnected;
                self.resources.release();
                self.publish();
            }
            VoiceStatus::Connecting => {
                let detail = reason.unwrap_or_else(|| "no reason given".to_string());
                self.fail(&Error::Transport(format!(
                    "connection closed before the session opened: {detail}"
                )));
            }
            VoiceStatus::Error | VoiceStatus::Disconnected => {}
        }
    }

    fn fail(&mut self, err: &Error) {
        tracing::error!(session = %self.id, error = %err, "voice session failed");
        self.error = Some(err.user_message().to_string());
        self.status = VoiceStatus::Error;
        self.resources.release();
        self.publish();
    }

    fn publish(&self) {
        self.status_tx.send_replace(self.snapshot());
    }
}
