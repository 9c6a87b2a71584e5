//! Realtime session transport
//!
//! One [`LiveTransport`] owns one websocket session with the remote model. Inbound
//! traffic is translated into [`TransportEvent`]s on a channel; outbound frames go
//! through a bounded [`OutboundQueue`] drained by the connection task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use super::outbound::{OutboundQueue, PushOutcome};
use super::protocol::{ClientMessage, ServerMessage};
use crate::audio::EncodedFrame;
use crate::config::LiveConfig;
use crate::{Error, Result};

/// Lifecycle of one transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TransportState {
    Connecting = 0,
    Open = 1,
    Closed = 2,
    Errored = 3,
}

impl TransportState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closed,
            _ => Self::Errored,
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Errored)
    }
}

/// Events delivered by a transport, in network order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Remote end accepted the session; sent exactly once
    Open,
    /// Base64 PCM16 speech belonging to `turn`
    AudioChunk { turn: u64, data: String },
    /// Server discarded its in-flight response for `turn`
    Interrupted { turn: u64 },
    /// Server finished speaking `turn`
    TurnComplete { turn: u64 },
    /// Connection ended without error
    Closed { reason: Option<String> },
    /// Connection failed
    Error(String),
}

/// Sender half handed to a transport for its events
pub type TransportEvents = mpsc::UnboundedSender<TransportEvent>;

/// Result of sending one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    /// Session not open yet; frame dropped
    NotOpen,
    /// Session already torn down; frame dropped
    Stale,
    /// Sent after the oldest queued frame was discarded
    Displaced,
}

/// Handle to one realtime session
pub trait Transport: Send {
    fn state(&self) -> TransportState;

    /// Transmit one encoded frame; never fails
    fn send(&self, frame: EncodedFrame) -> SendOutcome;

    /// Request graceful shutdown. Idempotent.
    fn close(&mut self);
}

/// Opens transport sessions
pub trait Connector: Send + Sync {
    /// Start connecting; the returned handle resolves asynchronously via `events`
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the connection cannot even be attempted
    fn connect(&self, config: &LiveConfig, events: TransportEvents) -> Result<Box<dyn Transport>>;
}

/// Assigns turn ids to inbound chunks
///
/// The id advances on `turnComplete` only. An interrupted turn is closed by a
/// later `turnComplete`, so audio trailing the interruption keeps the superseded
/// id and playback drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct TurnCounter {
    current: u64,
    interrupted: bool,
}

impl TurnCounter {
    #[must_use]
    pub const fn current(&self) -> u64 {
        self.current
    }

    /// True between an interruption and the `turnComplete` that ends that turn
    #[must_use]
    pub const fn is_interrupted(&self) -> bool {
        self.interrupted
    }

    /// Translate one server message into events
    pub fn events_for(&mut self, msg: &ServerMessage) -> Vec<TransportEvent> {
        let mut events: Vec<TransportEvent> = msg
            .audio_chunks()
            .map(|data| TransportEvent::AudioChunk {
                turn: self.current,
                data: data.to_string(),
            })
            .collect();

        if msg.is_interrupted() && !self.interrupted {
            self.interrupted = true;
            events.push(TransportEvent::Interrupted { turn: self.current });
        }

        if msg.is_turn_complete() {
            events.push(TransportEvent::TurnComplete { turn: self.current });
            self.current += 1;
            self.interrupted = false;
        }

        events
    }
}

/// State shared between the handle and the connection task
#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    outbound: OutboundQueue,
}

impl Shared {
    fn state(&self) -> TransportState {
        TransportState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move `from -> to`; false if the state was already different
    fn transition(&self, from: TransportState, to: TransportState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Enter a terminal state unless already in one
    fn finish(&self, to: TransportState) -> bool {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            if TransportState::from_u8(current).is_terminal() {
                return false;
            }
            match self.state.compare_exchange(
                current,
                to as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }
}

/// Connector for the Gemini Live websocket API
pub struct LiveConnector {
    api_key: SecretString,
    queue_frames: usize,
}

impl LiveConnector {
    #[must_use]
    pub fn new(api_key: &SecretString, queue_frames: usize) -> Self {
        Self {
            api_key: SecretString::from(api_key.expose_secret().to_owned()),
            queue_frames,
        }
    }
}

impl Connector for LiveConnector {
    fn connect(&self, config: &LiveConfig, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let url = session_url(&config.endpoint, &self.api_key)?;
        let setup = ClientMessage::setup(config);

        let shared = Arc::new(Shared {
            state: AtomicU8::new(TransportState::Connecting as u8),
            outbound: OutboundQueue::new(self.queue_frames),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            voice = %config.voice,
            "connecting realtime session"
        );

        let task = tokio::spawn(run_connection(
            url,
            setup,
            Arc::clone(&shared),
            events,
            shutdown_rx,
        ));

        Ok(Box::new(LiveTransport {
            shared,
            shutdown: shutdown_tx,
            task: Some(task),
        }))
    }
}

/// Endpoint URL with the API key attached
///
/// # Errors
///
/// Returns `Transport` if the endpoint is not a websocket URL
pub fn session_url(endpoint: &str, api_key: &SecretString) -> Result<Url> {
    let url = Url::parse_with_params(endpoint, &[("key", api_key.expose_secret())])
        .map_err(|e| Error::Transport(format!("invalid endpoint: {e}")))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::Transport(format!(
            "endpoint must be ws:// or wss://, got {other}://"
        ))),
    }
}

/// Websocket transport to the remote model
pub struct LiveTransport {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl Transport for LiveTransport {
    fn state(&self) -> TransportState {
        self.shared.state()
    }

    fn send(&self, frame: EncodedFrame) -> SendOutcome {
        match self.shared.state() {
            TransportState::Connecting => SendOutcome::NotOpen,
            TransportState::Closed | TransportState::Errored => SendOutcome::Stale,
            TransportState::Open => match self.shared.outbound.push(frame) {
                PushOutcome::Queued => SendOutcome::Sent,
                PushOutcome::Displaced => SendOutcome::Displaced,
                PushOutcome::Closed => SendOutcome::Stale,
            },
        }
    }

    fn close(&mut self) {
        if self.shared.finish(TransportState::Closed) {
            tracing::debug!("closing realtime session");
        }
        self.shared.outbound.close();
        let _ = self.shutdown.send(true);
        // The task finishes on its own after the close handshake
        self.task.take();
    }
}

impl Drop for LiveTransport {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_connection(
    url: Url,
    setup: ClientMessage,
    shared: Arc<Shared>,
    events: TransportEvents,
    shutdown: watch::Receiver<bool>,
) {
    match drive(url, setup, &shared, &events, shutdown).await {
        Ok(reason) => {
            if shared.finish(TransportState::Closed) {
                tracing::info!(reason = ?reason, "realtime session closed by remote");
                let _ = events.send(TransportEvent::Closed { reason });
            }
        }
        Err(e) => {
            shared.outbound.close();
            if shared.finish(TransportState::Errored) {
                tracing::error!(error = %e, "realtime session failed");
                let _ = events.send(TransportEvent::Error(e.to_string()));
            }
        }
    }
}

/// Run one websocket session until close, returning the close reason
async fn drive(
    url: Url,
    setup: ClientMessage,
    shared: &Shared,
    events: &TransportEvents,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Option<String>> {
    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        _ = shutdown.changed() => return Ok(None),
    };
    let (ws_stream, _) = connected.map_err(|e| Error::Transport(format!("connect: {e}")))?;
    let (mut write, mut read) = ws_stream.split();

    write
        .send(Message::Text(serde_json::to_string(&setup)?))
        .await
        .map_err(|e| Error::Transport(format!("send setup: {e}")))?;

    let mut turns = TurnCounter::default();

    loop {
        tokio::select! {
            msg = read.next() => {
                let payload = match msg {
                    Some(Ok(Message::Text(text))) => text.into_bytes(),
                    Some(Ok(Message::Binary(bytes))) => bytes,
                    Some(Ok(Message::Close(frame))) => {
                        return Ok(frame.map(|f| f.reason.to_string()));
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return Err(Error::Transport(e.to_string())),
                    None => return Ok(None),
                };

                let msg = match ServerMessage::parse(&payload) {
                    Ok(msg) => msg,
                    Err(e) => {
                        tracing::debug!(error = %e, "ignoring unparseable server message");
                        continue;
                    }
                };

                if msg.setup_complete.is_some()
                    && shared.transition(TransportState::Connecting, TransportState::Open)
                {
                    tracing::info!("realtime session open");
                    let _ = events.send(TransportEvent::Open);
                }

                if let Some(go_away) = &msg.go_away {
                    tracing::warn!(time_left = ?go_away.time_left, "server will close the session soon");
                }

                for event in turns.events_for(&msg) {
                    let _ = events.send(event);
                }
            }
            frame = shared.outbound.pop() => {
                let Some(frame) = frame else {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(None);
                };
                let text = serde_json::to_string(&ClientMessage::audio(frame))?;
                write
                    .send(Message::Text(text))
                    .await
                    .map_err(|e| Error::Transport(format!("send audio: {e}")))?;
            }
            _ = shutdown.changed() => {
                let _ = write.send(Message::Close(None)).await;
                return Ok(None);
            }
        }
    }
}
