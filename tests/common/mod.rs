//! Shared test utilities: fake devices and a fake transport

#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use lumina_live::audio::{
    AudioInput, AudioOutput, BufferId, CaptureSession, EncodedFrame, FrameSink, OutputSink,
};
use lumina_live::config::{AudioConfig, LiveConfig};
use lumina_live::live::{
    Connector, SendOutcome, Transport, TransportEvent, TransportEvents, TransportState,
};
use lumina_live::session::{Devices, VoiceSession};
use lumina_live::{Error, Result};

fn lock<T>(state: &Arc<Mutex<T>>) -> MutexGuard<'_, T> {
    state.lock().expect("test state poisoned")
}

// -- microphone ---------------------------------------------------------------

#[derive(Default)]
pub struct InputState {
    pub deny: bool,
    pub opens: usize,
    pub starts: usize,
    pub stops: usize,
    pub enabled: bool,
    pub enabled_calls: Vec<bool>,
    pub sink: Option<FrameSink>,
}

#[derive(Clone, Default)]
pub struct FakeInput {
    pub state: Arc<Mutex<InputState>>,
}

impl FakeInput {
    pub fn denied() -> Self {
        let input = Self::default();
        lock(&input.state).deny = true;
        input
    }

    pub fn state(&self) -> MutexGuard<'_, InputState> {
        lock(&self.state)
    }

    /// Push one frame through the registered sink, as the hardware would
    ///
    /// Returns false if nothing is capturing.
    pub fn deliver(&self, frame: Vec<f32>) -> bool {
        let sink = self.state().sink.take();
        let Some(mut sink) = sink else {
            return false;
        };
        sink(frame);
        let mut state = self.state();
        if state.starts > state.stops {
            state.sink = Some(sink);
        }
        true
    }
}

impl AudioInput for FakeInput {
    fn open(&self, _sample_rate: u32, _frame_size: usize) -> Result<Box<dyn CaptureSession>> {
        let mut state = self.state();
        state.opens += 1;
        if state.deny {
            return Err(Error::DeviceUnavailable("permission denied".to_string()));
        }
        state.enabled = true;
        Ok(Box::new(FakeCapture {
            state: Arc::clone(&self.state),
            capturing: false,
        }))
    }
}

struct FakeCapture {
    state: Arc<Mutex<InputState>>,
    capturing: bool,
}

impl CaptureSession for FakeCapture {
    fn start(&mut self, sink: FrameSink) -> Result<()> {
        let mut state = lock(&self.state);
        state.starts += 1;
        state.sink = Some(sink);
        self.capturing = true;
        Ok(())
    }

    fn set_enabled(&self, enabled: bool) {
        let mut state = lock(&self.state);
        state.enabled = enabled;
        state.enabled_calls.push(enabled);
    }

    fn is_enabled(&self) -> bool {
        lock(&self.state).enabled
    }

    fn stop(&mut self) {
        if self.capturing {
            let mut state = lock(&self.state);
            state.stops += 1;
            state.sink = None;
            self.capturing = false;
        }
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }
}

// -- speakers -----------------------------------------------------------------

pub struct ClockState {
    pub rate: u32,
    pub now: u64,
    /// Frames the clock moves between `now()` and `schedule`, as a render callback would
    pub render_gap: u64,
    pub opens: usize,
    pub closes: usize,
    pub next_id: u64,
    /// (id, start, len)
    pub scheduled: Vec<(BufferId, u64, usize)>,
    pub stopped: Vec<BufferId>,
}

impl Default for ClockState {
    fn default() -> Self {
        Self {
            rate: 24_000,
            now: 0,
            render_gap: 0,
            opens: 0,
            closes: 0,
            next_id: 0,
            scheduled: Vec::new(),
            stopped: Vec::new(),
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeOutput {
    pub state: Arc<Mutex<ClockState>>,
}

impl FakeOutput {
    /// Speakers whose clock runs at `rate`
    pub fn at_rate(rate: u32) -> Self {
        let output = Self::default();
        output.state().rate = rate;
        output
    }

    pub fn state(&self) -> MutexGuard<'_, ClockState> {
        lock(&self.state)
    }

    pub fn set_now(&self, now: u64) {
        self.state().now = now;
    }

    /// A sink sharing this output's clock
    pub fn sink(&self) -> Box<dyn OutputSink> {
        Box::new(FakeSink {
            state: Arc::clone(&self.state),
            closed: false,
        })
    }
}

impl AudioOutput for FakeOutput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputSink>> {
        assert_eq!(sample_rate, 24_000);
        self.state().opens += 1;
        Ok(self.sink())
    }
}

struct FakeSink {
    state: Arc<Mutex<ClockState>>,
    closed: bool,
}

impl OutputSink for FakeSink {
    fn sample_rate(&self) -> u32 {
        lock(&self.state).rate
    }

    fn now(&self) -> u64 {
        lock(&self.state).now
    }

    fn schedule(&mut self, start: u64, samples: Arc<[f32]>) -> (BufferId, u64) {
        let mut state = lock(&self.state);
        state.now += state.render_gap;
        let start = start.max(state.now);
        let id = BufferId(state.next_id);
        state.next_id += 1;
        state.scheduled.push((id, start, samples.len()));
        (id, start)
    }

    fn stop(&mut self, id: BufferId) {
        lock(&self.state).stopped.push(id);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            lock(&self.state).closes += 1;
        }
    }
}

// -- transport ----------------------------------------------------------------

pub struct ConnectorState {
    pub fail: bool,
    pub connects: usize,
    pub closes: usize,
    pub transport: TransportState,
    pub sent: Vec<EncodedFrame>,
    pub events: Option<TransportEvents>,
    pub config: Option<LiveConfig>,
}

impl Default for ConnectorState {
    fn default() -> Self {
        Self {
            fail: false,
            connects: 0,
            closes: 0,
            transport: TransportState::Connecting,
            sent: Vec::new(),
            events: None,
            config: None,
        }
    }
}

#[derive(Clone, Default)]
pub struct FakeConnector {
    pub state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    pub fn state(&self) -> MutexGuard<'_, ConnectorState> {
        lock(&self.state)
    }

    /// Mark the transport open, as the remote accepting the session would
    pub fn accept(&self) {
        self.state().transport = TransportState::Open;
    }

    /// Deliver an event the way the connection task would
    pub fn emit(&self, event: TransportEvent) {
        let events = {
            let mut state = self.state();
            match &event {
                TransportEvent::Open => state.transport = TransportState::Open,
                TransportEvent::Closed { .. } => state.transport = TransportState::Closed,
                TransportEvent::Error(_) => state.transport = TransportState::Errored,
                _ => {}
            }
            state.events.clone()
        };
        if let Some(events) = events {
            let _ = events.send(event);
        }
    }
}

impl Connector for FakeConnector {
    fn connect(&self, config: &LiveConfig, events: TransportEvents) -> Result<Box<dyn Transport>> {
        let mut state = self.state();
        state.connects += 1;
        if state.fail {
            return Err(Error::Transport("refused".to_string()));
        }
        state.events = Some(events);
        state.config = Some(config.clone());
        Ok(Box::new(FakeTransport {
            state: Arc::clone(&self.state),
        }))
    }
}

struct FakeTransport {
    state: Arc<Mutex<ConnectorState>>,
}

impl Transport for FakeTransport {
    fn state(&self) -> TransportState {
        lock(&self.state).transport
    }

    fn send(&self, frame: EncodedFrame) -> SendOutcome {
        let mut state = lock(&self.state);
        match state.transport {
            TransportState::Connecting => SendOutcome::NotOpen,
            TransportState::Open => {
                state.sent.push(frame);
                SendOutcome::Sent
            }
            TransportState::Closed | TransportState::Errored => SendOutcome::Stale,
        }
    }

    fn close(&mut self) {
        let mut state = lock(&self.state);
        state.closes += 1;
        if !state.transport.is_terminal() {
            state.transport = TransportState::Closed;
        }
    }
}

// -- harness ------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct Harness {
    pub input: FakeInput,
    pub output: FakeOutput,
    pub connector: FakeConnector,
}

impl Harness {
    pub fn with_input(input: FakeInput) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn devices(&self) -> Devices {
        Devices {
            input: Arc::new(self.input.clone()),
            output: Arc::new(self.output.clone()),
            connector: Arc::new(self.connector.clone()),
        }
    }

    pub fn session(&self) -> VoiceSession {
        VoiceSession::new(LiveConfig::default(), AudioConfig::default(), self.devices())
    }

    /// A session that has been opened and accepted by the remote
    pub fn connected_session(&self) -> VoiceSession {
        let mut session = self.session();
        session.open();
        self.connector.accept();
        session.handle_event(TransportEvent::Open.into());
        session
    }
}

/// Base64 PCM16 chunk of `len` samples at a constant level
pub fn speech_chunk(len: usize, level: f32) -> String {
    lumina_live::audio::encode_frame(&vec![level; len], 24_000).data
}

/// Server message carrying one inline audio chunk
pub fn audio_message(data: &str) -> String {
    format!(
        r#"{{"serverContent":{{"modelTurn":{{"parts":[{{"inlineData":{{"mimeType":"audio/pcm;rate=24000","data":"{data}"}}}}]}}}}}}"#
    )
}

/// Poll `condition` until it holds or a second passes
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
