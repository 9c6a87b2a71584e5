//! Audio capture from microphone

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::device::{AudioInput, CaptureSession, FrameSink};
use crate::{Error, Result};

/// Splits the hardware's variable-size callbacks into fixed-size frames
#[derive(Debug)]
pub struct Framer {
    frame_size: usize,
    pending: Vec<f32>,
}

impl Framer {
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append samples, emitting every completed frame in order
    pub fn push(&mut self, mut data: &[f32], mut emit: impl FnMut(Vec<f32>)) {
        while !data.is_empty() {
            let take = (self.frame_size - self.pending.len()).min(data.len());
            self.pending.extend_from_slice(&data[..take]);
            data = &data[take..];

            if self.pending.len() == self.frame_size {
                let frame = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                emit(frame);
            }
        }
    }

    /// Samples held back waiting for a full frame
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub const fn frame_size(&self) -> usize {
        self.frame_size
    }
}

/// Microphone input on the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl AudioInput for CpalInput {
    fn open(&self, sample_rate: u32, frame_size: usize) -> Result<Box<dyn CaptureSession>> {
        let config = input_config(sample_rate)?;
        Ok(Box::new(CpalCapture {
            config,
            frame_size,
            enabled: Arc::new(AtomicBool::new(true)),
            active: Arc::new(AtomicBool::new(false)),
            worker: None,
        }))
    }
}

/// Find a mono config at `sample_rate` on the default input device
fn input_config(sample_rate: u32) -> Result<StreamConfig> {
    let host = cpal::default_host();

    let device = host
        .default_input_device()
        .ok_or_else(|| Error::DeviceUnavailable("no input device available".to_string()))?;

    let supported_config = device
        .supported_input_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .ok_or_else(|| Error::DeviceUnavailable("no suitable audio config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio capture initialized"
    );

    Ok(config)
}

/// Thread owning the cpal input stream until told to stop
struct CaptureWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

/// Captures framed audio from the default input device
struct CpalCapture {
    config: StreamConfig,
    frame_size: usize,
    enabled: Arc<AtomicBool>,
    active: Arc<AtomicBool>,
    worker: Option<CaptureWorker>,
}

impl CaptureSession for CpalCapture {
    fn start(&mut self, mut sink: FrameSink) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }

        let config = self.config.clone();
        let frame_size = self.frame_size;
        let enabled = Arc::clone(&self.enabled);
        let active = Arc::clone(&self.active);
        active.store(true, Ordering::Release);

        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let thread = std::thread::Builder::new()
            .name("lumina-capture".to_string())
            .spawn(move || {
                let mut framer = Framer::new(frame_size);
                let callback_active = Arc::clone(&active);

                let stream = cpal::default_host()
                    .default_input_device()
                    .ok_or_else(|| Error::DeviceUnavailable("no input device".to_string()))
                    .and_then(|device| {
                        device
                            .build_input_stream(
                                &config,
                                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                                    if !callback_active.load(Ordering::Acquire) {
                                        return;
                                    }
                                    let live = enabled.load(Ordering::Relaxed);
                                    framer.push(data, |mut frame| {
                                        if !live {
                                            frame.fill(0.0);
                                        }
                                        sink(frame);
                                    });
                                },
                                |err| {
                                    tracing::error!(error = %err, "audio capture error");
                                },
                                None,
                            )
                            .map_err(|e| Error::Audio(e.to_string()))
                    })
                    .and_then(|stream| {
                        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
                        Ok(stream)
                    });

                match stream {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        // Returns on stop or when the sender is dropped
                        let _ = stop_rx.recv();
                        active.store(false, Ordering::Release);
                        drop(stream);
                    }
                    Err(e) => {
                        active.store(false, Ordering::Release);
                        let _ = ready_tx.send(Err(e));
                    }
                }
            })?;

        let started = ready_rx
            .recv()
            .unwrap_or_else(|_| Err(Error::Audio("capture thread exited".to_string())));

        match started {
            Ok(()) => {
                self.worker = Some(CaptureWorker { stop_tx, thread });
                tracing::debug!(frame_size, "audio capture started");
                Ok(())
            }
            Err(e) => {
                let _ = thread.join();
                Err(e)
            }
        }
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
        tracing::debug!(enabled, "microphone track toggled");
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn stop(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.thread.join().is_err() {
                tracing::warn!("capture thread panicked");
            }
            tracing::debug!("audio capture stopped");
        }
    }

    fn is_capturing(&self) -> bool {
        self.worker.is_some()
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        self.stop();
    }
}
