//! Audio output to speakers
//!
//! A [`Mixer`] holds buffers scheduled at absolute frame positions. The cpal output
//! callback renders from it and advances its position, which is the playback clock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use super::device::{AudioOutput, BufferId, OutputSink};
use crate::{Error, Result};

/// A scheduled buffer inside the mixer
#[derive(Debug)]
struct Voice {
    id: BufferId,
    start: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end(&self) -> u64 {
        self.start + self.samples.len() as u64
    }
}

/// Timeline of scheduled mono buffers
#[derive(Debug, Default)]
pub struct Mixer {
    position: u64,
    next_id: u64,
    voices: Vec<Voice>,
}

impl Mixer {
    /// Frames rendered so far
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.position
    }

    /// Buffers not yet finished
    #[must_use]
    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Place a buffer at `start`, never before the current position
    ///
    /// Returns the id and the start actually used.
    pub fn schedule(&mut self, start: u64, samples: Arc<[f32]>) -> (BufferId, u64) {
        let id = BufferId(self.next_id);
        self.next_id += 1;
        let start = start.max(self.position);
        self.voices.push(Voice { id, start, samples });
        (id, start)
    }

    pub fn stop(&mut self, id: BufferId) {
        self.voices.retain(|v| v.id != id);
    }

    pub fn clear(&mut self) {
        self.voices.clear();
    }

    /// Render interleaved output, duplicating the mono signal across `channels`
    ///
    /// Finished buffers are dropped once the clock passes their end.
    pub fn render(&mut self, out: &mut [f32], channels: usize) {
        let channels = channels.max(1);

        for frame in out.chunks_mut(channels) {
            let pos = self.position;
            let mut sample = 0.0_f32;

            for voice in &self.voices {
                if pos >= voice.start && pos < voice.end() {
                    #[allow(clippy::cast_possible_truncation)]
                    let offset = (pos - voice.start) as usize;
                    sample += voice.samples[offset];
                }
            }

            let sample = sample.clamp(-1.0, 1.0);
            for out in frame.iter_mut() {
                *out = sample;
            }

            self.position += 1;
        }

        let now = self.position;
        self.voices.retain(|v| v.end() > now);
    }
}

/// Speaker output on the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalOutput;

impl AudioOutput for CpalOutput {
    fn open(&self, sample_rate: u32) -> Result<Box<dyn OutputSink>> {
        let config = output_config(sample_rate)?;
        let mixer = Arc::new(Mutex::new(Mixer::default()));
        let worker = spawn_output(config, Arc::clone(&mixer))?;

        Ok(Box::new(CpalSink {
            sample_rate,
            mixer,
            worker: Some(worker),
        }))
    }
}

/// Find a config at `sample_rate`, mono preferred, stereo as fallback
fn output_config(sample_rate: u32) -> Result<StreamConfig> {
    let host = cpal::default_host();

    let device = host
        .default_output_device()
        .ok_or_else(|| Error::DeviceUnavailable("no output device available".to_string()))?;

    let supported_config = device
        .supported_output_configs()
        .map_err(|e| Error::DeviceUnavailable(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        })
        .or_else(|| {
            // Fallback: try stereo
            device.supported_output_configs().ok()?.find(|c| {
                c.channels() == 2
                    && c.min_sample_rate() <= SampleRate(sample_rate)
                    && c.max_sample_rate() >= SampleRate(sample_rate)
            })
        })
        .ok_or_else(|| Error::DeviceUnavailable("no suitable output config found".to_string()))?;

    let config = supported_config
        .with_sample_rate(SampleRate(sample_rate))
        .config();

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels = config.channels,
        "audio playback initialized"
    );

    Ok(config)
}

/// Thread owning the cpal output stream
struct OutputWorker {
    stop_tx: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
}

fn spawn_output(config: StreamConfig, mixer: Arc<Mutex<Mixer>>) -> Result<OutputWorker> {
    let (ready_tx, ready_rx) = std_mpsc::channel::<Result<()>>();
    let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
    let running = Arc::new(AtomicBool::new(true));

    let thread = std::thread::Builder::new()
        .name("lumina-playback".to_string())
        .spawn(move || {
            let channels = config.channels as usize;
            let callback_running = Arc::clone(&running);

            let stream = cpal::default_host()
                .default_output_device()
                .ok_or_else(|| Error::DeviceUnavailable("no output device".to_string()))
                .and_then(|device| {
                    device
                        .build_output_stream(
                            &config,
                            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                                if !callback_running.load(Ordering::Acquire) {
                                    data.fill(0.0);
                                    return;
                                }
                                match mixer.lock() {
                                    Ok(mut mixer) => mixer.render(data, channels),
                                    Err(_) => data.fill(0.0),
                                }
                            },
                            |err| {
                                tracing::error!(error = %err, "audio playback error");
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
                    let _ = stop_rx.recv();
                    running.store(false, Ordering::Release);
                    drop(stream);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            }
        })?;

    match ready_rx
        .recv()
        .unwrap_or_else(|_| Err(Error::Audio("playback thread exited".to_string())))
    {
        Ok(()) => Ok(OutputWorker { stop_tx, thread }),
        Err(e) => {
            let _ = thread.join();
            Err(e)
        }
    }
}

/// Output sink backed by a cpal stream
struct CpalSink {
    sample_rate: u32,
    mixer: Arc<Mutex<Mixer>>,
    worker: Option<OutputWorker>,
}

impl OutputSink for CpalSink {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn now(&self) -> u64 {
        self.mixer.lock().map(|m| m.position()).unwrap_or_default()
    }

    fn schedule(&mut self, start: u64, samples: Arc<[f32]>) -> (BufferId, u64) {
        match self.mixer.lock() {
            Ok(mut mixer) => mixer.schedule(start, samples),
            Err(poisoned) => poisoned.into_inner().schedule(start, samples),
        }
    }

    fn stop(&mut self, id: BufferId) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.stop(id);
        }
    }

    fn close(&mut self) {
        if let Ok(mut mixer) = self.mixer.lock() {
            mixer.clear();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            if worker.thread.join().is_err() {
                tracing::warn!("playback thread panicked");
            }
            tracing::debug!("audio playback closed");
        }
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        self.close();
    }
}
