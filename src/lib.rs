//! Lumina Live - real-time voice companion client
//!
//! This library provides the voice conversation pipeline for the Lumina wellness
//! companion:
//! - PCM16 codec between float samples and the base64 wire format
//! - Microphone capture framed into fixed-size chunks
//! - A realtime websocket session with the remote model
//! - Gap-free playback scheduling with interruption handling
//! - A session controller that owns and releases every resource
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                 UI / CLI                      │
//! │   open  │  close  │  toggle mic  │  status    │
//! └────────────────────┬─────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────┐
//! │               VoiceSession                    │
//! │   Capture ─▶ Transport ─▶ Playback            │
//! └────────────────────┬─────────────────────────┘
//!                      │
//! ┌────────────────────▼─────────────────────────┐
//! │         Remote model (Gemini Live)            │
//! └──────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod session;

pub use config::Config;
pub use error::{Error, Result};
pub use session::{Devices, SessionHandle, StatusSnapshot, VoiceSession, VoiceStatus};
