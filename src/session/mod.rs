//! Voice session lifecycle
//!
//! [`VoiceSession`] ties capture, transport and playback together behind the
//! `open` / `close` / `toggle_mic` surface the UI drives.

mod controller;
mod event;
mod status;

pub use controller::{Devices, VoiceSession};
pub use event::{Command, SessionEvent, SessionHandle};
pub use status::{StatusSnapshot, VoiceStatus};
