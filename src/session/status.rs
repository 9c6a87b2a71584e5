//! UI-facing session status

use std::fmt;

/// Status of a voice session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceStatus {
    #[default]
    Connecting,
    Connected,
    Error,
    Disconnected,
}

impl VoiceStatus {
    /// `Error` and `Disconnected` end the session instance
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Disconnected)
    }

    /// Short status line for display
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Establishing connection...",
            Self::Connected => "Listening...",
            Self::Error => "Connection failed",
            Self::Disconnected => "Session ended",
        }
    }
}

impl fmt::Display for VoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
        };
        f.write_str(name)
    }
}

/// Read-only view published to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub status: VoiceStatus,
    /// Set only in `Error`
    pub error: Option<String>,
    pub mic_enabled: bool,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: VoiceStatus::Connecting,
            error: None,
            mic_enabled: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(!VoiceStatus::Connecting.is_terminal());
        assert!(!VoiceStatus::Connected.is_terminal());
        assert!(VoiceStatus::Error.is_terminal());
        assert!(VoiceStatus::Disconnected.is_terminal());
    }

    #[test]
    fn displays_lowercase_names() {
        assert_eq!(VoiceStatus::Connected.to_string(), "connected");
        assert_eq!(VoiceStatus::Error.to_string(), "error");
    }
}
