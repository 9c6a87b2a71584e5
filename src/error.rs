//! Error types for Lumina Live

use thiserror::Error;

/// Result type alias for Lumina Live operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message shown when the microphone or speakers cannot be used
pub const DEVICE_ERROR_MESSAGE: &str = "Failed to access microphone or connect.";

/// Message shown when the remote session fails
pub const TRANSPORT_ERROR_MESSAGE: &str = "Connection error. Please try again.";

/// Errors that can occur in a voice session
#[derive(Debug, Error)]
pub enum Error {
    /// Microphone permission denied or no device present
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Audio stream failure after the device was acquired
    #[error("audio error: {0}")]
    Audio(String),

    /// Remote connection failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed inbound audio payload
    #[error("decode anomaly: {0}")]
    DecodeAnomaly(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Short user-facing message for this error
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::DeviceUnavailable(_) | Self::Audio(_) => DEVICE_ERROR_MESSAGE,
            _ => TRANSPORT_ERROR_MESSAGE,
        }
    }

    /// Whether the session can continue after this error
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::DecodeAnomaly(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_errors_use_device_message() {
        let err = Error::DeviceUnavailable("permission denied".to_string());
        assert_eq!(err.user_message(), DEVICE_ERROR_MESSAGE);
    }

    #[test]
    fn transport_errors_use_connection_message() {
        let err = Error::Transport("handshake failed".to_string());
        assert_eq!(err.user_message(), TRANSPORT_ERROR_MESSAGE);
    }

    #[test]
    fn only_decode_anomalies_are_recoverable() {
        assert!(Error::DecodeAnomaly("odd length".to_string()).is_recoverable());
        assert!(!Error::Transport("closed".to_string()).is_recoverable());
        assert!(!Error::DeviceUnavailable("none".to_string()).is_recoverable());
    }
}
