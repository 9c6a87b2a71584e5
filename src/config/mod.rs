//! Configuration management for Lumina Live

pub mod file;

use secrecy::SecretString;

use crate::{Error, Result};

use self::file::LuminaConfigFile;

/// Default realtime model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default prebuilt voice
pub const DEFAULT_VOICE: &str = "Kore";

/// Default realtime endpoint (Gemini Live bidirectional stream)
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default persona instruction
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "You are Lumina, a warm, calm, and empathetic mental wellness companion. \
Speak softly and briefly. Your goal is to help the user feel heard and grounded. \
Do not give medical advice, but offer emotional support.";

/// Environment variables checked for the API key, in priority order
const API_KEY_VARS: [&str; 3] = ["LUMINA_API_KEY", "GEMINI_API_KEY", "API_KEY"];

/// Lumina Live configuration
#[derive(Debug)]
pub struct Config {
    /// Realtime session configuration
    pub live: LiveConfig,

    /// Audio pipeline configuration
    pub audio: AudioConfig,

    api_key: Option<SecretString>,
}

/// Fixed configuration of one realtime session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConfig {
    /// Model identity
    pub model: String,

    /// Prebuilt voice used for synthesized speech
    pub voice: String,

    /// Persona and tone instruction
    pub system_instruction: String,

    /// Websocket endpoint
    pub endpoint: String,
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

/// Audio pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Microphone rate (outbound frames)
    pub capture_sample_rate: u32,

    /// Output clock rate; must match the 24 kHz inbound wire format
    pub playback_sample_rate: u32,

    /// Samples per captured frame
    pub frame_size: usize,

    /// Capacity of the outbound frame queue
    pub outbound_queue_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: crate::audio::CAPTURE_SAMPLE_RATE,
            playback_sample_rate: crate::audio::PLAYBACK_SAMPLE_RATE,
            frame_size: crate::audio::FRAME_SIZE,
            outbound_queue_frames: 32,
        }
    }
}

impl Config {
    /// Load configuration from the environment and the config file
    ///
    /// Never fails: a missing or broken config file falls back to defaults.
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Build configuration from a parsed file and an environment lookup
    ///
    /// Priority is env > toml > default.
    pub fn resolve(fc: LuminaConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = LiveConfig::default();

        let live = LiveConfig {
            model: env("LUMINA_MODEL")
                .or(fc.live.model)
                .unwrap_or(defaults.model),
            voice: env("LUMINA_VOICE")
                .or(fc.live.voice)
                .unwrap_or(defaults.voice),
            system_instruction: fc
                .live
                .system_instruction
                .unwrap_or(defaults.system_instruction),
            endpoint: env("LUMINA_ENDPOINT")
                .or(fc.live.endpoint)
                .unwrap_or(defaults.endpoint),
        };

        let audio_defaults = AudioConfig::default();
        let audio = AudioConfig {
            capture_sample_rate: fc
                .audio
                .capture_sample_rate
                .unwrap_or(audio_defaults.capture_sample_rate),
            playback_sample_rate: audio_defaults.playback_sample_rate,
            frame_size: fc
                .audio
                .frame_size
                .filter(|&n| n > 0)
                .unwrap_or(audio_defaults.frame_size),
            outbound_queue_frames: fc
                .audio
                .outbound_queue_frames
                .filter(|&n| n > 0)
                .unwrap_or(audio_defaults.outbound_queue_frames),
        };

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|var| env(var))
            .or(fc.api_key)
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        Self {
            live,
            audio,
            api_key,
        }
    }

    /// API key for the realtime service
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn api_key(&self) -> Result<&SecretString> {
        self.api_key.as_ref().ok_or_else(|| {
            Error::Config(format!(
                "API key not found (set one of {} or api_key in config.toml)",
                API_KEY_VARS.join(", ")
            ))
        })
    }
}
