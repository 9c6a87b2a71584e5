//! TOML configuration file loading
//!
//! Supports `~/.config/lumina/config.toml` as a persistent config source.
//! All fields are optional, the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct LuminaConfigFile {
    /// API key for the remote model
    #[serde(default)]
    pub api_key: Option<String>,

    /// Realtime session configuration
    #[serde(default)]
    pub live: LiveFileConfig,

    /// Audio pipeline configuration
    #[serde(default)]
    pub audio: AudioFileConfig,
}

/// Realtime session configuration
#[derive(Debug, Default, Deserialize)]
pub struct LiveFileConfig {
    /// Model identifier (e.g. "gemini-2.5-flash-native-audio-preview-09-2025")
    pub model: Option<String>,

    /// Prebuilt voice name (e.g. "Kore")
    pub voice: Option<String>,

    /// Persona and tone instruction sent at session setup
    pub system_instruction: Option<String>,

    /// Websocket endpoint of the realtime service
    pub endpoint: Option<String>,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Microphone rate of outbound frames
    pub capture_sample_rate: Option<u32>,

    /// Samples per captured frame
    pub frame_size: Option<usize>,

    /// Outbound frames held before the oldest is dropped
    pub outbound_queue_frames: Option<usize>,
}

/// Load the TOML config file from the standard path
///
/// Returns `LuminaConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> LuminaConfigFile {
    config_file_path().map_or_else(LuminaConfigFile::default, |path| load_config_file_from(&path))
}

/// Load a TOML config file from an explicit path
///
/// Missing or malformed files fall back to defaults.
pub fn load_config_file_from(path: &Path) -> LuminaConfigFile {
    if !path.exists() {
        return LuminaConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                LuminaConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            LuminaConfigFile::default()
        }
    }
}

/// Return the config file path
///
/// `LUMINA_CONFIG` wins, otherwise `~/.config/lumina/config.toml`.
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("LUMINA_CONFIG") {
        return Some(PathBuf::from(path));
    }

    directories::BaseDirs::new().map(|d| d.config_dir().join("lumina").join("config.toml"))
}
