use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

pub const RECORD_RATE: u32 = 48000;
pub const RECOGNIZER_RATE: u32 = 16000;
pub const CHANNELS: u16 = 1;

pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("garmin")
}

pub fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("garmin")
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.json")
}

pub fn default_model_path() -> PathBuf {
    data_dir().join("models").join("ggml-base.en.bin")
}

pub fn spotify_tokens_path() -> PathBuf {
    data_dir().join("spotify_tokens.json")
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum RecognizerKind {
    #[default]
    WhisperLocal,
    Cloud,
}

/// Utterance segmentation thresholds, in seconds unless noted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenConfig {
    /// Silence that ends an utterance.
    pub pause_threshold: f32,
    /// Sustained speech needed before an utterance starts.
    pub phrase_threshold: f32,
    /// Pre-roll kept ahead of detected speech.
    pub non_speaking_duration: f32,
    /// RMS level that counts as speech (0.0..1.0).
    pub energy_threshold: f32,
    pub max_utterance: f32,
    /// Ambient noise sampling time at startup. Zero disables calibration.
    pub calibrate: f32,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            pause_threshold: 0.5,
            phrase_threshold: 0.1,
            non_speaking_duration: 0.5,
            energy_threshold: 0.015,
            max_utterance: 15.0,
            calibrate: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvatarConfig {
    /// Directory holding `<mood>.gif` animations.
    pub gif_dir: PathBuf,
    pub width: i32,
    pub height: i32,
    pub margin_right: i32,
    pub margin_bottom: i32,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            gif_dir: data_dir().join("gifs"),
            width: 200,
            height: 200,
            margin_right: 24,
            margin_bottom: 24,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub language: String,
    pub recognizer: RecognizerKind,
    pub model_path: PathBuf,
    /// OpenAI-compatible transcription endpoint for the cloud recognizer.
    pub stt_endpoint: String,
    pub stt_model: String,
    pub listen: ListenConfig,
    pub poll_interval_ms: u64,
    pub avatar: AvatarConfig,
    pub mistral_model: String,
    /// Prefix used to open the AI console, e.g. `["kitty", "-e"]`.
    pub terminal: Vec<String>,
    pub spotify_redirect_port: u16,
    /// JSON command table replacing the built-in one.
    pub commands_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            recognizer: RecognizerKind::default(),
            model_path: default_model_path(),
            stt_endpoint: "https://api.openai.com/v1/audio/transcriptions".to_string(),
            stt_model: "whisper-1".to_string(),
            listen: ListenConfig::default(),
            poll_interval_ms: 1000,
            avatar: AvatarConfig::default(),
            mistral_model: "mistral-small-2503".to_string(),
            terminal: vec!["x-terminal-emulator".to_string(), "-e".to_string()],
            spotify_redirect_port: 8888,
            commands_file: None,
        }
    }
}

impl Config {
    /// Load `config.json` from the config dir, defaults on any failure.
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
                warn!("Failed to parse {}: {e}, using defaults", path.display());
                Self::default()
            }),
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!("Failed to read {}: {e}, using defaults", path.display());
                }
                Self::default()
            }
        }
    }
}

/// Read a secret from the environment, treating blank values as unset.
pub fn secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.recognizer, RecognizerKind::WhisperLocal);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"language": "de", "recognizer": "cloud", "listen": {"pause_threshold": 0.8}}"#,
        )
        .unwrap();

        let config = Config::load_from(&path);
        assert_eq!(config.language, "de");
        assert_eq!(config.recognizer, RecognizerKind::Cloud);
        assert_eq!(config.listen.pause_threshold, 0.8);
        assert_eq!(config.listen.phrase_threshold, 0.1);
        assert_eq!(config.mistral_model, "mistral-small-2503");
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());
    }
}
