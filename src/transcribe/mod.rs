//! Speech-to-text backends behind one trait.

pub mod cloud;
#[cfg(feature = "whisper")]
pub mod whisper;

use tracing::info;

use crate::config::{Config, RecognizerKind};
use crate::error::RecognitionError;

/// Turns one 16 kHz mono utterance into a lowercase transcript.
pub trait Recognizer: Send {
    fn recognize(&self, audio_16k: &[f32]) -> Result<String, RecognitionError>;
}

/// Detect common whisper hallucinations (empty/repeated noise artifacts).
pub fn is_hallucination(text: &str) -> bool {
    let t = text.trim().to_lowercase();
    let hallucinations = [
        "you",
        "thank you.",
        "thanks for watching!",
        "thank you for watching!",
        "subscribe",
        "like and subscribe",
        "(silence)",
        "[silence]",
        "[blank_audio]",
        "...",
        "the end.",
        "bye.",
    ];
    hallucinations.iter().any(|h| t == *h) || t.chars().all(|c| c == '.' || c == ' ')
}

/// Raw engine text to transcript: lowercase words separated by single
/// spaces. ASCII punctuation at either edge of a word is dropped, so
/// "Close Chrome, please." becomes "close chrome please"; punctuation inside
/// a word ("ac/dc", "don't") stays. Nothing usable is `Inaudible`.
pub fn postprocess(raw: &str) -> Result<String, RecognitionError> {
    if is_hallucination(raw) {
        return Err(RecognitionError::Inaudible);
    }
    let text = raw
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    if text.is_empty() {
        return Err(RecognitionError::Inaudible);
    }
    Ok(text)
}

/// The recognizer selected by `config.recognizer`.
pub fn build(config: &Config) -> anyhow::Result<Box<dyn Recognizer>> {
    match config.recognizer {
        RecognizerKind::Cloud => {
            let recognizer = cloud::CloudRecognizer::from_env(config)?;
            info!("Using cloud recognizer at {}", config.stt_endpoint);
            Ok(Box::new(recognizer))
        }
        #[cfg(feature = "whisper")]
        RecognizerKind::WhisperLocal => {
            info!("Loading whisper model from {}", config.model_path.display());
            let engine = whisper::WhisperEngine::load(&config.model_path, &config.language)?;
            Ok(Box::new(engine))
        }
        #[cfg(not(feature = "whisper"))]
        RecognizerKind::WhisperLocal => {
            anyhow::bail!("built without the `whisper` feature, use --recognizer cloud")
        }
    }
}
