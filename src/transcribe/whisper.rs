use std::path::Path;
use std::time::Instant;

use anyhow::Context;
use tracing::debug;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{Recognizer, postprocess};
use crate::config::RECOGNIZER_RATE;
use crate::error::RecognitionError;

pub struct WhisperEngine {
    ctx: WhisperContext,
    language: String,
}

impl WhisperEngine {
    /// Load a GGML model file.
    pub fn load(model_path: &Path, language: &str) -> anyhow::Result<Self> {
        let path = model_path
            .to_str()
            .with_context(|| format!("Model path is not UTF-8: {}", model_path.display()))?;
        if !model_path.exists() {
            anyhow::bail!("Whisper model not found at {path}");
        }
        let ctx = WhisperContext::new_with_params(path, WhisperContextParameters::default())
            .map_err(|e| anyhow::anyhow!("Failed to load whisper model: {e}"))?;

        Ok(Self {
            ctx,
            language: language.to_string(),
        })
    }

    /// Greedy decoding. Commands are short, beam search buys little.
    pub fn transcribe(&self, audio: &[f32]) -> anyhow::Result<String> {
        // Preprocess: normalize volume and trim leading/trailing silence
        let mut processed = audio.to_vec();
        normalize_audio(&mut processed);
        let trimmed = trim_silence(&processed);

        if trimmed.is_empty() {
            return Ok(String::new());
        }

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(self.language.as_str()));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_single_segment(true);
        params.set_suppress_nst(true);
        params.set_suppress_blank(true);

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| anyhow::anyhow!("Failed to create whisper state: {e}"))?;

        state
            .full(params, trimmed)
            .map_err(|e| anyhow::anyhow!("Transcription failed: {e}"))?;

        let n_segments = state.full_n_segments();

        let mut text = String::new();
        for i in 0..n_segments {
            if let Some(segment) = state.get_segment(i)
                && let Ok(s) = segment.to_str()
            {
                text.push_str(s.trim());
                text.push(' ');
            }
        }

        Ok(text.trim().to_string())
    }
}

impl Recognizer for WhisperEngine {
    fn recognize(&self, audio_16k: &[f32]) -> Result<String, RecognitionError> {
        let started = Instant::now();
        let raw = self
            .transcribe(audio_16k)
            .map_err(|e| RecognitionError::Service(format!("{e:#}")))?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, raw = %raw, "whisper");
        postprocess(&raw)
    }
}

/// Normalize audio to ~95% peak amplitude so whisper gets consistent input
/// regardless of mic gain.
fn normalize_audio(audio: &mut [f32]) {
    let max = audio.iter().map(|s| s.abs()).fold(0.0f32, f32::max);
    if max > 0.001 && max < 0.95 {
        let scale = 0.95 / max;
        for s in audio.iter_mut() {
            *s *= scale;
        }
    }
}

fn rms(chunk: &[f32]) -> f32 {
    (chunk.iter().map(|&s| s * s).sum::<f32>() / chunk.len() as f32).sqrt()
}

/// Trim leading and trailing silence in 20 ms windows.
fn trim_silence(audio: &[f32]) -> &[f32] {
    let window = RECOGNIZER_RATE as usize / 50;
    if audio.len() < window {
        return audio;
    }

    let threshold = 0.01;

    let Some(first) = audio.chunks(window).position(|chunk| rms(chunk) > threshold) else {
        return &audio[..0];
    };
    let start = first * window;

    let end = audio.len()
        - audio
            .chunks(window)
            .rev()
            .position(|chunk| rms(chunk) > threshold)
            .unwrap_or(0)
            * window;

    if start >= end {
        return &audio[..0];
    }

    &audio[start..end]
}
