//! OpenAI-compatible transcription endpoint.

use std::io::Cursor;
use std::time::{Duration, Instant};

use reqwest::blocking::{Client, multipart};
use tracing::debug;

use super::{Recognizer, postprocess};
use crate::config::{self, CHANNELS, Config, RECOGNIZER_RATE};
use crate::error::RecognitionError;

/// Encode 16 kHz mono f32 audio as 16-bit PCM WAV.
pub fn encode_wav(audio: &[f32]) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels: CHANNELS,
        sample_rate: RECOGNIZER_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in audio {
            writer.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

pub struct CloudRecognizer {
    endpoint: String,
    model: String,
    language: String,
    api_key: Option<String>,
    client: Client,
}

impl CloudRecognizer {
    /// Key from `GARMIN_STT_API_KEY`, else `OPENAI_API_KEY`. A custom endpoint
    /// may run without one.
    pub fn from_env(config: &Config) -> anyhow::Result<Self> {
        let api_key =
            config::secret("GARMIN_STT_API_KEY").or_else(|| config::secret("OPENAI_API_KEY"));
        if api_key.is_none() && config.stt_endpoint.contains("api.openai.com") {
            anyhow::bail!("Cloud recognizer needs GARMIN_STT_API_KEY or OPENAI_API_KEY");
        }
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            endpoint: config.stt_endpoint.clone(),
            model: config.stt_model.clone(),
            language: config.language.clone(),
            api_key,
            client,
        })
    }

    fn transcribe(&self, audio: &[f32]) -> anyhow::Result<String> {
        let wav = encode_wav(audio)?;
        debug!(bytes = wav.len(), endpoint = %self.endpoint, "Sending audio to STT endpoint");

        let file_part = multipart::Part::bytes(wav)
            .file_name("audio.wav")
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.language.clone())
            .part("file", file_part);

        let mut req = self.client.post(&self.endpoint).multipart(form);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send()?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            anyhow::bail!("STT API error {status}: {body}");
        }

        let json: serde_json::Value = resp.json()?;
        Ok(json["text"].as_str().unwrap_or("").to_string())
    }
}

impl Recognizer for CloudRecognizer {
    fn recognize(&self, audio_16k: &[f32]) -> Result<String, RecognitionError> {
        let started = Instant::now();
        let raw = self
            .transcribe(audio_16k)
            .map_err(|e| RecognitionError::Service(format!("{e:#}")))?;
        debug!(elapsed_ms = started.elapsed().as_millis() as u64, raw = %raw, "cloud stt");
        postprocess(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wav_header_and_samples() {
        let wav = encode_wav(&[0.0, 1.0, -1.0, 2.0]).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, RECOGNIZER_RATE);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        assert_eq!(samples, [0, i16::MAX, -i16::MAX, i16::MAX]);
    }
}
