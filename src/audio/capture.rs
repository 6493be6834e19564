use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{info, warn};

use crate::config::{CHANNELS, RECORD_RATE};

pub fn rms(data: &[f32]) -> f32 {
    if data.is_empty() {
        return 0.0;
    }
    (data.iter().map(|&s| s * s).sum::<f32>() / data.len() as f32).sqrt()
}

/// Mono 48 kHz microphone capture into a shared buffer.
#[derive(Clone, Default)]
pub struct AudioCapture {
    frames: Arc<Mutex<Vec<f32>>>,
    audio_level: Arc<Mutex<f32>>,
}

impl AudioCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start continuous audio capture. Returns the stream handle, recording
    /// continues as long as the handle is alive (drop it to stop).
    pub fn start_stream(&self) -> anyhow::Result<cpal::Stream> {
        self.clear_buffer();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| anyhow::anyhow!("No input device found"))?;
        if let Ok(name) = device.name() {
            info!("Capturing from {name}");
        }

        let config = cpal::StreamConfig {
            channels: CHANNELS,
            sample_rate: RECORD_RATE,
            buffer_size: cpal::BufferSize::Default,
        };

        let frames = self.frames.clone();
        let audio_level = self.audio_level.clone();

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                if let Ok(mut frames) = frames.lock() {
                    frames.extend_from_slice(data);
                }
                if let Ok(mut level) = audio_level.lock() {
                    *level = rms(data);
                }
            },
            move |err| {
                warn!("Audio stream error: {err}");
            },
            None,
        )?;

        stream.play()?;
        Ok(stream)
    }

    fn frames(&self) -> std::sync::MutexGuard<'_, Vec<f32>> {
        self.frames.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take everything captured so far, leaving the buffer empty.
    pub fn take(&self) -> Vec<f32> {
        std::mem::take(&mut *self.frames())
    }

    /// Drop all but the newest `samples` samples.
    pub fn keep_last(&self, samples: usize) {
        let mut frames = self.frames();
        let excess = frames.len().saturating_sub(samples);
        if excess > 0 {
            frames.drain(..excess);
        }
    }

    pub fn buffered(&self) -> usize {
        self.frames().len()
    }

    pub fn clear_buffer(&self) {
        self.frames().clear();
    }

    /// RMS of the most recent callback block.
    pub fn level(&self) -> f32 {
        *self.audio_level.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn push(&self, data: &[f32]) {
        self.frames().extend_from_slice(data);
    }
}

/// Speech threshold after sampling ambient noise: 1.5x the ambient mean,
/// never below the configured floor.
pub fn calibrated_threshold(ambient_levels: &[f32], floor: f32) -> f32 {
    if ambient_levels.is_empty() {
        return floor;
    }
    let mean = ambient_levels.iter().sum::<f32>() / ambient_levels.len() as f32;
    floor.max(mean * 1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rms_of_constant_signal() {
        assert_eq!(rms(&[]), 0.0);
        assert!((rms(&[0.5, -0.5, 0.5]) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn take_drains() {
        let capture = AudioCapture::new();
        capture.push(&[0.1, 0.2, 0.3]);
        assert_eq!(capture.take(), [0.1, 0.2, 0.3]);
        assert_eq!(capture.buffered(), 0);
    }

    #[test]
    fn keep_last_trims_oldest() {
        let capture = AudioCapture::new();
        capture.push(&[1.0, 2.0, 3.0, 4.0]);
        capture.keep_last(2);
        assert_eq!(capture.take(), [3.0, 4.0]);
        capture.push(&[1.0]);
        capture.keep_last(5);
        assert_eq!(capture.buffered(), 1);
    }

    #[test]
    fn calibration_raises_threshold_in_noise() {
        assert_eq!(calibrated_threshold(&[], 0.015), 0.015);
        assert_eq!(calibrated_threshold(&[0.001, 0.003], 0.015), 0.015);
        let noisy = calibrated_threshold(&[0.02, 0.04], 0.015);
        assert!((noisy - 0.045).abs() < 1e-6);
    }
}
