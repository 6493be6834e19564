//! Continuous listening: split microphone audio into utterances and
//! recognize them one at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::capture::{AudioCapture, calibrated_threshold};
use super::resample::resample_48k_to_16k;
use crate::config::{ListenConfig, RECORD_RATE};
use crate::error::RecognitionError;
use crate::transcribe::Recognizer;

const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// No speech yet, old audio can go.
    Idle,
    Speaking,
    /// The buffered audio is a complete utterance.
    Finish,
}

/// Level-driven utterance boundaries.
#[derive(Debug)]
pub struct Segmenter {
    config: ListenConfig,
    threshold: f32,
    onset: Option<Instant>,
    last_speech: Option<Instant>,
}

impl Segmenter {
    pub fn new(config: ListenConfig, threshold: f32) -> Self {
        Self {
            config,
            threshold,
            onset: None,
            last_speech: None,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Seconds of audio to keep while idle.
    pub fn pre_roll(&self) -> f32 {
        self.config.non_speaking_duration.max(self.config.phrase_threshold)
    }

    /// Advance with the current level and the length of buffered audio.
    pub fn step(&mut self, level: f32, now: Instant, buffered_secs: f32) -> Step {
        if level > self.threshold {
            // require sustained speech, brief noise bursts don't count
            let onset = *self.onset.get_or_insert(now);
            if now.duration_since(onset).as_secs_f32() >= self.config.phrase_threshold {
                self.last_speech = Some(now);
            }
        } else {
            self.onset = None;
        }

        let Some(last) = self.last_speech else {
            return Step::Idle;
        };
        let silence = now.duration_since(last).as_secs_f32();
        if silence >= self.config.pause_threshold || buffered_secs >= self.config.max_utterance {
            self.onset = None;
            self.last_speech = None;
            return Step::Finish;
        }
        Step::Speaking
    }
}

/// Background capture plus a single recognition worker.
pub struct Listener {
    stop: Arc<AtomicBool>,
    segmenter: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl Listener {
    /// Open the microphone, calibrate, and start delivering recognition
    /// results to `on_utterance`. Fails if the microphone cannot be opened.
    pub fn spawn<F>(
        config: ListenConfig,
        recognizer: Box<dyn Recognizer>,
        mut on_utterance: F,
    ) -> anyhow::Result<Self>
    where
        F: FnMut(Result<String, RecognitionError>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let (audio_tx, audio_rx) = mpsc::channel::<Vec<f32>>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();

        let worker = std::thread::spawn(move || {
            for audio in audio_rx {
                on_utterance(recognizer.recognize(&audio));
            }
        });

        let flag = stop.clone();
        let segmenter = std::thread::spawn(move || {
            segment_loop(config, flag, audio_tx, ready_tx);
        });

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop,
                segmenter: Some(segmenter),
                worker: Some(worker),
            }),
            Ok(Err(e)) => {
                let _ = segmenter.join();
                let _ = worker.join();
                anyhow::bail!(e)
            }
            Err(_) => anyhow::bail!("Listener thread exited during startup"),
        }
    }

    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.segmenter.take() {
            let _ = handle.join();
        }
        // the worker ends once the segmenter drops its sender
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn secs_to_samples(secs: f32) -> usize {
    (secs * RECORD_RATE as f32) as usize
}

fn calibrate(capture: &AudioCapture, config: &ListenConfig) -> f32 {
    if config.calibrate <= 0.0 {
        return config.energy_threshold;
    }
    let started = Instant::now();
    let mut levels = Vec::new();
    while started.elapsed().as_secs_f32() < config.calibrate {
        std::thread::sleep(POLL);
        levels.push(capture.level());
    }
    calibrated_threshold(&levels, config.energy_threshold)
}

fn segment_loop(
    config: ListenConfig,
    stop: Arc<AtomicBool>,
    audio_tx: mpsc::Sender<Vec<f32>>,
    ready_tx: mpsc::Sender<Result<(), String>>,
) {
    let capture = AudioCapture::new();
    // cpal streams are not Send on every host, keep it on this thread
    let _stream = match capture.start_stream() {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(format!("Audio error: {e}")));
            return;
        }
    };

    let threshold = calibrate(&capture, &config);
    info!(threshold, "Listening");
    capture.clear_buffer();
    let _ = ready_tx.send(Ok(()));

    let mut segmenter = Segmenter::new(config, threshold);
    let pre_roll = secs_to_samples(segmenter.pre_roll());

    while !stop.load(Ordering::Relaxed) {
        std::thread::sleep(POLL);

        let buffered_secs = capture.buffered() as f32 / RECORD_RATE as f32;
        match segmenter.step(capture.level(), Instant::now(), buffered_secs) {
            Step::Idle => capture.keep_last(pre_roll),
            Step::Speaking => {}
            Step::Finish => {
                let audio = capture.take();
                debug!(secs = audio.len() as f32 / RECORD_RATE as f32, "utterance");
                match resample_48k_to_16k(&audio) {
                    Ok(audio_16k) => {
                        if audio_tx.send(audio_16k).is_err() {
                            break;
                        }
                    }
                    Err(e) => warn!("Dropping utterance: {e:#}"),
                }
            }
        }
    }
}
