use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::mood::{self, Mood};
use crate::transcript::TranscriptSlot;

/// Anything that can show a mood. Requests must return immediately.
pub trait MoodSink: Send {
    fn request_mood(&self, mood: Mood);
}

/// Forwards requests to the avatar's main-thread channel.
pub struct ChannelSink(pub Sender<Mood>);

impl MoodSink for ChannelSink {
    fn request_mood(&self, mood: Mood) {
        // receiver gone means the window closed
        let _ = self.0.send(mood);
    }
}

/// Headless sink.
pub struct LogSink;

impl MoodSink for LogSink {
    fn request_mood(&self, mood: Mood) {
        info!(%mood, "mood");
    }
}

/// Remembers the last displayed mood and only requests changes.
#[derive(Debug, Default)]
pub struct MoodTracker {
    last: Option<Mood>,
}

impl MoodTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last(&self) -> Option<Mood> {
        self.last
    }

    /// Classify `transcript` and request the mood if it changed. Returns the
    /// requested mood.
    pub fn tick(&mut self, transcript: &str, sink: &dyn MoodSink) -> Option<Mood> {
        let mood = mood::classify(transcript);
        if self.last == Some(mood) {
            return None;
        }
        debug!(from = ?self.last, to = %mood, "mood change");
        sink.request_mood(mood);
        self.last = Some(mood);
        Some(mood)
    }
}

/// Background thread polling the transcript on a fixed period.
pub struct PresentationLoop {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl PresentationLoop {
    pub fn spawn<S: MoodSink + 'static>(slot: TranscriptSlot, sink: S, period: Duration) -> Self {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = std::thread::spawn(move || {
            let mut tracker = MoodTracker::new();
            while !flag.load(Ordering::Relaxed) {
                let started = Instant::now();
                tracker.tick(&slot.current(), &sink);
                let remaining = period.saturating_sub(started.elapsed());
                std::thread::park_timeout(remaining);
            }
        });
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait for it.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for PresentationLoop {
    fn drop(&mut self) {
        self.shutdown();
    }
}
