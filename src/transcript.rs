use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use crate::actions::ActionRunner;
use crate::commands::dispatch::Dispatcher;
use crate::error::RecognitionError;

/// The current transcript, shared between the recognition worker and the
/// presentation loop. Readers get the whole previous or the whole new value.
#[derive(Debug, Clone)]
pub struct TranscriptSlot {
    inner: Arc<Mutex<Arc<str>>>,
}

impl Default for TranscriptSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptSlot {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Arc::from(""))),
        }
    }

    pub fn replace(&self, transcript: &str) {
        let value: Arc<str> = Arc::from(transcript);
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    pub fn current(&self) -> Arc<str> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Receives recognition results: successful ones become current and are
/// dispatched, failures are dropped.
pub struct TranscriptSource<R> {
    slot: TranscriptSlot,
    dispatcher: Dispatcher<R>,
}

impl<R: ActionRunner> TranscriptSource<R> {
    pub fn new(slot: TranscriptSlot, dispatcher: Dispatcher<R>) -> Self {
        Self { slot, dispatcher }
    }

    pub fn slot(&self) -> &TranscriptSlot {
        &self.slot
    }

    pub fn dispatcher(&self) -> &Dispatcher<R> {
        &self.dispatcher
    }

    /// Returns whether a command fired.
    pub fn on_utterance(&self, result: Result<String, RecognitionError>) -> bool {
        match result {
            Ok(text) => {
                debug!(transcript = %text, "heard");
                self.slot.replace(&text);
                self.dispatcher.dispatch(&text)
            }
            Err(RecognitionError::Inaudible) => {
                trace!("inaudible");
                false
            }
            Err(e) => {
                debug!("recognition failed: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Action;
    use crate::commands::dispatch::tests::RecordingRunner;
    use crate::commands::{Registry, Trigger};

    fn source() -> TranscriptSource<RecordingRunner> {
        let mut registry = Registry::new();
        registry
            .register(
                Trigger::words(["open", "chrome"]),
                Action::Launch {
                    program: "chrome".into(),
                    args: vec![],
                },
            )
            .unwrap();
        TranscriptSource::new(
            TranscriptSlot::new(),
            Dispatcher::new(registry, RecordingRunner::default()),
        )
    }

    #[test]
    fn slot_starts_empty() {
        assert_eq!(&*TranscriptSlot::new().current(), "");
    }

    #[test]
    fn clones_share_the_value() {
        let slot = TranscriptSlot::new();
        let reader = slot.clone();
        slot.replace("hello");
        assert_eq!(&*reader.current(), "hello");
    }

    #[test]
    fn success_replaces_then_dispatches() {
        let source = source();
        assert!(source.on_utterance(Ok("open chrome".into())));
        assert_eq!(&*source.slot().current(), "open chrome");
        assert_eq!(source.dispatcher().runner().calls().len(), 1);
    }

    #[test]
    fn unmatched_transcript_still_becomes_current() {
        let source = source();
        assert!(!source.on_utterance(Ok("thanks".into())));
        assert_eq!(&*source.slot().current(), "thanks");
    }

    #[test]
    fn failures_are_swallowed() {
        let source = source();
        source.on_utterance(Ok("open chrome".into()));
        assert!(!source.on_utterance(Err(RecognitionError::Inaudible)));
        assert!(!source.on_utterance(Err(RecognitionError::Service("offline".into()))));
        assert_eq!(&*source.slot().current(), "open chrome");
        assert_eq!(source.dispatcher().runner().calls().len(), 1);
    }

    #[test]
    fn last_write_wins_across_threads() {
        let slot = TranscriptSlot::new();
        let handles: Vec<_> = ["one", "two", "three"]
            .into_iter()
            .map(|t| {
                let slot = slot.clone();
                std::thread::spawn(move || slot.replace(t))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(["one", "two", "three"].contains(&&*slot.current()));
    }
}
