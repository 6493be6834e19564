//! First-match command selection and fault-isolated action execution.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, info, warn};

use super::{Binding, Registry};
use crate::actions::{Action, ActionRunner};

/// Result of running the selected action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Succeeded,
    Failed(String),
}

/// What happened for one transcript that matched a binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fired {
    pub index: usize,
    pub name: String,
    pub outcome: Outcome,
}

/// Selects at most one binding per transcript and runs its action.
pub struct Dispatcher<R> {
    registry: Registry,
    runner: R,
}

impl<R: ActionRunner> Dispatcher<R> {
    pub fn new(registry: Registry, runner: R) -> Self {
        Self { registry, runner }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Returns whether a command fired.
    pub fn dispatch(&self, transcript: &str) -> bool {
        self.fire(transcript).is_some()
    }

    /// First binding whose keywords and guard pass, in registry order.
    /// A guard that cannot be evaluated counts as a non-match.
    pub fn select(&self, transcript: &str) -> Option<(usize, &Binding)> {
        self.registry
            .bindings()
            .iter()
            .enumerate()
            .find(|(_, binding)| match binding.trigger.matches(transcript) {
                Ok(matched) => matched,
                Err(e) => {
                    debug!(binding = %binding.name(), error = %e, "guard failed, skipping");
                    false
                }
            })
    }

    /// Dispatch and report which binding ran and how it went.
    pub fn fire(&self, transcript: &str) -> Option<Fired> {
        let Some((index, binding)) = self.select(transcript) else {
            debug!(%transcript, "no command matched");
            return None;
        };

        let name = binding.name();
        info!(command = %name, %transcript, "executing command");
        let outcome = self.run_action(&binding.action, transcript);
        if let Outcome::Failed(reason) = &outcome {
            warn!(command = %name, %reason, "command failed");
        }

        Some(Fired {
            index,
            name,
            outcome,
        })
    }

    fn run_action(&self, action: &Action, transcript: &str) -> Outcome {
        // A panicking action must not take the recognition thread down with it.
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.runner.run(action, transcript)));
        match result {
            Ok(Ok(())) => Outcome::Succeeded,
            Ok(Err(e)) => Outcome::Failed(e.to_string()),
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "action panicked".to_string());
                Outcome::Failed(reason)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::commands::{Guard, Trigger};
    use crate::error::ActionError;

    /// Records every invocation instead of touching the OS.
    #[derive(Default)]
    pub(crate) struct RecordingRunner {
        pub calls: Mutex<Vec<(Action, String)>>,
        pub fail_with: Option<&'static str>,
    }

    impl RecordingRunner {
        pub fn calls(&self) -> Vec<(Action, String)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl ActionRunner for RecordingRunner {
        fn run(&self, action: &Action, transcript: &str) -> Result<(), ActionError> {
            self.calls
                .lock()
                .unwrap()
                .push((action.clone(), transcript.to_string()));
            match (self.fail_with, action) {
                (_, Action::Print { message }) if message == "panic" => panic!("boom"),
                (Some(reason), _) => Err(ActionError::Unsupported(reason.to_string())),
                (None, _) => Ok(()),
            }
        }
    }

    fn print(message: &str) -> Action {
        Action::Print {
            message: message.to_string(),
        }
    }

    fn dispatcher(bindings: Vec<(Trigger, &str)>) -> Dispatcher<RecordingRunner> {
        let mut registry = Registry::new();
        for (trigger, message) in bindings {
            registry.register(trigger, print(message)).unwrap();
        }
        Dispatcher::new(registry, RecordingRunner::default())
    }

    #[test]
    fn earlier_binding_wins_and_fires_once() {
        let d = dispatcher(vec![
            (Trigger::words(["play", "music"]), "media"),
            (Trigger::words(["play"]), "generic"),
        ]);

        assert!(d.dispatch("play music please"));
        assert_eq!(
            d.runner().calls(),
            vec![(print("media"), "play music please".to_string())]
        );
    }

    #[test]
    fn later_binding_fires_when_earlier_does_not_match() {
        let d = dispatcher(vec![
            (Trigger::words(["play", "music"]), "media"),
            (Trigger::words(["play"]), "generic"),
        ]);

        assert!(d.dispatch("play"));
        assert_eq!(d.runner().calls(), vec![(print("generic"), "play".to_string())]);
    }

    #[test]
    fn close_in_word_mode() {
        let d = dispatcher(vec![
            (Trigger::words(["open", "chrome"]), "open"),
            (Trigger::words(["close", "chrome"]), "close chrome"),
            (Trigger::words(["close"]), "close"),
        ]);

        let fired = d.fire("close chrome").unwrap();
        assert_eq!(fired.index, 1);
        assert_eq!(fired.name, "close chrome");

        // "closed" is not the token "close"
        assert!(!d.dispatch("i closed the window"));
        assert_eq!(d.runner().calls().len(), 1);
    }

    #[test]
    fn close_in_substring_mode_differs() {
        let d = dispatcher(vec![(Trigger::substring(["close"]), "close")]);
        assert!(d.dispatch("i closed the window"));
    }

    #[test]
    fn empty_transcript_matches_nothing() {
        let d = dispatcher(vec![
            (Trigger::words(["play"]), "play"),
            (Trigger::substring(["a"]), "a"),
        ]);
        assert!(!d.dispatch(""));
        assert!(d.runner().calls().is_empty());
    }

    #[test]
    fn guard_failure_falls_through_to_later_binding() {
        let d = dispatcher(vec![
            (
                Trigger::words(["spotify", "play", "by"]).with_guard(Guard::Delimited {
                    delimiters: vec!["play ".into(), "by ".into()],
                }),
                "track",
            ),
            (Trigger::words(["spotify", "play"]), "artist"),
        ]);

        // "by" is a token but "by " never appears, so the guard cannot split
        let fired = d.fire("spotify play by").unwrap();
        assert_eq!(fired.name, "spotify play");
        assert_eq!(d.runner().calls(), vec![(print("artist"), "spotify play by".into())]);
    }

    #[test]
    fn false_guard_is_a_plain_non_match() {
        let d = dispatcher(vec![
            (
                Trigger::words(["google"]).with_guard(Guard::PrefixNotExact {
                    prefix: "google".into(),
                }),
                "search",
            ),
            (Trigger::words(["google"]), "fallback"),
        ]);
        assert_eq!(d.fire("google").unwrap().name, "google");
        assert_eq!(d.runner().calls()[0].0, print("fallback"));
    }

    #[test]
    fn action_failure_is_reported_not_propagated() {
        let mut registry = Registry::new();
        registry
            .register(Trigger::words(["lock", "pc"]), print("lock"))
            .unwrap();
        let runner = RecordingRunner {
            fail_with: Some("no session"),
            ..Default::default()
        };
        let d = Dispatcher::new(registry, runner);

        let fired = d.fire("lock pc").unwrap();
        assert!(matches!(fired.outcome, Outcome::Failed(ref r) if r.contains("no session")));
        // still reports that a command fired
        assert!(d.dispatch("lock pc"));
    }

    #[test]
    fn panicking_action_is_contained() {
        let d = dispatcher(vec![(Trigger::words(["boom"]), "panic")]);
        let fired = d.fire("boom").unwrap();
        assert_eq!(fired.outcome, Outcome::Failed("boom".into()));
        assert!(d.dispatch("boom"));
    }

    #[test]
    fn no_match_returns_false() {
        let d = dispatcher(vec![(Trigger::words(["open", "steam"]), "steam")]);
        assert!(!d.dispatch("banana"));
        assert!(d.fire("banana").is_none());
    }
}
