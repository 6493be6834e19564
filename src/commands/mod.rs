//! Keyword-triggered command bindings.
//!
//! A [`Registry`] is an ordered list of [`Binding`]s. Order is priority:
//! the dispatcher fires the first binding whose [`Trigger`] matches.

pub mod dispatch;
pub mod table;

use serde::{Deserialize, Serialize};

use crate::actions::Action;
use crate::error::{GuardError, RegistryError};

/// How trigger keywords are located in a transcript.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// Keyword must equal one whitespace-separated token.
    /// "close" does not match "i closed the app".
    #[default]
    Word,
    /// Keyword may appear anywhere, including inside other words.
    /// "close" matches "i closed the app".
    Substring,
}

/// Extra condition over the whole transcript, checked after the keywords.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Guard {
    /// Transcript starts with `prefix` and is not exactly `prefix`.
    PrefixNotExact { prefix: String },
    /// Every delimiter must be present; the bound action splits on them.
    Delimited { delimiters: Vec<String> },
}

impl Guard {
    pub fn check(&self, transcript: &str) -> Result<bool, GuardError> {
        match self {
            Self::PrefixNotExact { prefix } => {
                Ok(transcript.starts_with(prefix.as_str()) && transcript != prefix)
            }
            Self::Delimited { delimiters } => {
                if let Some(missing) = delimiters.iter().find(|d| !transcript.contains(d.as_str()))
                {
                    return Err(GuardError::MissingDelimiter(missing.clone()));
                }
                Ok(true)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub keywords: Vec<String>,
    #[serde(default)]
    pub mode: MatchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
}

impl Trigger {
    pub fn words<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
            mode: MatchMode::Word,
            guard: None,
        }
    }

    pub fn substring<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: MatchMode::Substring,
            ..Self::words(keywords)
        }
    }

    pub fn with_guard(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Whether every keyword is present under this trigger's mode.
    pub fn keywords_present(&self, transcript: &str) -> bool {
        match self.mode {
            MatchMode::Word => {
                let tokens: Vec<&str> = transcript.split_whitespace().collect();
                self.keywords.iter().all(|k| tokens.contains(&k.as_str()))
            }
            MatchMode::Substring => self.keywords.iter().all(|k| transcript.contains(k.as_str())),
        }
    }

    /// Keywords first, then the guard. A guard error is returned as-is so the
    /// caller can decide how to treat it.
    pub fn matches(&self, transcript: &str) -> Result<bool, GuardError> {
        if !self.keywords_present(transcript) {
            return Ok(false);
        }
        match &self.guard {
            Some(guard) => guard.check(transcript),
            None => Ok(true),
        }
    }

    fn validate(&self, index: usize) -> Result<(), RegistryError> {
        if self.keywords.is_empty() {
            return Err(RegistryError::EmptyTrigger { index });
        }
        if self.keywords.iter().any(|k| k.trim().is_empty()) {
            return Err(RegistryError::EmptyKeyword { index });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    #[serde(flatten)]
    pub trigger: Trigger,
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Binding {
    /// Display name, the keywords joined by spaces unless a label is set.
    pub fn name(&self) -> String {
        self.label
            .clone()
            .unwrap_or_else(|| self.trigger.keywords.join(" "))
    }
}

/// Ordered command bindings. Never reordered or deduplicated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registry {
    bindings: Vec<Binding>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, trigger: Trigger, action: Action) -> Result<&mut Self, RegistryError> {
        self.push(Binding {
            trigger,
            action,
            label: None,
        })
    }

    pub fn push(&mut self, binding: Binding) -> Result<&mut Self, RegistryError> {
        binding.trigger.validate(self.bindings.len())?;
        self.bindings.push(binding);
        Ok(self)
    }

    /// Triggers in priority order.
    pub fn triggers(&self) -> impl Iterator<Item = &Trigger> {
        self.bindings.iter().map(|b| &b.trigger)
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Build a registry from deserialized bindings, validating each one.
    pub fn from_bindings(bindings: Vec<Binding>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for binding in bindings {
            registry.push(binding)?;
        }
        Ok(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn print(message: &str) -> Action {
        Action::Print {
            message: message.to_string(),
        }
    }

    #[test]
    fn word_mode_requires_whole_tokens() {
        let t = Trigger::words(["close", "chrome"]);
        assert!(t.keywords_present("close chrome"));
        assert!(t.keywords_present("please chrome close now"));
        assert!(!t.keywords_present("i closed chrome"));
        assert!(!t.keywords_present("close chromebook"));
    }

    #[test]
    fn substring_mode_matches_inside_words() {
        let t = Trigger::substring(["close"]);
        assert!(t.keywords_present("i closed the window"));
        assert!(t.keywords_present("closet"));
        assert!(!t.keywords_present("clo se"));
    }

    #[test]
    fn prefix_guard() {
        let g = Guard::PrefixNotExact {
            prefix: "google".into(),
        };
        assert_eq!(g.check("google rust lifetimes"), Ok(true));
        assert_eq!(g.check("google"), Ok(false));
        assert_eq!(g.check("please google it"), Ok(false));
    }

    #[test]
    fn delimited_guard_errors_on_missing_delimiter() {
        let g = Guard::Delimited {
            delimiters: vec!["play ".into(), "by ".into()],
        };
        assert_eq!(g.check("spotify play hello by adele"), Ok(true));
        assert_eq!(
            g.check("spotify play by"),
            Err(GuardError::MissingDelimiter("by ".into()))
        );
    }

    #[test]
    fn guard_only_runs_after_keywords() {
        let t = Trigger::words(["spotify", "play", "by"]).with_guard(Guard::Delimited {
            delimiters: vec!["by ".into()],
        });
        // keywords missing: no guard evaluation, plain non-match
        assert_eq!(t.matches("play something"), Ok(false));
        assert!(t.matches("spotify play by").is_err());
    }

    #[test]
    fn register_rejects_empty_trigger() {
        let mut registry = Registry::new();
        registry
            .register(Trigger::words(["play"]), print("a"))
            .unwrap();
        let err = registry
            .register(Trigger::words(Vec::<String>::new()), print("b"))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyTrigger { index: 1 });
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_rejects_blank_keyword() {
        let mut registry = Registry::new();
        let err = registry
            .register(Trigger::words(["open", " "]), print("x"))
            .unwrap_err();
        assert_eq!(err, RegistryError::EmptyKeyword { index: 0 });
        assert!(registry.is_empty());
    }

    #[test]
    fn overlapping_triggers_are_all_kept_in_order() {
        let mut registry = Registry::new();
        registry
            .register(Trigger::words(["play", "music"]), print("first"))
            .unwrap()
            .register(Trigger::words(["play"]), print("second"))
            .unwrap()
            .register(Trigger::words(["play"]), print("third"))
            .unwrap();

        let keywords: Vec<_> = registry.triggers().map(|t| t.keywords.join(" ")).collect();
        assert_eq!(keywords, ["play music", "play", "play"]);
    }

    #[test]
    fn binding_name_prefers_label() {
        let mut b = Binding {
            trigger: Trigger::words(["go", "to", "code"]),
            action: print("x"),
            label: None,
        };
        assert_eq!(b.name(), "go to code");
        b.label = Some("focus editor".into());
        assert_eq!(b.name(), "focus editor");
    }
}
