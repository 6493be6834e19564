use std::fmt;

use serde::{Deserialize, Serialize};

/// Avatar pose derived from the current transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Thinking,
    Active,
    Happy,
    Angry,
    Idle,
}

impl Mood {
    pub const ALL: [Mood; 5] = [
        Mood::Thinking,
        Mood::Active,
        Mood::Happy,
        Mood::Angry,
        Mood::Idle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Thinking => "thinking",
            Self::Active => "active",
            Self::Happy => "happy",
            Self::Angry => "angry",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Mood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const QUESTION_WORDS: [&str; 6] = ["what", "who", "where", "when", "why", "how"];

/// Classify a transcript into a mood. First matching rule wins.
///
/// Every test is a raw substring test on the lowercase transcript, so
/// "somewhere" reads as a question and "closet" as a window command. This is
/// independent of the word-mode matching the command table uses.
///
/// The angry rule still lists "close" even though the active rule above it
/// always claims that word first. The entry is kept so the rule table reads
/// the same as the mood chart; only "hate" can reach it.
pub fn classify(transcript: &str) -> Mood {
    let has = |word: &str| transcript.contains(word);

    if QUESTION_WORDS.iter().any(|w| has(w)) {
        Mood::Thinking
    } else if has("open") || has("close") {
        Mood::Active
    } else if has("thanks") {
        Mood::Happy
    } else if ["hate", "close"].iter().any(|w| has(w)) {
        Mood::Angry
    } else {
        Mood::Idle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_phrases() {
        assert_eq!(classify("what time is it"), Mood::Thinking);
        assert_eq!(classify("open chrome"), Mood::Active);
        assert_eq!(classify("thanks a lot"), Mood::Happy);
        assert_eq!(classify("banana"), Mood::Idle);
    }

    #[test]
    fn empty_transcript_is_idle() {
        assert_eq!(classify(""), Mood::Idle);
    }

    #[test]
    fn hate_is_angry() {
        assert_eq!(classify("i hate this game"), Mood::Angry);
    }

    #[test]
    fn close_never_reaches_angry() {
        assert_eq!(classify("close chrome"), Mood::Active);
        assert_eq!(classify("i hate it close it"), Mood::Active);
    }

    #[test]
    fn question_words_win_over_everything() {
        assert_eq!(classify("how do i open chrome"), Mood::Thinking);
        assert_eq!(classify("thanks, who are you"), Mood::Thinking);
    }

    #[test]
    fn matching_is_substring_based() {
        // "somewhere" contains "where", "closed" contains "close"
        assert_eq!(classify("put it somewhere"), Mood::Thinking);
        assert_eq!(classify("i closed the window"), Mood::Active);
        assert_eq!(classify("thanksgiving"), Mood::Happy);
    }

    #[test]
    fn deterministic() {
        for text in ["", "open notepad", "hate", "why", "spotify play drake"] {
            assert_eq!(classify(text), classify(text));
        }
    }

    #[test]
    fn display_matches_gif_names() {
        let names: Vec<_> = Mood::ALL.iter().map(|m| m.to_string()).collect();
        assert_eq!(names, ["thinking", "active", "happy", "angry", "idle"]);
    }
}
