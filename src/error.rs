use thiserror::Error;

/// Rejected command table entries.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("binding #{index} has no keywords")]
    EmptyTrigger { index: usize },

    #[error("binding #{index} has a blank keyword")]
    EmptyKeyword { index: usize },
}

/// A guard that could not be evaluated against a transcript.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GuardError {
    #[error("transcript has no {0:?} delimiter")]
    MissingDelimiter(String),
}

/// Failure of a dispatched action. Logged by the dispatcher, never fatal.
#[derive(Debug, Error)]
pub enum ActionError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status {code:?}")]
    ExitStatus { program: String, code: Option<i32> },

    #[error("transcript is missing the {0}")]
    MissingArgument(&'static str),

    #[error("spotify: {0}")]
    Spotify(String),

    #[error("ai: {0}")]
    Ai(String),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("not supported on this platform: {0}")]
    Unsupported(String),
}

/// Recognition outcomes that produce no transcript.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecognitionError {
    /// Nothing intelligible in the utterance.
    #[error("inaudible")]
    Inaudible,

    #[error("recognizer unavailable: {0}")]
    Service(String),
}
