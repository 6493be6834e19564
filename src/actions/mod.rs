//! Actions bound to commands and the runner that performs them.

pub mod system;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ai;
use crate::config::Config;
use crate::error::ActionError;
use crate::spotify::{Playback, SpotifyClient};
use system::Platform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKey {
    PlayPause,
    Next,
    Previous,
    VolumeUp,
    VolumeDown,
    Mute,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerOp {
    Lock,
    Shutdown,
    Restart,
}

/// What a binding does when it fires. Plain data so command tables can be
/// loaded from JSON and inspected in tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Launch {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Open {
        target: String,
    },
    Kill {
        process: String,
    },
    Focus {
        window: String,
    },
    CloseWindow,
    Power {
        op: PowerOp,
    },
    Media {
        key: MediaKey,
    },
    /// Search the web for the whole transcript.
    WebSearch,
    SpotifyPlayArtist,
    SpotifyPlayTrack,
    SpotifyClearQueue,
    /// Hand the question in the transcript to the AI console.
    AskAi,
    Print {
        message: String,
    },
}

/// Performs actions. Implementations must tolerate being called from the
/// recognition thread.
pub trait ActionRunner: Send + Sync {
    fn run(&self, action: &Action, transcript: &str) -> Result<(), ActionError>;
}

pub fn search_url(transcript: &str) -> String {
    let query: String = url::form_urlencoded::byte_serialize(transcript.as_bytes()).collect();
    format!("https://www.google.com/search?q={query}")
}

/// "spotify play kendrick lamar" -> "kendrick lamar"
pub fn artist_query(transcript: &str) -> Result<String, ActionError> {
    let (_, rest) = transcript
        .split_once("play ")
        .ok_or(ActionError::MissingArgument("artist"))?;
    let artist = rest.trim();
    if artist.is_empty() {
        return Err(ActionError::MissingArgument("artist"));
    }
    Ok(artist.to_string())
}

/// "spotify play humble by kendrick lamar" -> ("humble", "kendrick lamar")
pub fn track_query(transcript: &str) -> Result<(String, String), ActionError> {
    let (_, after_play) = transcript
        .split_once("play ")
        .ok_or(ActionError::MissingArgument("song"))?;
    // pad so "play by x" leaves an empty song instead of "by x"
    let padded = format!(" {after_play}");
    let (song, artist) = padded.split_once(" by ").unwrap_or((padded.as_str(), ""));
    let (song, artist) = (song.trim(), artist.trim());

    if song.is_empty() {
        return Err(ActionError::MissingArgument("song"));
    }
    if artist.is_empty() {
        return Err(ActionError::MissingArgument("artist"));
    }
    Ok((song.to_string(), artist.to_string()))
}

/// "question why is the sky blue" -> "why is the sky blue"
pub fn question_text(transcript: &str) -> Result<String, ActionError> {
    let question = transcript.replace("question", "");
    let question = question.trim();
    if question.is_empty() {
        return Err(ActionError::MissingArgument("question"));
    }
    Ok(question.to_string())
}

/// The production runner: real processes, Spotify and the AI console.
pub struct Desktop {
    platform: Platform,
    terminal: Vec<String>,
    spotify: Option<SpotifyClient>,
}

impl Desktop {
    pub fn new(config: &Config) -> Self {
        let spotify = SpotifyClient::from_env(config);
        if spotify.is_none() {
            warn!("SPOTIFY_API_KEY not set, spotify commands will fail");
        }
        Self {
            platform: Platform::current(),
            terminal: config.terminal.clone(),
            spotify,
        }
    }

    fn spotify(&self) -> Result<&SpotifyClient, ActionError> {
        self.spotify
            .as_ref()
            .ok_or_else(|| ActionError::Spotify("missing SPOTIFY_API_KEY".into()))
    }

    fn play(&self, playback: Playback, what: &str) -> Result<(), ActionError> {
        match playback {
            Playback::Started => {
                info!("playing {what}");
                Ok(())
            }
            Playback::NoDevice => Err(ActionError::Spotify(
                "no active device, start Spotify and play something first".into(),
            )),
            Playback::Unauthorized => Err(ActionError::Spotify(
                "authorization failed, run `garmin spotify-auth`".into(),
            )),
            Playback::Rejected(status) => {
                warn!(%status, "playback request rejected, falling back to media key");
                system::send_media_key(MediaKey::PlayPause)
            }
        }
    }
}

impl ActionRunner for Desktop {
    fn run(&self, action: &Action, transcript: &str) -> Result<(), ActionError> {
        let platform = self.platform;
        match action {
            Action::Launch { program, args } => {
                system::launch_command(platform, program, args).spawn_detached()
            }
            Action::Open { target } => system::open_command(platform, target).run(),
            Action::Kill { process } => system::kill_command(platform, process).run(),
            Action::Focus { window } => system::focus_command(platform, window)?.run(),
            Action::CloseWindow => system::close_window_command(platform)?.run(),
            Action::Power { op } => system::power_command(platform, *op).run(),
            Action::Media { key } => system::media_command(platform, *key)?.run(),
            Action::WebSearch => system::open_command(platform, &search_url(transcript)).run(),
            Action::SpotifyPlayArtist => {
                let artist = artist_query(transcript)?;
                let playback = self.spotify()?.play_artist(&artist)?;
                self.play(playback, &format!("top track of {artist}"))
            }
            Action::SpotifyPlayTrack => {
                let (song, artist) = track_query(transcript)?;
                let playback = self.spotify()?.play_track(&song, &artist)?;
                self.play(playback, &format!("{song} by {artist}"))
            }
            Action::SpotifyClearQueue => {
                let playback = self.spotify()?.clear_queue()?;
                self.play(playback, "current track only")
            }
            Action::AskAi => ai::handoff(&self.terminal, &question_text(transcript)?),
            Action::Print { message } => {
                println!("{message}");
                Ok(())
            }
        }
    }
}
