//! The built-in command table and JSON overrides.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Binding, Guard, Registry, Trigger};
use crate::actions::system::Platform;
use crate::actions::{Action, MediaKey, PowerOp};
use crate::error::RegistryError;

/// On-disk shape of a command table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandTable {
    pub bindings: Vec<Binding>,
}

/// A launchable desktop app, as spoken and as seen by the OS.
struct App {
    spoken: &'static str,
    launch: Action,
    close: Action,
    window: Option<&'static str>,
}

fn print(message: &str) -> Action {
    Action::Print {
        message: message.to_string(),
    }
}

fn launch(program: &str) -> Action {
    Action::Launch {
        program: program.to_string(),
        args: Vec::new(),
    }
}

fn kill(process: &str) -> Action {
    Action::Kill {
        process: process.to_string(),
    }
}

fn media(key: MediaKey) -> Action {
    Action::Media { key }
}

fn apps(platform: Platform) -> Vec<App> {
    let windows = platform == Platform::Windows;
    // (spoken, linux binary, windows start name, windows image, window title)
    let table: [(&str, &str, &str, &str, Option<&str>); 6] = [
        ("chrome", "google-chrome", "chrome", "chrome.exe", Some("Google Chrome")),
        ("notepad", "gnome-text-editor", "notepad", "notepad.exe", Some("Notepad")),
        ("code", "code", "code", "Code.exe", Some("Visual Studio Code")),
        ("spotify", "spotify", "spotify", "Spotify.exe", Some("Spotify")),
        ("discord", "discord", "discord", "Discord.exe", Some("Discord")),
        ("steam", "steam", "steam", "Steam.exe", Some("Steam")),
    ];

    let mut apps: Vec<App> = table
        .into_iter()
        .map(|(spoken, linux, win_start, win_image, window)| App {
            spoken,
            launch: launch(if windows { win_start } else { linux }),
            close: kill(if windows { win_image } else { linux }),
            window,
        })
        .collect();

    // web app: nothing to kill
    apps.insert(
        3,
        App {
            spoken: "habitica",
            launch: Action::Open {
                target: "https://habitica.com".to_string(),
            },
            close: print("Habitica is a web app, no process to close."),
            window: None,
        },
    );
    apps
}

/// The built-in table. Every trigger uses word matching, so "closed" never
/// fires a "close" command.
pub fn default_registry() -> Registry {
    default_registry_for(Platform::current())
}

pub fn default_registry_for(platform: Platform) -> Registry {
    let mut bindings: Vec<(Trigger, Action)> = vec![
        (Trigger::words(["hate", "game"]), Action::CloseWindow),
        (Trigger::words(["clip", "that"]), print("Making a clip...")),
        (
            Trigger::words(["lock", "pc"]),
            Action::Power { op: PowerOp::Lock },
        ),
        (
            Trigger::words(["shut", "down", "pc"]),
            Action::Power {
                op: PowerOp::Shutdown,
            },
        ),
        (
            Trigger::words(["restart", "pc"]),
            Action::Power {
                op: PowerOp::Restart,
            },
        ),
    ];

    let apps = apps(platform);
    for app in &apps {
        bindings.push((Trigger::words(["open", app.spoken]), app.launch.clone()));
        bindings.push((Trigger::words(["close", app.spoken]), app.close.clone()));
    }
    for app in &apps {
        if let Some(window) = app.window {
            bindings.push((
                Trigger::words(["go", "to", app.spoken]),
                Action::Focus {
                    window: window.to_string(),
                },
            ));
        }
    }

    bindings.extend([
        (
            Trigger::words(["google"]).with_guard(Guard::PrefixNotExact {
                prefix: "google".into(),
            }),
            Action::WebSearch,
        ),
        (Trigger::words(["play", "music"]), media(MediaKey::PlayPause)),
        (Trigger::words(["pause", "music"]), media(MediaKey::PlayPause)),
        (Trigger::words(["stop", "music"]), media(MediaKey::PlayPause)),
        (Trigger::words(["next", "song"]), media(MediaKey::Next)),
        (Trigger::words(["skip", "song"]), media(MediaKey::Next)),
        (Trigger::words(["previous", "song"]), media(MediaKey::Previous)),
        (Trigger::words(["last", "song"]), media(MediaKey::Previous)),
        (Trigger::words(["volume", "up"]), media(MediaKey::VolumeUp)),
        (Trigger::words(["volume", "down"]), media(MediaKey::VolumeDown)),
        (Trigger::words(["mute", "music"]), media(MediaKey::Mute)),
        (
            Trigger::words(["spotify", "play", "by"]).with_guard(Guard::Delimited {
                delimiters: vec!["play ".into(), "by ".into()],
            }),
            Action::SpotifyPlayTrack,
        ),
        (Trigger::words(["spotify", "play"]), Action::SpotifyPlayArtist),
        (Trigger::words(["clear", "q"]), Action::SpotifyClearQueue),
        (Trigger::words(["play"]), media(MediaKey::PlayPause)),
        (Trigger::words(["pause"]), media(MediaKey::PlayPause)),
        (Trigger::words(["question"]), Action::AskAi),
        (Trigger::words(["open", "chat"]), Action::AskAi),
    ]);

    let mut registry = Registry::new();
    for (trigger, action) in bindings {
        // the built-in table never has empty triggers
        if let Err(e) = registry.register(trigger, action) {
            warn!("skipping built-in binding: {e}");
        }
    }
    registry
}

/// Parse and validate a JSON command table.
pub fn parse_table(json: &str) -> anyhow::Result<Registry> {
    let table: CommandTable = serde_json::from_str(json).context("invalid command table")?;
    let registry = Registry::from_bindings(table.bindings)
        .map_err(|e: RegistryError| anyhow::anyhow!("invalid command table: {e}"))?;
    Ok(registry)
}

pub fn load_table(path: &Path) -> anyhow::Result<Registry> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_table(&content).with_context(|| format!("Failed to load {}", path.display()))
}

/// The configured table, or the built-in one if none is configured or it
/// fails to load.
pub fn load_registry(path: Option<&Path>) -> Registry {
    let Some(path) = path else {
        return default_registry();
    };
    load_table(path).unwrap_or_else(|e| {
        warn!("{e:#}. Using built-in commands.");
        default_registry()
    })
}

/// One line per binding, in priority order.
pub fn describe(registry: &Registry) -> String {
    let mut out = String::from("Commands (first match wins):\n");
    for (i, binding) in registry.bindings().iter().enumerate() {
        let guard = match &binding.trigger.guard {
            Some(Guard::PrefixNotExact { prefix }) => format!(" [starts with {prefix:?}]"),
            Some(Guard::Delimited { delimiters }) => format!(" [needs {delimiters:?}]"),
            None => String::new(),
        };
        out.push_str(&format!(
            "{:>3}. {:<22} ({:?}){guard} -> {:?}\n",
            i + 1,
            binding.name(),
            binding.trigger.mode,
            binding.action
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::MatchMode;
    use crate::commands::dispatch::Dispatcher;
    use crate::commands::dispatch::tests::RecordingRunner;
    use tempfile::TempDir;

    fn fired(transcript: &str) -> Option<Action> {
        let d = Dispatcher::new(default_registry_for(Platform::Linux), RecordingRunner::default());
        d.dispatch(transcript);
        d.runner().calls().into_iter().next().map(|(a, _)| a)
    }

    #[test]
    fn all_builtins_use_word_mode() {
        let registry = default_registry_for(Platform::Linux);
        assert!(registry.triggers().all(|t| t.mode == MatchMode::Word));
        assert_eq!(registry.bindings()[0].name(), "hate game");
        assert_eq!(registry.bindings().last().unwrap().name(), "open chat");
    }

    #[test]
    fn close_chrome_kills_chrome_only() {
        assert_eq!(fired("close chrome"), Some(kill("google-chrome")));
        assert_eq!(fired("i closed the window"), None);
    }

    #[test]
    fn windows_names() {
        let d = Dispatcher::new(default_registry_for(Platform::Windows), RecordingRunner::default());
        d.dispatch("close code");
        assert_eq!(d.runner().calls()[0].0, kill("Code.exe"));
    }

    #[test]
    fn habitica_is_a_url() {
        assert_eq!(
            fired("open habitica"),
            Some(Action::Open {
                target: "https://habitica.com".into()
            })
        );
        assert!(matches!(fired("close habitica"), Some(Action::Print { .. })));
    }

    #[test]
    fn go_to_focuses_window() {
        assert_eq!(
            fired("go to code"),
            Some(Action::Focus {
                window: "Visual Studio Code".into()
            })
        );
    }

    #[test]
    fn google_needs_a_query() {
        assert_eq!(fired("google weather in oslo"), Some(Action::WebSearch));
        assert_eq!(fired("google"), None);
    }

    #[test]
    fn spotify_priority() {
        assert_eq!(fired("spotify play humble by kendrick"), Some(Action::SpotifyPlayTrack));
        assert_eq!(fired("spotify play kendrick"), Some(Action::SpotifyPlayArtist));
        // guard cannot split, falls through to play-artist
        assert_eq!(fired("spotify play by"), Some(Action::SpotifyPlayArtist));
        // media binding is registered before the spotify ones
        assert_eq!(fired("spotify play music"), Some(media(MediaKey::PlayPause)));
        assert_eq!(fired("play"), Some(media(MediaKey::PlayPause)));
    }

    #[test]
    fn questions_go_to_ai() {
        assert_eq!(fired("question what is rust"), Some(Action::AskAi));
        assert_eq!(fired("open chat"), Some(Action::AskAi));
        // "open chrome" is earlier than "open chat"
        assert_eq!(fired("open chrome chat"), Some(launch("google-chrome")));
    }

    #[test]
    fn hate_game_beats_everything() {
        assert_eq!(fired("i hate this game close steam"), Some(Action::CloseWindow));
    }

    #[test]
    fn parse_json_table() {
        let registry = parse_table(
            r#"{"bindings": [
                {"keywords": ["open", "term"], "action": {"type": "launch", "program": "kitty"}},
                {"keywords": ["lights"], "mode": "substring", "action": {"type": "print", "message": "ok"}, "label": "lights"}
            ]}"#,
        )
        .unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.bindings()[0].trigger.mode, MatchMode::Word);
        assert_eq!(registry.bindings()[1].trigger.mode, MatchMode::Substring);
    }

    #[test]
    fn json_table_rejects_empty_trigger() {
        let err = parse_table(r#"{"bindings": [{"keywords": [], "action": {"type": "close_window"}}]}"#)
            .unwrap_err();
        assert!(err.to_string().contains("no keywords"));
    }

    #[test]
    fn bad_file_falls_back_to_builtins() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("commands.json");
        std::fs::write(&path, "[]").unwrap();
        let registry = load_registry(Some(&path));
        assert_eq!(registry, default_registry());
    }

    #[test]
    fn builtin_table_round_trips_through_json() {
        let registry = default_registry_for(Platform::Linux);
        let table = CommandTable {
            bindings: registry.bindings().to_vec(),
        };
        let json = serde_json::to_string(&table).unwrap();
        assert_eq!(parse_table(&json).unwrap(), registry);
    }

    #[test]
    fn describe_lists_in_order() {
        let text = describe(&default_registry_for(Platform::Linux));
        let first = text.find("hate game").unwrap();
        let last = text.find("open chat").unwrap();
        assert!(first < last);
        assert!(text.contains("[starts with \"google\"]"));
    }
}
