//! OS process and window control through platform tools.
//!
//! Linux: xdg-open, pkill, wmctrl, ydotool, loginctl/systemctl.
//! Windows: cmd start, taskkill, rundll32, shutdown.
//! macOS: open, pkill, osascript, pmset.

use std::process::{Command, Stdio};

use tracing::debug;

use super::{MediaKey, PowerOp};
use crate::error::ActionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Linux,
    Windows,
    MacOs,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }
}

/// A program invocation, built separately from running it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Run to completion and require a zero exit status.
    pub fn run(&self) -> Result<(), ActionError> {
        debug!(program = %self.program, args = ?self.args, "running");
        let output = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .output()
            .map_err(|source| ActionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(ActionError::ExitStatus {
                program: self.program.clone(),
                code: output.status.code(),
            });
        }
        Ok(())
    }

    /// Start without waiting. A reaper thread collects the exit status.
    pub fn spawn_detached(&self) -> Result<(), ActionError> {
        debug!(program = %self.program, args = ?self.args, "spawning");
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // own process group, so it outlives us and ignores our Ctrl-C
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|source| ActionError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

fn unsupported(what: &str, platform: Platform) -> ActionError {
    ActionError::Unsupported(format!("{what} on {platform:?}"))
}

pub fn launch_command(platform: Platform, program: &str, args: &[String]) -> CommandLine {
    match platform {
        Platform::Linux => CommandLine::new(program, args.iter().cloned()),
        Platform::Windows => {
            let mut full = vec!["/C".to_string(), "start".into(), String::new(), program.into()];
            full.extend(args.iter().cloned());
            CommandLine::new("cmd", full)
        }
        Platform::MacOs => {
            let mut full = vec!["-a".to_string(), program.into()];
            if !args.is_empty() {
                full.push("--args".into());
                full.extend(args.iter().cloned());
            }
            CommandLine::new("open", full)
        }
    }
}

pub fn open_command(platform: Platform, target: &str) -> CommandLine {
    match platform {
        Platform::Linux => CommandLine::new("xdg-open", [target]),
        Platform::Windows => CommandLine::new("cmd", ["/C", "start", "", target]),
        Platform::MacOs => CommandLine::new("open", [target]),
    }
}

pub fn kill_command(platform: Platform, process: &str) -> CommandLine {
    match platform {
        Platform::Windows => CommandLine::new("taskkill", ["/f", "/im", process]),
        Platform::Linux | Platform::MacOs => CommandLine::new("pkill", ["-x", process]),
    }
}

pub fn focus_command(platform: Platform, window: &str) -> Result<CommandLine, ActionError> {
    match platform {
        // wmctrl -a picks the first window whose title contains the name
        Platform::Linux => Ok(CommandLine::new("wmctrl", ["-a", window])),
        Platform::MacOs => Ok(CommandLine::new(
            "osascript",
            [
                "-e".to_string(),
                format!("tell application \"{}\" to activate", window.replace('"', "\\\"")),
            ],
        )),
        Platform::Windows => Err(unsupported("window focus", platform)),
    }
}

pub fn power_command(platform: Platform, op: PowerOp) -> CommandLine {
    match (platform, op) {
        (Platform::Linux, PowerOp::Lock) => CommandLine::new("loginctl", ["lock-session"]),
        (Platform::Linux, PowerOp::Shutdown) => CommandLine::new("systemctl", ["poweroff"]),
        (Platform::Linux, PowerOp::Restart) => CommandLine::new("systemctl", ["reboot"]),
        (Platform::Windows, PowerOp::Lock) => {
            CommandLine::new("rundll32.exe", ["user32.dll,LockWorkStation"])
        }
        (Platform::Windows, PowerOp::Shutdown) => CommandLine::new("shutdown", ["/s", "/t", "1"]),
        (Platform::Windows, PowerOp::Restart) => CommandLine::new("shutdown", ["/r", "/t", "1"]),
        (Platform::MacOs, PowerOp::Lock) => CommandLine::new("pmset", ["displaysleepnow"]),
        (Platform::MacOs, PowerOp::Shutdown) => CommandLine::new(
            "osascript",
            ["-e", "tell application \"System Events\" to shut down"],
        ),
        (Platform::MacOs, PowerOp::Restart) => CommandLine::new(
            "osascript",
            ["-e", "tell application \"System Events\" to restart"],
        ),
    }
}

// evdev keycodes for ydotool
const KEY_LEFTALT: u16 = 56;
const KEY_F4: u16 = 62;
const KEY_MUTE: u16 = 113;
const KEY_VOLUMEDOWN: u16 = 114;
const KEY_VOLUMEUP: u16 = 115;
const KEY_NEXTSONG: u16 = 163;
const KEY_PLAYPAUSE: u16 = 164;
const KEY_PREVIOUSSONG: u16 = 165;

/// Press `keys` in order, release in reverse.
fn ydotool_chord(keys: &[u16]) -> CommandLine {
    let presses = keys.iter().map(|k| format!("{k}:1"));
    let releases = keys.iter().rev().map(|k| format!("{k}:0"));
    CommandLine::new(
        "ydotool",
        std::iter::once("key".to_string()).chain(presses).chain(releases),
    )
}

pub fn media_command(platform: Platform, key: MediaKey) -> Result<CommandLine, ActionError> {
    if platform != Platform::Linux {
        return Err(unsupported("media keys", platform));
    }
    let code = match key {
        MediaKey::PlayPause => KEY_PLAYPAUSE,
        MediaKey::Next => KEY_NEXTSONG,
        MediaKey::Previous => KEY_PREVIOUSSONG,
        MediaKey::VolumeUp => KEY_VOLUMEUP,
        MediaKey::VolumeDown => KEY_VOLUMEDOWN,
        MediaKey::Mute => KEY_MUTE,
    };
    Ok(ydotool_chord(&[code]))
}

pub fn close_window_command(platform: Platform) -> Result<CommandLine, ActionError> {
    match platform {
        Platform::Linux => Ok(ydotool_chord(&[KEY_LEFTALT, KEY_F4])),
        _ => Err(unsupported("closing the active window", platform)),
    }
}

pub fn send_media_key(key: MediaKey) -> Result<(), ActionError> {
    media_command(Platform::current(), key)?.run()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_per_platform() {
        let args = vec!["--new-window".to_string()];
        assert_eq!(
            launch_command(Platform::Linux, "google-chrome", &args),
            CommandLine::new("google-chrome", ["--new-window"])
        );
        assert_eq!(
            launch_command(Platform::Windows, "chrome", &[]),
            CommandLine::new("cmd", ["/C", "start", "", "chrome"])
        );
        assert_eq!(
            launch_command(Platform::MacOs, "Safari", &args),
            CommandLine::new("open", ["-a", "Safari", "--args", "--new-window"])
        );
    }

    #[test]
    fn kill_per_platform() {
        assert_eq!(
            kill_command(Platform::Windows, "chrome.exe"),
            CommandLine::new("taskkill", ["/f", "/im", "chrome.exe"])
        );
        assert_eq!(
            kill_command(Platform::Linux, "chrome"),
            CommandLine::new("pkill", ["-x", "chrome"])
        );
    }

    #[test]
    fn focus_quotes_window_name_for_applescript() {
        let cmd = focus_command(Platform::MacOs, "My \"App\"").unwrap();
        assert_eq!(cmd.args[1], "tell application \"My \\\"App\\\"\" to activate");
        assert!(matches!(
            focus_command(Platform::Windows, "Steam"),
            Err(ActionError::Unsupported(_))
        ));
    }

    #[test]
    fn alt_f4_chord_releases_in_reverse() {
        let cmd = close_window_command(Platform::Linux).unwrap();
        assert_eq!(cmd.program, "ydotool");
        assert_eq!(cmd.args, ["key", "56:1", "62:1", "62:0", "56:0"]);
    }

    #[test]
    fn media_keys_use_evdev_codes() {
        let cmd = media_command(Platform::Linux, MediaKey::PlayPause).unwrap();
        assert_eq!(cmd.args, ["key", "164:1", "164:0"]);
        let cmd = media_command(Platform::Linux, MediaKey::VolumeDown).unwrap();
        assert_eq!(cmd.args, ["key", "114:1", "114:0"]);
        assert!(media_command(Platform::Windows, MediaKey::Mute).is_err());
    }

    #[test]
    fn power_commands() {
        assert_eq!(
            power_command(Platform::Windows, PowerOp::Shutdown),
            CommandLine::new("shutdown", ["/s", "/t", "1"])
        );
        assert_eq!(
            power_command(Platform::Linux, PowerOp::Lock),
            CommandLine::new("loginctl", ["lock-session"])
        );
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let cmd = CommandLine::new("garmin-test-no-such-program", Vec::<String>::new());
        assert!(matches!(cmd.run(), Err(ActionError::Spawn { .. })));
    }
}
