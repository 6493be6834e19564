mod actions;
mod ai;
mod audio;
mod commands;
mod config;
mod error;
mod mood;
mod presentation;
mod spotify;
mod transcribe;
mod transcript;
mod ui;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use actions::Desktop;
use audio::listener::Listener;
use commands::dispatch::{Dispatcher, Outcome};
use commands::table;
use config::{Config, RecognizerKind};
use presentation::{LogSink, MoodSink, PresentationLoop};
use transcript::{TranscriptSlot, TranscriptSource};

#[derive(Parser)]
#[command(name = "garmin", about = "Garmin, a voice-driven desktop assistant")]
struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Whisper model file
    #[arg(short, long, global = true)]
    model: Option<PathBuf>,

    #[arg(long, global = true)]
    lang: Option<String>,

    #[arg(long, global = true, value_enum)]
    recognizer: Option<RecognizerKind>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Avatar, listener and command dispatch
    Run,
    /// Headless listening
    Listen {
        /// Print transcripts instead of running commands
        #[arg(long)]
        dry_run: bool,
        /// Seconds of silence that end an utterance
        #[arg(long)]
        pause: Option<f32>,
        /// Seconds of speech needed to start an utterance
        #[arg(long)]
        phrase: Option<f32>,
    },
    /// Ask the AI a question in this terminal
    Ask {
        #[arg(required = true, trailing_var_arg = true)]
        question: Vec<String>,
    },
    /// Authorize Spotify playback control
    SpotifyAuth,
    /// Print the command table in priority order
    Commands,
    /// Dispatch a typed transcript once
    Dispatch {
        #[arg(required = true, trailing_var_arg = true)]
        text: Vec<String>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "garmin=debug" } else { "garmin=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    dotenvy::dotenv().ok();

    let mut config = Config::load();
    if let Some(model) = cli.model {
        config.model_path = model;
    }
    if let Some(lang) = cli.lang {
        config.language = lang;
    }
    if let Some(recognizer) = cli.recognizer {
        config.recognizer = recognizer;
    }

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run(config),
        Commands::Listen {
            dry_run,
            pause,
            phrase,
        } => {
            if let Some(pause) = pause {
                config.listen.pause_threshold = pause;
            }
            if let Some(phrase) = phrase {
                config.listen.phrase_threshold = phrase;
            }
            listen(config, dry_run)
        }
        Commands::Ask { question } => ai::ask_console(&config, &question.join(" ")),
        Commands::SpotifyAuth => {
            let client = spotify::SpotifyClient::from_env(&config)
                .context("SPOTIFY_API_KEY not set")?;
            client.authorize()?;
            println!("Spotify authorized.");
            Ok(())
        }
        Commands::Commands => {
            let registry = table::load_registry(config.commands_file.as_deref());
            print!("{}", table::describe(&registry));
            Ok(())
        }
        Commands::Dispatch { text } => dispatch_once(&config, &typed_transcript(&text)?),
    }
}

fn dispatcher(config: &Config) -> Dispatcher<Desktop> {
    let registry = table::load_registry(config.commands_file.as_deref());
    info!("{} commands loaded", registry.len());
    Dispatcher::new(registry, Desktop::new(config))
}

fn poll_interval(config: &Config) -> Duration {
    Duration::from_millis(config.poll_interval_ms.max(1))
}

/// Start recognition feeding the transcript source, plus the presentation
/// loop on `sink`.
fn start<S: MoodSink + 'static>(
    config: &Config,
    sink: S,
) -> anyhow::Result<(Listener, PresentationLoop)> {
    let slot = TranscriptSlot::new();
    let source = TranscriptSource::new(slot.clone(), dispatcher(config));
    let recognizer = transcribe::build(config)?;
    let listener = Listener::spawn(config.listen.clone(), recognizer, move |result| {
        source.on_utterance(result);
    })?;
    let presentation = PresentationLoop::spawn(slot, sink, poll_interval(config));
    Ok((listener, presentation))
}

#[cfg(feature = "avatar")]
fn run(config: Config) -> anyhow::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let (listener, presentation) = start(&config, presentation::ChannelSink(tx))?;
    ui::avatar::run_avatar(config.avatar.clone(), rx)?;
    presentation.stop();
    listener.stop();
    Ok(())
}

#[cfg(not(feature = "avatar"))]
fn run(config: Config) -> anyhow::Result<()> {
    info!("Built without the avatar, running headless");
    listen(config, false)
}

fn listen(config: Config, dry_run: bool) -> anyhow::Result<()> {
    let _running = if dry_run {
        let recognizer = transcribe::build(&config)?;
        let listener = Listener::spawn(config.listen.clone(), recognizer, |result| match result {
            Ok(text) => println!("{text}"),
            Err(e) => tracing::debug!("{e}"),
        })?;
        (listener, None)
    } else {
        let (listener, presentation) = start(&config, LogSink)?;
        (listener, Some(presentation))
    };
    println!("Listening. Ctrl-C to exit.");
    loop {
        std::thread::park();
    }
}

/// Typed words normalized the same way as recognizer output.
fn typed_transcript(words: &[String]) -> anyhow::Result<String> {
    transcribe::postprocess(&words.join(" ")).context("nothing to dispatch")
}

fn dispatch_once(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("mood: {}", mood::classify(text));
    match dispatcher(config).fire(text) {
        Some(fired) => match fired.outcome {
            Outcome::Succeeded => println!("{}: done", fired.name),
            Outcome::Failed(reason) => println!("{}: failed: {reason}", fired.name),
        },
        None => println!("no command matched"),
    }
    Ok(())
}
