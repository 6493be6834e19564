//! Question answering through Mistral, shown in its own console.

pub mod markdown;

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, bail};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::actions::system::CommandLine;
use crate::config::{self, Config};
use crate::error::ActionError;
use markdown::AnsiLines;

const CHAT_URL: &str = "https://api.mistral.ai/v1/chat/completions";

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Please format your responses in clean, readable text.
Use minimal markdown - only use **bold** for emphasis and `code` for technical terms.
Avoid complex formatting, tables, or extensive markdown since this will be displayed in a terminal.";

#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: &'static str,
    pub content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    stream: bool,
}

#[derive(Deserialize)]
struct Chunk {
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    delta: Delta,
}

#[derive(Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
}

/// One line of a chat completion stream. Comments, blank lines and chunks
/// without content yield `None`.
pub fn parse_sse_line(line: &str) -> Option<SseEvent> {
    let data = line.strip_prefix("data:")?.trim();
    if data == "[DONE]" {
        return Some(SseEvent::Done);
    }
    let chunk: Chunk = match serde_json::from_str(data) {
        Ok(c) => c,
        Err(e) => {
            debug!("Skipping unparsable stream line: {e}");
            return None;
        }
    };
    let content = chunk.choices.into_iter().next()?.delta.content?;
    (!content.is_empty()).then_some(SseEvent::Delta(content))
}

pub struct MistralClient {
    http: reqwest::blocking::Client,
    api_key: String,
    model: String,
}

impl MistralClient {
    pub fn from_env(config: &Config) -> anyhow::Result<Self> {
        let api_key = config::secret("MISTRAL_API_KEY").context("MISTRAL_API_KEY not set")?;
        let http = reqwest::blocking::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model: config.mistral_model.clone(),
        })
    }

    /// Stream a reply to `history`, calling `on_delta` for each piece of
    /// content. Returns the full reply.
    pub fn stream(
        &self,
        history: &[Message],
        mut on_delta: impl FnMut(&str),
    ) -> anyhow::Result<String> {
        let mut messages = vec![Message {
            role: "system",
            content: SYSTEM_PROMPT.to_string(),
        }];
        messages.extend_from_slice(history);

        let resp = self
            .http
            .post(CHAT_URL)
            .bearer_auth(&self.api_key)
            .json(&ChatRequest {
                model: &self.model,
                messages: &messages,
                stream: true,
            })
            .send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            bail!("Mistral API returned {status}: {body}");
        }

        let mut reply = String::new();
        for line in BufReader::new(resp).lines() {
            match parse_sse_line(&line?) {
                Some(SseEvent::Delta(text)) => {
                    on_delta(&text);
                    reply.push_str(&text);
                }
                Some(SseEvent::Done) => break,
                None => {}
            }
        }
        Ok(reply)
    }
}

fn title_case(text: &str) -> String {
    text.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn read_line() -> String {
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
    line.trim().to_string()
}

/// Interactive console: answer, then offer a follow-up until an empty line.
pub fn ask_console(config: &Config, question: &str) -> anyhow::Result<()> {
    let client = match MistralClient::from_env(config) {
        Ok(c) => c,
        Err(e) => {
            println!("Error calling Mistral API: {e:#}");
            println!("Press Enter to exit");
            read_line();
            return Err(e);
        }
    };

    let mut history = Vec::new();
    let mut question = question.trim().to_string();
    while !question.is_empty() {
        println!("\nAsking Mistral: {}", title_case(&question));
        println!("{}", "-".repeat(50));
        history.push(Message {
            role: "user",
            content: question,
        });

        let mut lines = AnsiLines::new();
        let mut stdout = std::io::stdout();
        let result = client.stream(&history, |delta| {
            let _ = write!(stdout, "{}", lines.push(delta));
            let _ = stdout.flush();
        });
        print!("{}", lines.finish());

        match result {
            Ok(reply) => {
                history.push(Message {
                    role: "assistant",
                    content: reply,
                });
                println!("\n{}", "-".repeat(50));
                println!("Response complete.");
                println!("Ask another question or Enter to exit.");
            }
            Err(e) => {
                history.pop();
                println!("\nError calling Mistral API: {e:#}");
                println!("Press Enter to exit or type another question.");
            }
        }
        question = read_line();
    }
    Ok(())
}

/// `<terminal...> <exe> ask <question>`
pub fn handoff_command(terminal: &[String], exe: &Path, question: &str) -> CommandLine {
    let exe = exe.to_string_lossy().into_owned();
    let mut argv: Vec<String> = terminal.to_vec();
    argv.extend([exe, "ask".to_string(), question.to_string()]);
    let program = argv.remove(0);
    CommandLine::new(&program, argv)
}

/// Open the AI console for `question` in a new terminal and return at once.
pub fn handoff(terminal: &[String], question: &str) -> Result<(), ActionError> {
    let exe = std::env::current_exe()
        .map_err(|e| ActionError::Ai(format!("cannot locate own executable: {e}")))?;
    handoff_command(terminal, &exe, question).spawn_detached()
}
