//! Terminal rendering for model answers.

use std::sync::LazyLock;

use regex::Regex;

const RESET: &str = "\x1b[0m";
const CODE_BLOCK: &str = "\x1b[100;37m";

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

static FENCED: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)```(.*?)```"));
static INLINE_CODE: LazyLock<Regex> = LazyLock::new(|| re(r"`([^`]+)`"));
static H1: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^# (.*?)$"));
static H2: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^## (.*?)$"));
static H3: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^### (.*?)$"));
static ANY_HEADER: LazyLock<Regex> = LazyLock::new(|| re(r"(?m)^#+\s+"));
static BOLD: LazyLock<Regex> = LazyLock::new(|| re(r"\*\*(.*?)\*\*"));
static ITALIC: LazyLock<Regex> = LazyLock::new(|| re(r"\*(.*?)\*"));
static LINK: LazyLock<Regex> = LazyLock::new(|| re(r"\[([^\]]+)\]\([^)]+\)"));

/// Headers in blue/cyan/green, bold, italic as underline, code on a
/// highlighted background.
pub fn markdown_to_ansi(text: &str) -> String {
    // fenced blocks first, the inline pattern would eat their backticks
    let text = FENCED.replace_all(text, format!("{CODE_BLOCK}${{1}}{RESET}"));
    let text = INLINE_CODE.replace_all(&text, format!("\x1b[43;30m ${{1}} {RESET}"));
    let text = H1.replace_all(&text, format!("\x1b[1;34m${{1}}{RESET}"));
    let text = H2.replace_all(&text, format!("\x1b[1;36m${{1}}{RESET}"));
    let text = H3.replace_all(&text, format!("\x1b[1;32m${{1}}{RESET}"));
    let text = BOLD.replace_all(&text, format!("\x1b[1m${{1}}{RESET}"));
    let text = ITALIC.replace_all(&text, format!("\x1b[4m${{1}}{RESET}"));
    text.into_owned()
}

/// Plain text with markdown syntax removed.
pub fn strip_markdown(text: &str) -> String {
    let text = FENCED.replace_all(text, "$1");
    let text = INLINE_CODE.replace_all(&text, "$1");
    let text = ANY_HEADER.replace_all(&text, "");
    let text = BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = LINK.replace_all(&text, "$1");
    text.into_owned()
}

/// Renders a streamed answer one complete line at a time, so markup split
/// across deltas still renders. Tracks fenced blocks across lines.
#[derive(Debug, Default)]
pub struct AnsiLines {
    pending: String,
    in_fence: bool,
}

impl AnsiLines {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta, get back the rendered lines it completed.
    pub fn push(&mut self, delta: &str) -> String {
        self.pending.push_str(delta);
        let mut out = String::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            if let Some(rendered) = self.render_line(line.trim_end_matches('\n')) {
                out.push_str(&rendered);
                out.push('\n');
            }
        }
        out
    }

    /// Render whatever is left after the stream ends.
    pub fn finish(&mut self) -> String {
        let rest = std::mem::take(&mut self.pending);
        let out = self.render_line(&rest).unwrap_or_default();
        self.in_fence = false;
        out
    }

    fn render_line(&mut self, line: &str) -> Option<String> {
        if line.trim_start().starts_with("```") {
            self.in_fence = !self.in_fence;
            return None;
        }
        if self.in_fence {
            Some(format!("{CODE_BLOCK}{line}{RESET}"))
        } else {
            Some(markdown_to_ansi(line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ansi_styles() {
        assert_eq!(markdown_to_ansi("**hi**"), "\x1b[1mhi\x1b[0m");
        assert_eq!(markdown_to_ansi("# Title"), "\x1b[1;34mTitle\x1b[0m");
        assert_eq!(markdown_to_ansi("## Sub"), "\x1b[1;36mSub\x1b[0m");
        assert_eq!(markdown_to_ansi("*soft*"), "\x1b[4msoft\x1b[0m");
        assert_eq!(markdown_to_ansi("use `cargo`"), "use \x1b[43;30m cargo \x1b[0m");
    }

    #[test]
    fn fenced_block_is_not_inline_code() {
        assert_eq!(
            markdown_to_ansi("```let x = 1;```"),
            "\x1b[100;37mlet x = 1;\x1b[0m"
        );
    }

    #[test]
    fn strip_removes_syntax() {
        assert_eq!(
            strip_markdown("## Intro\nUse **bold** and [docs](http://x.y) with `code`"),
            "Intro\nUse bold and docs with code"
        );
        assert_eq!(strip_markdown("```\nfn main() {}\n```"), "\nfn main() {}\n");
    }

    #[test]
    fn stream_renders_whole_lines() {
        let mut lines = AnsiLines::new();
        assert_eq!(lines.push("Hello **wor"), "");
        assert_eq!(lines.push("ld**\nnext"), "Hello \x1b[1mworld\x1b[0m\n");
        assert_eq!(lines.finish(), "next");
    }

    #[test]
    fn stream_tracks_fences() {
        let mut lines = AnsiLines::new();
        let out = lines.push("```rust\nlet x = *p;\n```\n**done**\n");
        assert_eq!(out, "\x1b[100;37mlet x = *p;\x1b[0m\n\x1b[1mdone\x1b[0m\n");
    }
}
