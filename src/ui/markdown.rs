//! Streaming markdown renderer
//!
//! Assistant replies arrive as text deltas. `MarkdownStreamer` buffers them
//! into complete lines, renders prose through termimad as paragraphs fill
//! in, and collects fenced code blocks so they can be highlighted and boxed
//! once the closing fence arrives.
//!
//! Image-flow replies embed `![alt](url)` markdown. Terminals cannot show
//! the pictures, so image references are rewritten into a labeled link line
//! before rendering.

use super::highlight::CodeHighlighter;
use console::style;
use crossterm::terminal;
use regex::Regex;
use std::io::{self, Write};
use std::sync::OnceLock;
use termimad::crossterm::style::{Attribute, Color};
use termimad::MadSkin;

static SKIN: OnceLock<MadSkin> = OnceLock::new();

fn skin() -> &'static MadSkin {
    SKIN.get_or_init(|| {
        let mut skin = MadSkin::default();
        skin.bold.set_fg(Color::Cyan);
        skin.bold.add_attr(Attribute::Bold);
        skin.italic.set_fg(Color::DarkGrey);
        skin.italic.add_attr(Attribute::Italic);
        skin.inline_code.set_fg(Color::Rgb { r: 220, g: 220, b: 170 });
        skin.inline_code.set_bg(Color::Rgb { r: 40, g: 40, b: 40 });
        skin.headers[0].set_fg(Color::Green);
        skin.headers[0].add_attr(Attribute::Bold);
        skin.headers[1].set_fg(Color::Cyan);
        skin.headers[2].set_fg(Color::Blue);
        skin.bullet = termimad::StyledChar::from_fg_char(Color::Green, '•');
        skin
    })
}

fn terminal_width() -> usize {
    terminal::size().map(|(w, _)| w as usize).unwrap_or(80)
}

/// Replace `![alt](url)` with a link line the terminal can actually use
pub fn rewrite_image_links(text: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"!\[([^\]]*)\]\(([^)]+)\)").expect("invalid image link regex")
    });
    re.replace_all(text, "🖼  **$1**\n$2").to_string()
}

#[derive(Debug, PartialEq)]
enum ParseState {
    Text,
    Code {
        language: String,
        fence: String,
        body: String,
    },
}

/// Chunk-at-a-time markdown renderer for streamed replies
pub struct MarkdownStreamer {
    state: ParseState,
    line_buffer: String,
    text_buffer: String,
    highlighter: CodeHighlighter,
}

impl MarkdownStreamer {
    pub fn new() -> Self {
        Self {
            state: ParseState::Text,
            line_buffer: String::new(),
            text_buffer: String::new(),
            highlighter: CodeHighlighter::default(),
        }
    }

    /// Feed one delta; complete lines are consumed, the rest stays buffered.
    pub fn push(&mut self, chunk: &str) -> io::Result<()> {
        self.line_buffer.push_str(chunk);
        while let Some(pos) = self.line_buffer.find('\n') {
            let line: String = self.line_buffer.drain(..=pos).collect();
            self.consume_line(&line)?;
        }
        Ok(())
    }

    fn consume_line(&mut self, line: &str) -> io::Result<()> {
        match &mut self.state {
            ParseState::Text => {
                if let Some((language, fence)) = parse_fence(line) {
                    self.flush_text()?;
                    self.state = ParseState::Code {
                        language,
                        fence,
                        body: String::new(),
                    };
                } else {
                    self.text_buffer.push_str(line);
                    if self.text_buffer.ends_with("\n\n") || self.text_buffer.len() > 512 {
                        self.flush_text()?;
                    }
                }
            }
            ParseState::Code { fence, body, .. } => {
                if is_closing_fence(line, fence) {
                    let ParseState::Code { language, body, .. } =
                        std::mem::replace(&mut self.state, ParseState::Text)
                    else {
                        unreachable!()
                    };
                    self.print_code_box(&language, &body)?;
                } else {
                    body.push_str(line);
                }
            }
        }
        Ok(())
    }

    fn flush_text(&mut self) -> io::Result<()> {
        if self.text_buffer.is_empty() {
            return Ok(());
        }
        let text = std::mem::take(&mut self.text_buffer);
        let rendered = skin().text(&text, Some(terminal_width().saturating_sub(2)));
        let mut out = io::stdout().lock();
        write!(out, "{}", rendered)?;
        out.flush()
    }

    fn print_code_box(&mut self, language: &str, body: &str) -> io::Result<()> {
        let label = if language.is_empty() { "text" } else { language };
        let box_width = terminal_width().saturating_sub(2).min(80);
        let mut out = io::stdout().lock();

        let rule = "─".repeat(box_width.saturating_sub(label.len() + 4));
        writeln!(out, "{}", style(format!("┌─ {} {}", label, rule)).dim())?;

        let highlighted = self.highlighter.highlight(body.trim_end(), label);
        for line in highlighted.lines() {
            writeln!(out, "{} {}", style("│").dim(), line)?;
        }

        writeln!(out, "{}", style(format!("└{}", "─".repeat(box_width))).dim())?;
        out.flush()
    }

    /// Render whatever remains, including an unclosed code block.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.line_buffer.is_empty() {
            let rest = std::mem::take(&mut self.line_buffer);
            match &mut self.state {
                ParseState::Text => self.text_buffer.push_str(&rest),
                ParseState::Code { body, .. } => body.push_str(&rest),
            }
        }
        self.flush_text()?;
        if let ParseState::Code { language, body, .. } =
            std::mem::replace(&mut self.state, ParseState::Text)
        {
            self.print_code_box(&language, &body)?;
        }
        Ok(())
    }

    pub fn reset(&mut self) {
        self.state = ParseState::Text;
        self.line_buffer.clear();
        self.text_buffer.clear();
    }

    #[cfg(test)]
    fn in_code_block(&self) -> bool {
        matches!(self.state, ParseState::Code { .. })
    }
}

impl Default for MarkdownStreamer {
    fn default() -> Self {
        Self::new()
    }
}

/// Opening fence line -> (language, fence characters)
fn parse_fence(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    let marker = trimmed.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let fence: String = trimmed.chars().take_while(|c| *c == marker).collect();
    if fence.len() < 3 {
        return None;
    }
    let language = trimmed[fence.len()..].trim().to_string();
    Some((language, fence))
}

fn is_closing_fence(line: &str, fence: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with(fence) && trimmed.chars().all(|c| c == '`' || c == '~')
}

/// Render a complete markdown message to stdout, rewriting image references
/// for terminal display.
pub fn print_markdown(text: &str) -> io::Result<()> {
    let prepared = rewrite_image_links(text);
    let rendered = skin().text(&prepared, Some(terminal_width().saturating_sub(2)));
    let mut out = io::stdout().lock();
    write!(out, "{}", rendered)?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fence_variants() {
        assert_eq!(
            parse_fence("```rust"),
            Some(("rust".to_string(), "```".to_string()))
        );
        assert_eq!(
            parse_fence("~~~python"),
            Some(("python".to_string(), "~~~".to_string()))
        );
        assert_eq!(parse_fence("````"), Some((String::new(), "````".to_string())));
        assert_eq!(parse_fence("plain text"), None);
        assert_eq!(parse_fence("``not a fence"), None);
    }

    #[test]
    fn test_closing_fence_matches_opening_length() {
        assert!(is_closing_fence("```", "```"));
        assert!(is_closing_fence("````", "```"));
        assert!(!is_closing_fence("`` ", "```"));
        assert!(!is_closing_fence("```rust", "```"));
    }

    #[test]
    fn test_fence_toggles_code_state() {
        let mut streamer = MarkdownStreamer::new();
        streamer.push("before\n```rust\n").unwrap();
        assert!(streamer.in_code_block());
        streamer.push("let x = 1;\n```\n").unwrap();
        assert!(!streamer.in_code_block());
    }

    #[test]
    fn test_split_chunks_buffer_until_newline() {
        let mut streamer = MarkdownStreamer::new();
        streamer.push("partial li").unwrap();
        streamer.push("ne without end").unwrap();
        assert_eq!(streamer.line_buffer, "partial line without end");
        streamer.push("\n").unwrap();
        assert!(streamer.line_buffer.is_empty());
    }

    #[test]
    fn test_rewrite_image_links() {
        let out = rewrite_image_links("![cats](https://img.example/cat.jpg)");
        assert!(out.contains("**cats**"));
        assert!(out.contains("https://img.example/cat.jpg"));
        assert!(!out.contains("!["));
    }

    #[test]
    fn test_skin_is_shared() {
        assert!(std::ptr::eq(skin(), skin()));
    }
}
