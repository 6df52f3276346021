//! Syntax highlighting for fenced code blocks
//!
//! The syntect syntax and theme sets are expensive to build, so both are
//! loaded once behind `OnceLock` and shared across renders.

use std::sync::OnceLock;
use syntect::{
    easy::HighlightLines,
    highlighting::{Theme, ThemeSet},
    parsing::SyntaxSet,
    util::as_24_bit_terminal_escaped,
};

pub const DEFAULT_THEME: &str = "base16-ocean.dark";

static SYNTAX_SET: OnceLock<SyntaxSet> = OnceLock::new();
static THEME_SET: OnceLock<ThemeSet> = OnceLock::new();

fn syntax_set() -> &'static SyntaxSet {
    SYNTAX_SET.get_or_init(SyntaxSet::load_defaults_newlines)
}

fn theme_set() -> &'static ThemeSet {
    THEME_SET.get_or_init(ThemeSet::load_defaults)
}

pub struct CodeHighlighter {
    theme_name: String,
}

impl CodeHighlighter {
    pub fn new(theme_name: &str) -> Self {
        Self {
            theme_name: theme_name.to_string(),
        }
    }

    fn theme(&self) -> &'static Theme {
        let themes = &theme_set().themes;
        themes
            .get(&self.theme_name)
            .unwrap_or_else(|| &themes[DEFAULT_THEME])
    }

    /// Highlight a code block, returning 24-bit ANSI escaped text ending in
    /// a color reset. Unknown languages fall back to plain text.
    pub fn highlight(&self, code: &str, language: &str) -> String {
        let syntaxes = syntax_set();
        let syntax = syntaxes
            .find_syntax_by_token(language)
            .unwrap_or_else(|| syntaxes.find_syntax_plain_text());

        let mut lines = HighlightLines::new(syntax, self.theme());
        let mut out = String::with_capacity(code.len() * 2);
        for line in code.lines() {
            match lines.highlight_line(line, syntaxes) {
                Ok(ranges) => out.push_str(&as_24_bit_terminal_escaped(&ranges, true)),
                Err(_) => out.push_str(line),
            }
            out.push('\n');
        }
        out.push_str("\x1b[0m");
        out
    }
}

impl Default for CodeHighlighter {
    fn default() -> Self {
        Self::new(DEFAULT_THEME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rust_code_gets_ansi_colors() {
        let highlighted = CodeHighlighter::default().highlight("fn main() {}", "rust");
        assert!(highlighted.contains("\x1b["));
        assert!(highlighted.ends_with("\x1b[0m"));
    }

    #[test]
    fn test_unknown_language_falls_back_to_plain() {
        let highlighted = CodeHighlighter::default().highlight("hello there", "nosuchlang");
        assert!(highlighted.contains("hello there"));
    }

    #[test]
    fn test_unknown_theme_falls_back_to_default() {
        let highlighted = CodeHighlighter::new("nosuchtheme").highlight("x = 1", "py");
        assert!(!highlighted.is_empty());
    }
}
