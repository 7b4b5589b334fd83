use std::num::NonZeroUsize;
use std::sync::Mutex;

use folio_core::{HighlightOptions, Highlighter, OutputFormat, markup_verbatim, wrap_html_lines};
use lru::LruCache;
use once_cell::sync::Lazy;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Theme as SyntectTheme, ThemeSet};
use syntect::html::{IncludeBackground, styled_line_to_highlighted_html};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

use crate::Theme;

type CacheKey = (String, String, Theme, String); // (code, language, theme, options)
type Cache = Mutex<LruCache<CacheKey, String>>;

const MEMO_CAPACITY: usize = 256;

static SYNTAX_SET: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);
static THEME_SET: Lazy<ThemeSet> = Lazy::new(ThemeSet::load_defaults);
static HIGHLIGHT_MEMO: Lazy<Cache> = Lazy::new(|| {
    Mutex::new(LruCache::new(
        NonZeroUsize::new(MEMO_CAPACITY).unwrap_or(NonZeroUsize::MIN),
    ))
});

/// Highlighter backed by syntect's bundled grammars and themes.
///
/// HTML output uses inline styles; markup output is left for the
/// downstream typesetter to colour.
#[derive(Debug, Clone, Copy)]
pub struct SyntectHighlighter {
    theme: Theme,
}

impl SyntectHighlighter {
    pub fn new(theme: Theme) -> Self {
        Self { theme }
    }
}

impl Default for SyntectHighlighter {
    fn default() -> Self {
        Self::new(Theme::Light)
    }
}

impl Highlighter for SyntectHighlighter {
    fn highlight(
        &self,
        code: &str,
        language: &str,
        format: OutputFormat,
        options: &HighlightOptions,
    ) -> String {
        if format == OutputFormat::Markup {
            return markup_verbatim(code, options);
        }

        let key = (
            code.to_string(),
            language.to_string(),
            self.theme,
            options.canonical(),
        );
        if let Ok(mut memo) = HIGHLIGHT_MEMO.lock() {
            if let Some(hit) = memo.get(&key) {
                return hit.clone();
            }
        }

        let lines = match pick_theme(self.theme, &THEME_SET) {
            Some(theme) => highlight_lines(code, language, theme),
            None => LinesWithEndings::from(code)
                .map(|line| escape_html_code(line.trim_end_matches('\n')))
                .collect(),
        };
        let html = wrap_html_lines(&lines, language, options);
        if let Ok(mut memo) = HIGHLIGHT_MEMO.lock() {
            memo.put(key, html.clone());
        }
        html
    }
}

fn highlight_lines(code: &str, language: &str, theme: &SyntectTheme) -> Vec<String> {
    let syntax = SYNTAX_SET
        .find_syntax_by_token(language)
        .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text());
    if syntax.name == "Plain Text" && language != "text" {
        log::debug!("no grammar for {}, highlighting as plain text", language);
    }
    let mut highlighter = HighlightLines::new(syntax, theme);
    LinesWithEndings::from(code)
        .map(|line| {
            let html = match highlighter.highlight_line(line, &SYNTAX_SET) {
                Ok(ranges) => styled_line_to_highlighted_html(&ranges, IncludeBackground::No)
                    .unwrap_or_else(|_| escape_html_code(line)),
                Err(_) => escape_html_code(line),
            };
            strip_font_weight(&html.replace('\n', ""))
        })
        .collect()
}

fn pick_theme(theme: Theme, theme_set: &ThemeSet) -> Option<&SyntectTheme> {
    theme
        .highlight_candidates()
        .into_iter()
        .find_map(|name| theme_set.themes.get(name))
        .or_else(|| theme_set.themes.values().next())
}

fn escape_html_code(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
    out
}

fn strip_font_weight(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find("font-weight:") {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos + "font-weight:".len()..];
        let end = match tail.find(';') {
            Some(index) => index + 1,
            None => {
                rest = "";
                break;
            }
        };
        rest = &tail[end..];
    }
    out.push_str(rest);
    out
}
