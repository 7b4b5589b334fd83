use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::cache::digest;
use crate::emit::escape_html;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum OutputFormat {
    Html,
    Markup,
}

impl OutputFormat {
    pub fn name(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Markup => "markup",
        }
    }
}

/// Options attached to a code block with `%= lang:x, options: ...`.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct HighlightOptions {
    pub hl_lines: Vec<u32>,
    pub linenos: bool,
}

impl HighlightOptions {
    /// Parses JSON object members, with or without the surrounding braces.
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }
        if trimmed.starts_with('{') {
            serde_json::from_str(trimmed)
        } else {
            serde_json::from_str(&format!("{{{}}}", trimmed))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.hl_lines.is_empty() && !self.linenos
    }

    /// Stable serialization used in digests.
    pub fn canonical(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Returns the first highlighted line outside `1..=available`.
    pub fn out_of_range(&self, available: usize) -> Option<u32> {
        self.hl_lines
            .iter()
            .copied()
            .find(|&line| line == 0 || line as usize > available)
    }
}

/// Syntax highlighting service. Output is treated as already-safe content.
pub trait Highlighter {
    fn highlight(
        &self,
        code: &str,
        language: &str,
        format: OutputFormat,
        options: &HighlightOptions,
    ) -> String;
}

/// Highlighter without any lexing: escapes the code and marks options only.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlainHighlighter;

impl Highlighter for PlainHighlighter {
    fn highlight(
        &self,
        code: &str,
        language: &str,
        format: OutputFormat,
        options: &HighlightOptions,
    ) -> String {
        match format {
            OutputFormat::Html => {
                let lines: Vec<String> = code.lines().map(escape_html).collect();
                wrap_html_lines(&lines, language, options)
            }
            OutputFormat::Markup => markup_verbatim(code, options),
        }
    }
}

/// Wraps already-rendered lines in the highlight block structure.
pub fn wrap_html_lines(lines: &[String], language: &str, options: &HighlightOptions) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "<div class=\"highlight\" data-lang=\"{}\"><pre>",
        escape_html(language)
    ));
    for (idx, line) in lines.iter().enumerate() {
        let line_no = (idx + 1) as u32;
        if options.linenos {
            out.push_str(&format!("<span class=\"lineno\">{}</span>", line_no));
        }
        if options.hl_lines.contains(&line_no) {
            out.push_str("<span class=\"hll\">");
            out.push_str(line);
            out.push_str("\n</span>");
        } else {
            out.push_str(line);
            out.push('\n');
        }
    }
    out.push_str("</pre></div>");
    out
}

/// Markup rendition of a code block for downstream typesetting.
pub fn markup_verbatim(code: &str, options: &HighlightOptions) -> String {
    let mut settings = Vec::new();
    if options.linenos {
        settings.push("numbers=left".to_string());
    }
    if !options.hl_lines.is_empty() {
        let lines: Vec<String> = options.hl_lines.iter().map(|n| n.to_string()).collect();
        settings.push(format!("highlightlines={{{}}}", lines.join(",")));
    }
    let mut out = String::from("\\begin{Verbatim}");
    if !settings.is_empty() {
        out.push('[');
        out.push_str(&settings.join(","));
        out.push(']');
    }
    out.push('\n');
    out.push_str(code);
    if !code.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("\\end{Verbatim}");
    out
}

/// Highlight results persisted between runs, keyed by
/// `digest(content, language, format)`.
///
/// Read failures are cache misses; concurrent runs may share the file.
#[derive(Clone, Debug, Default)]
pub struct HighlightStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
    dirty: bool,
}

impl HighlightStore {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = read_entries(&path);
        log::debug!(
            "highlight cache {} opened with {} entries",
            path.display(),
            entries.len()
        );
        Self {
            path: Some(path),
            entries,
            dirty: false,
        }
    }

    pub fn key(code: &str, language: &str, format: OutputFormat) -> String {
        digest(&[code, language, format.name()])
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: String, value: String) {
        self.entries.insert(key, value);
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges with whatever is on disk now and atomically rewrites the file.
    pub fn flush(&mut self) -> std::io::Result<()> {
        let Some(path) = self.path.as_ref() else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let mut merged = read_entries(path);
        merged.extend(self.entries.iter().map(|(k, v)| (k.clone(), v.clone())));

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let json = serde_json::to_string(&merged).map_err(std::io::Error::other)?;
        let mut temp = NamedTempFile::new_in(&dir)?;
        temp.write_all(json.as_bytes())?;
        temp.persist(path).map_err(|err| err.error)?;

        self.entries = merged;
        self.dirty = false;
        Ok(())
    }
}

fn read_entries(path: &Path) -> BTreeMap<String, String> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            if err.kind() != std::io::ErrorKind::NotFound {
                log::warn!("highlight cache {} unreadable: {}", path.display(), err);
            }
            return BTreeMap::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(entries) => entries,
        Err(err) => {
            log::warn!("highlight cache {} is corrupt: {}", path.display(), err);
            BTreeMap::new()
        }
    }
}
