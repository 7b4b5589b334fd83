use std::collections::HashMap;

use sha1_smol::Sha1;
use uuid::Uuid;

use crate::emit::{escape_attr, escape_html};
use crate::highlight::{HighlightOptions, OutputFormat};

/// Nested restoration stops after this many rounds.
const MAX_RESTORE_DEPTH: usize = 8;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CacheKind {
    Literal,
    Code,
    Math,
    Unicode,
    Url,
    RawHtml,
}

impl CacheKind {
    pub fn name(self) -> &'static str {
        match self {
            CacheKind::Literal => "literal",
            CacheKind::Code => "code",
            CacheKind::Math => "math",
            CacheKind::Unicode => "unicode",
            CacheKind::Url => "url",
            CacheKind::RawHtml => "raw_html",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CacheEntry {
    pub token: String,
    pub content: String,
    pub kind: CacheKind,
    /// How the span is delimited again on restore: a math environment name,
    /// `inline` or `display`.
    pub context: Option<String>,
}

/// Digest parameters for a highlighted code span.
#[derive(Clone, Debug)]
pub struct CodeKey<'a> {
    pub language: &'a str,
    pub format: OutputFormat,
    pub in_listing: bool,
    pub options: &'a HighlightOptions,
}

/// Per-run store of opaque spans, addressed by salted digest tokens.
#[derive(Clone, Debug)]
pub struct LiteralCache {
    salt: String,
    entries: HashMap<String, CacheEntry>,
    order: Vec<String>,
    labels: HashMap<String, String>,
}

impl Default for LiteralCache {
    fn default() -> Self {
        Self::new()
    }
}

impl LiteralCache {
    pub fn new() -> Self {
        Self::with_salt(Uuid::new_v4().simple().to_string())
    }

    pub fn with_salt(salt: impl Into<String>) -> Self {
        Self {
            salt: salt.into(),
            entries: HashMap::new(),
            order: Vec::new(),
            labels: HashMap::new(),
        }
    }

    pub fn cache(&mut self, content: &str, kind: CacheKind) -> String {
        let token = digest(&[&self.salt, kind.name(), content]);
        self.insert(token, content.to_string(), kind, None)
    }

    pub fn cache_with_context(&mut self, content: &str, kind: CacheKind, context: &str) -> String {
        let token = digest(&[&self.salt, kind.name(), context, content]);
        self.insert(token, content.to_string(), kind, Some(context.to_string()))
    }

    /// Caches highlighted output; the digest covers the source and every
    /// parameter that changes the highlighted result.
    pub fn cache_code(&mut self, source: &str, highlighted: String, key: &CodeKey<'_>) -> String {
        let listing = if key.in_listing { "listing" } else { "bare" };
        let options = key.options.canonical();
        let token = digest(&[
            &self.salt,
            CacheKind::Code.name(),
            source,
            key.language,
            key.format.name(),
            listing,
            &options,
        ]);
        self.insert(token, highlighted, CacheKind::Code, Some(key.language.to_string()))
    }

    /// Side channel for labels found inside math spans.
    pub fn cache_label(&mut self, label: &str) -> String {
        let token = digest(&[&self.salt, "label", label]);
        self.labels.insert(token.clone(), label.to_string());
        token
    }

    fn insert(
        &mut self,
        token: String,
        content: String,
        kind: CacheKind,
        context: Option<String>,
    ) -> String {
        if !self.entries.contains_key(&token) {
            log::debug!("cached {} span as {}", kind.name(), token);
            self.order.push(token.clone());
            self.entries.insert(
                token.clone(),
                CacheEntry {
                    token: token.clone(),
                    content,
                    kind,
                    context,
                },
            );
        }
        token
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.entries.get(token).map(|entry| entry.content.as_str())
    }

    pub fn entry(&self, token: &str) -> Option<&CacheEntry> {
        self.entries.get(token)
    }

    pub fn label(&self, token: &str) -> Option<&str> {
        self.labels.get(token).map(String::as_str)
    }

    /// Entries in the order they were first cached.
    pub fn entries(&self) -> impl Iterator<Item = &CacheEntry> {
        self.order.iter().filter_map(|token| self.entries.get(token))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes label tokens from `text`, returning the remaining text and the
    /// labels in order of appearance.
    pub fn take_labels(&self, text: &str) -> (String, Vec<String>) {
        let mut found: Vec<(usize, &str)> = Vec::new();
        for (token, label) in &self.labels {
            let mut from = 0;
            while let Some(pos) = text[from..].find(token.as_str()) {
                found.push((from + pos, label.as_str()));
                from += pos + token.len();
            }
        }
        if found.is_empty() {
            return (text.to_string(), Vec::new());
        }
        found.sort_by_key(|(pos, _)| *pos);
        let mut remaining = text.to_string();
        for token in self.labels.keys() {
            remaining = remaining.replace(token.as_str(), "");
        }
        let labels = found.into_iter().map(|(_, label)| label.to_string()).collect();
        (remaining, labels)
    }

    /// Text with every token replaced by readable content, for deriving
    /// identifiers. Code and raw HTML are dropped.
    pub fn plain(&self, text: &str) -> String {
        let mut out = text.to_string();
        for token in &self.order {
            if !out.contains(token.as_str()) {
                continue;
            }
            let replacement = match self.entries.get(token) {
                Some(entry) => match entry.kind {
                    CacheKind::Code | CacheKind::RawHtml => "",
                    _ => entry.content.as_str(),
                },
                None => "",
            };
            out = out.replace(token.as_str(), replacement);
        }
        for token in self.labels.keys() {
            out = out.replace(token.as_str(), "");
        }
        out
    }

    /// Substitutes every token in `text` with its content rendered for
    /// `format`, repeating while restored content still contains tokens.
    pub fn restore(&self, text: &str, format: OutputFormat) -> String {
        let mut out = text.to_string();
        for _ in 0..MAX_RESTORE_DEPTH {
            let mut changed = false;
            for token in &self.order {
                if !out.contains(token.as_str()) {
                    continue;
                }
                if let Some(entry) = self.entries.get(token) {
                    out = out.replace(token.as_str(), &render_entry(entry, format));
                    changed = true;
                }
            }
            for (token, label) in &self.labels {
                if !out.contains(token.as_str()) {
                    continue;
                }
                let replacement = match format {
                    OutputFormat::Html => String::new(),
                    OutputFormat::Markup => format!("\\label{{{}}}", label),
                };
                out = out.replace(token.as_str(), &replacement);
                changed = true;
            }
            if !changed {
                break;
            }
        }
        out
    }
}

fn render_entry(entry: &CacheEntry, format: OutputFormat) -> String {
    match format {
        OutputFormat::Markup => match entry.kind {
            CacheKind::RawHtml => format!("%= {}", entry.content),
            _ => entry.content.clone(),
        },
        OutputFormat::Html => match entry.kind {
            CacheKind::Literal => escape_html(&entry.content),
            CacheKind::Url => escape_attr(&entry.content),
            CacheKind::Unicode | CacheKind::Code | CacheKind::RawHtml => entry.content.clone(),
            CacheKind::Math => {
                let body = escape_html(&entry.content);
                match entry.context.as_deref() {
                    Some("inline") | None => format!("\\({}\\)", body),
                    Some("display") => format!("\\[{}\\]", body),
                    Some(env) => format!("\\begin{{{}}}\n{}\n\\end{{{}}}", env, body, env),
                }
            }
        },
    }
}

/// Hex SHA-1 over the NUL-separated parts.
pub(crate) fn digest(parts: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(&[0]);
    }
    hasher.digest().to_string()
}

#[cfg(test)]
mod tests {
    use super::{CacheKind, CodeKey, LiteralCache};
    use crate::highlight::{HighlightOptions, OutputFormat};

    #[test]
    fn same_content_different_kind_gets_different_tokens() {
        let mut cache = LiteralCache::with_salt("salt");
        let literal = cache.cache("x", CacheKind::Literal);
        let url = cache.cache("x", CacheKind::Url);
        assert_ne!(literal, url);
        assert_eq!(cache.get(&literal), Some("x"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn salt_changes_tokens() {
        let mut a = LiteralCache::with_salt("a");
        let mut b = LiteralCache::with_salt("b");
        assert_ne!(
            a.cache("same", CacheKind::Literal),
            b.cache("same", CacheKind::Literal)
        );
    }

    #[test]
    fn code_digest_covers_highlight_parameters() {
        let mut cache = LiteralCache::with_salt("salt");
        let plain = HighlightOptions::default();
        let marked = HighlightOptions {
            hl_lines: vec![1],
            linenos: false,
        };
        let base = CodeKey {
            language: "ruby",
            format: OutputFormat::Html,
            in_listing: false,
            options: &plain,
        };
        let a = cache.cache_code("puts 1", "a".to_string(), &base);
        let b = cache.cache_code(
            "puts 1",
            "b".to_string(),
            &CodeKey {
                in_listing: true,
                ..base.clone()
            },
        );
        let c = cache.cache_code(
            "puts 1",
            "c".to_string(),
            &CodeKey {
                options: &marked,
                ..base.clone()
            },
        );
        let d = cache.cache_code(
            "puts 1",
            "d".to_string(),
            &CodeKey {
                language: "python",
                ..base
            },
        );
        assert_eq!(cache.len(), 4);
        assert!(a != b && b != c && c != d && a != d);
    }

    #[test]
    fn restore_escapes_literals_for_html() {
        let mut cache = LiteralCache::with_salt("salt");
        let token = cache.cache("<b>&</b>", CacheKind::Literal);
        let text = format!("<pre>{}</pre>", token);
        assert_eq!(
            cache.restore(&text, OutputFormat::Html),
            "<pre>&lt;b&gt;&amp;&lt;/b&gt;</pre>"
        );
        assert_eq!(
            cache.restore(&text, OutputFormat::Markup),
            "<pre><b>&</b></pre>"
        );
    }

    #[test]
    fn label_tokens_restore_per_format() {
        let mut cache = LiteralCache::with_salt("salt");
        let token = cache.cache_label("eq:euler");
        let text = format!("a {} b", token);
        assert_eq!(cache.restore(&text, OutputFormat::Html), "a  b");
        assert_eq!(
            cache.restore(&text, OutputFormat::Markup),
            "a \\label{eq:euler} b"
        );
        let (rest, labels) = cache.take_labels(&text);
        assert_eq!(rest, "a  b");
        assert_eq!(labels, vec!["eq:euler".to_string()]);
    }
}
