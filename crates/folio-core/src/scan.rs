use once_cell::sync::Lazy;
use regex::Regex;

use crate::cache::{CacheKind, CodeKey, LiteralCache};
use crate::error::FatalError;
use crate::highlight::{HighlightOptions, HighlightStore, Highlighter, OutputFormat};

pub(crate) const LITERAL_ENVIRONMENTS: &[&str] = &["verbatim", "Verbatim", "code"];

const MATH_ENVIRONMENTS: &[&str] = &[
    "equation",
    "equation*",
    "align",
    "align*",
    "gather",
    "gather*",
    "multline",
    "multline*",
    "eqnarray",
    "eqnarray*",
];

static LANGUAGE_ANNOTATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*%=\s*lang:\s*([A-Za-z0-9_+#.\-]+)\s*(?:,\s*options:\s*(.*?))?\s*$")
        .expect("valid language annotation pattern")
});

static MATH_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\\label\{([^}]*)\}\s*$")
        .expect("valid math label pattern")
});

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Category {
    Literal,
    Code,
    Math,
}

#[derive(Clone, Debug)]
struct PendingLanguage {
    language: String,
    options: HighlightOptions,
}

/// Replaces every opaque span of `source` with a cache token.
///
/// Environments are scanned line by line with an explicit nesting counter per
/// environment name; inline spans are scanned on the remaining lines.
pub struct Scanner<'a> {
    cache: &'a mut LiteralCache,
    highlighter: &'a dyn Highlighter,
    store: &'a mut HighlightStore,
    format: OutputFormat,
}

impl<'a> Scanner<'a> {
    pub fn new(
        cache: &'a mut LiteralCache,
        highlighter: &'a dyn Highlighter,
        store: &'a mut HighlightStore,
        format: OutputFormat,
    ) -> Self {
        Self {
            cache,
            highlighter,
            store,
            format,
        }
    }

    pub fn scan(&mut self, source: &str) -> Result<String, FatalError> {
        let lines: Vec<&str> = source.split('\n').collect();
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        let mut cursor = 0;
        let mut pending: Option<PendingLanguage> = None;
        let mut listing_depth = 0usize;

        while cursor < lines.len() {
            let line = lines[cursor];
            let line_no = cursor + 1;

            if let Some(annotation) = parse_language_annotation(line, line_no)? {
                pending = Some(annotation);
                cursor += 1;
                continue;
            }
            // An annotation only applies to the line right after it.
            let language = pending.take();

            if let Some(html) = raw_html_line(line) {
                out.push(self.cache.cache(html, CacheKind::RawHtml));
                cursor += 1;
                continue;
            }

            if let Some(name) = begin_marker(line) {
                if name == "codelisting" {
                    listing_depth += 1;
                }
                if let Some(category) = categorize(name, language.is_some()) {
                    let end = find_environment_end(&lines, cursor, name)?;
                    let body = lines[cursor + 1..end].join("\n");
                    match category {
                        Category::Literal => {
                            out.push(line.to_string());
                            out.push(self.cache.cache(&body, CacheKind::Literal));
                            out.push(lines[end].to_string());
                        }
                        Category::Code => {
                            let token = self.cache_code_block(
                                &body,
                                language,
                                listing_depth > 0,
                                line_no,
                            )?;
                            // Markup output is a complete Verbatim environment.
                            if self.format == OutputFormat::Markup {
                                out.push(token);
                            } else {
                                out.push("\\begin{code}".to_string());
                                out.push(token);
                                out.push("\\end{code}".to_string());
                            }
                        }
                        Category::Math => {
                            out.push(line.to_string());
                            out.extend(self.cache_math_block(&lines[cursor + 1..end], name));
                            out.push(lines[end].to_string());
                        }
                    }
                    cursor = end + 1;
                    continue;
                }
                if language.is_some() {
                    log::debug!("language annotation before line {} ignored", line_no);
                }
            }

            if let Some(name) = end_marker(line) {
                if name == "codelisting" {
                    listing_depth = listing_depth.saturating_sub(1);
                }
                if is_cached_environment(name) {
                    return Err(FatalError::UnbalancedEnvironment {
                        name: name.to_string(),
                        line: line_no,
                    });
                }
            }

            if is_comment(line) {
                out.push(line.to_string());
            } else {
                out.push(self.scan_inline(line));
            }
            cursor += 1;
        }

        Ok(out.join("\n"))
    }

    fn cache_code_block(
        &mut self,
        body: &str,
        language: Option<PendingLanguage>,
        in_listing: bool,
        line_no: usize,
    ) -> Result<String, FatalError> {
        let (language, options) = match language {
            Some(pending) => (pending.language, pending.options),
            None => ("text".to_string(), HighlightOptions::default()),
        };
        let available = body.lines().count();
        if let Some(requested) = options.out_of_range(available) {
            return Err(FatalError::HighlightLineOutOfRange {
                requested,
                available,
                line: line_no,
            });
        }

        let highlighted = if options.is_empty() {
            let key = HighlightStore::key(body, &language, self.format);
            match self.store.get(&key) {
                Some(hit) => hit.to_string(),
                None => {
                    let fresh = self
                        .highlighter
                        .highlight(body, &language, self.format, &options);
                    self.store.insert(key, fresh.clone());
                    fresh
                }
            }
        } else {
            self.highlighter
                .highlight(body, &language, self.format, &options)
        };

        let key = CodeKey {
            language: &language,
            format: self.format,
            in_listing,
            options: &options,
        };
        Ok(self.cache.cache_code(body, highlighted, &key))
    }

    fn cache_math_block(&mut self, body: &[&str], environment: &str) -> Vec<String> {
        let mut kept = Vec::with_capacity(body.len());
        let mut label_tokens = Vec::new();
        for line in body {
            match MATH_LABEL.captures(line) {
                Some(caps) => {
                    let label = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                    label_tokens.push(self.cache.cache_label(label));
                }
                None => kept.push(*line),
            }
        }
        let mut out = vec![self.cache.cache_with_context(
            &kept.join("\n"),
            CacheKind::Math,
            environment,
        )];
        out.extend(label_tokens);
        out
    }

    fn scan_inline(&mut self, line: &str) -> String {
        let mut out = String::with_capacity(line.len());
        let mut i = 0;
        while i < line.len() {
            let rest = &line[i..];

            if rest.starts_with("\\\\") || rest.starts_with("\\$") {
                out.push_str(&rest[..2]);
                i += 2;
                continue;
            }
            if let Some((delim, body, consumed)) = verb_span(rest) {
                let token = self.cache.cache(body, CacheKind::Literal);
                out.push_str("\\verb");
                out.push(delim);
                out.push_str(&token);
                out.push(delim);
                i += consumed;
                continue;
            }
            if let Some((open, close, context)) = math_delimiters(rest) {
                if let Some(end) = find_closing(rest, open.len(), close) {
                    let body = &rest[open.len()..end];
                    let token = self.cache.cache_with_context(body, CacheKind::Math, context);
                    out.push_str(open);
                    out.push_str(&token);
                    out.push_str(close);
                    i += end + close.len();
                    continue;
                }
            }
            if let Some(command) = url_command(rest) {
                let open = command.len();
                if let Some(end) = rest[open..].find('}') {
                    let url = &rest[open..open + end];
                    let token = self.cache.cache(url, CacheKind::Url);
                    out.push_str(command);
                    out.push_str(&token);
                    out.push('}');
                    i += open + end + 1;
                    continue;
                }
            }

            let Some(ch) = rest.chars().next() else {
                break;
            };
            if !ch.is_ascii() {
                let run: usize = rest
                    .chars()
                    .take_while(|c| !c.is_ascii())
                    .map(char::len_utf8)
                    .sum();
                out.push_str(&self.cache.cache(&rest[..run], CacheKind::Unicode));
                i += run;
                continue;
            }
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }
}

fn parse_language_annotation(
    line: &str,
    line_no: usize,
) -> Result<Option<PendingLanguage>, FatalError> {
    let Some(caps) = LANGUAGE_ANNOTATION.captures(line) else {
        return Ok(None);
    };
    let language = caps
        .get(1)
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let raw_options = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
    let options = HighlightOptions::parse(raw_options).map_err(|err| {
        FatalError::InvalidHighlightOptions {
            options: raw_options.to_string(),
            line: line_no,
            message: err.to_string(),
        }
    })?;
    Ok(Some(PendingLanguage { language, options }))
}

/// `%= <html>` lines carry raw HTML; `%= lang:` and `%= <<(` are directives.
fn raw_html_line(line: &str) -> Option<&str> {
    let rest = line.trim_start().strip_prefix("%=")?.trim();
    if rest.is_empty() || rest.starts_with("lang:") || rest.starts_with("<<(") {
        return None;
    }
    Some(rest)
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('%') && !trimmed.starts_with("%=")
}

pub(crate) fn begin_marker(line: &str) -> Option<&str> {
    marker(line, "\\begin{")
}

pub(crate) fn end_marker(line: &str) -> Option<&str> {
    marker(line, "\\end{")
}

fn marker<'l>(line: &'l str, prefix: &str) -> Option<&'l str> {
    let rest = line.trim_start().strip_prefix(prefix)?;
    let end = rest.find('}')?;
    Some(&rest[..end])
}

fn categorize(name: &str, tagged: bool) -> Option<Category> {
    if name == "code" || (tagged && LITERAL_ENVIRONMENTS.contains(&name)) {
        Some(Category::Code)
    } else if LITERAL_ENVIRONMENTS.contains(&name) {
        Some(Category::Literal)
    } else if MATH_ENVIRONMENTS.contains(&name) {
        Some(Category::Math)
    } else {
        None
    }
}

fn is_cached_environment(name: &str) -> bool {
    LITERAL_ENVIRONMENTS.contains(&name) || MATH_ENVIRONMENTS.contains(&name)
}

/// Index of the line closing the environment opened at `start`.
///
/// Only markers of the same environment name move the counter, so a block
/// may contain another instance of itself.
pub(crate) fn find_environment_end(
    lines: &[&str],
    start: usize,
    name: &str,
) -> Result<usize, FatalError> {
    let mut depth = 1usize;
    for (idx, line) in lines.iter().enumerate().skip(start + 1) {
        if begin_marker(line) == Some(name) {
            depth += 1;
        } else if end_marker(line) == Some(name) {
            depth -= 1;
            if depth == 0 {
                return Ok(idx);
            }
        }
    }
    Err(FatalError::UnterminatedEnvironment {
        name: name.to_string(),
        line: start + 1,
    })
}

/// `\verb|...|`: returns the delimiter, the body and the consumed length.
fn verb_span(rest: &str) -> Option<(char, &str, usize)> {
    let after = rest.strip_prefix("\\verb")?;
    let after = after.strip_prefix('*').unwrap_or(after);
    let prefix_len = rest.len() - after.len();
    let delim = after.chars().next()?;
    if delim.is_ascii_alphabetic() || delim.is_whitespace() {
        return None;
    }
    let body_start = delim.len_utf8();
    let body_len = after[body_start..].find(delim)?;
    let body = &after[body_start..body_start + body_len];
    Some((delim, body, prefix_len + body_start + body_len + delim.len_utf8()))
}

fn math_delimiters(rest: &str) -> Option<(&'static str, &'static str, &'static str)> {
    if rest.starts_with("\\(") {
        Some(("\\(", "\\)", "inline"))
    } else if rest.starts_with("\\[") {
        Some(("\\[", "\\]", "display"))
    } else if rest.starts_with("$$") {
        Some(("$$", "$$", "display"))
    } else if rest.starts_with('$') {
        Some(("$", "$", "inline"))
    } else {
        None
    }
}

/// Byte offset of the first unescaped `close` after `from`.
fn find_closing(rest: &str, from: usize, close: &str) -> Option<usize> {
    let bytes = rest.as_bytes();
    let close = close.as_bytes();
    let mut idx = from;
    while idx < bytes.len() {
        if bytes[idx] == b'\\' {
            if bytes[idx..].starts_with(close) {
                return Some(idx);
            }
            idx += 2;
            continue;
        }
        if bytes[idx..].starts_with(close) {
            return if idx > from { Some(idx) } else { None };
        }
        idx += 1;
    }
    None
}

fn url_command(rest: &str) -> Option<&'static str> {
    if rest.starts_with("\\url{") {
        Some("\\url{")
    } else if rest.starts_with("\\href{") {
        Some("\\href{")
    } else {
        None
    }
}
