use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::diagnostic::{Diagnostic, W_INCLUDE_FAILED};
use crate::emit::escape_html;
use crate::error::InclusionError;
use crate::scan::{LITERAL_ENVIRONMENTS, begin_marker, end_marker};

static DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*%=\s*<<\((.*)\)\s*$")
        .expect("valid inclusion directive pattern")
});

static GIT_CLAUSE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r",?\s*git:\s*\{\s*tag:\s*([^,}]+?)\s*,\s*repo:\s*([^}]+?)\s*\}")
        .expect("valid git clause pattern")
});

const COMMENT_LEADERS: &[&str] = &["<!--", "/*", "//", "--", "#", "%", ";"];

/// Part of a file selected by a directive.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Subset {
    Whole,
    /// Comma-separated values and ranges, kept as written.
    Lines(String),
    Section(String),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Revision {
    pub tag: String,
    pub repo: String,
}

/// A parsed `%= <<(file[subset], lang: L, options: O, git: {tag: T, repo: R})` line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Directive {
    pub path: String,
    pub subset: Subset,
    pub language: Option<String>,
    pub options: Option<String>,
    pub revision: Option<Revision>,
}

impl Directive {
    /// Returns `None` for lines that are not inclusion directives.
    pub fn parse(line: &str) -> Option<Result<Directive, InclusionError>> {
        let caps = DIRECTIVE.captures(line)?;
        let inner = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        Some(parse_directive_body(inner).ok_or_else(|| InclusionError::MalformedDirective {
            directive: line.trim().to_string(),
        }))
    }
}

fn parse_directive_body(inner: &str) -> Option<Directive> {
    let mut rest = inner.to_string();

    let revision = match GIT_CLAUSE.captures(&rest) {
        Some(caps) => {
            let revision = Revision {
                tag: caps.get(1)?.as_str().to_string(),
                repo: caps.get(2)?.as_str().to_string(),
            };
            let span = caps.get(0)?.range();
            rest.replace_range(span, "");
            Some(revision)
        }
        None => None,
    };

    let options = match rest.find("options:") {
        Some(pos) => {
            let value = rest[pos + "options:".len()..].trim().to_string();
            rest.truncate(pos);
            Some(value).filter(|value| !value.is_empty())
        }
        None => None,
    };

    let (target, attributes) = split_target(&rest)?;
    let mut language = None;
    for attribute in attributes.split(',') {
        let attribute = attribute.trim();
        if attribute.is_empty() {
            continue;
        }
        let value = attribute.strip_prefix("lang:")?.trim();
        if value.is_empty() {
            return None;
        }
        language = Some(value.to_string());
    }

    let (path, subset) = match target.find('[') {
        Some(open) => {
            let close = target.rfind(']')?;
            if close < open || !target[close + 1..].trim().is_empty() {
                return None;
            }
            let selector = target[open + 1..close].trim();
            let subset = if selector.is_empty() {
                Subset::Whole
            } else if selector
                .chars()
                .all(|c| c.is_ascii_digit() || c == ',' || c == '-' || c.is_whitespace())
            {
                Subset::Lines(selector.to_string())
            } else {
                Subset::Section(selector.to_string())
            };
            (target[..open].trim(), subset)
        }
        None => (target.trim(), Subset::Whole),
    };
    if path.is_empty() {
        return None;
    }

    Some(Directive {
        path: path.to_string(),
        subset,
        language,
        options,
        revision,
    })
}

/// Splits `file[subset], rest` at the first comma outside brackets.
fn split_target(text: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    for (idx, ch) in text.char_indices() {
        match ch {
            '[' => depth += 1,
            ']' => depth -= 1,
            ',' if depth == 0 => return Some((&text[..idx], &text[idx + 1..])),
            _ => {}
        }
        if depth < 0 {
            return None;
        }
    }
    Some((text, ""))
}

/// Where included files come from.
pub trait SourceProvider {
    fn read(&self, path: &str) -> Result<String, InclusionError>;
    fn read_at_revision(&self, path: &str, revision: &Revision) -> Result<String, InclusionError>;
}

/// Reads files relative to a root directory; revisions come from `git show`.
#[derive(Clone, Debug)]
pub struct FsSources {
    root: PathBuf,
}

impl FsSources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let candidate = Path::new(path);
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.root.join(candidate)
        }
    }
}

impl SourceProvider for FsSources {
    fn read(&self, path: &str) -> Result<String, InclusionError> {
        fs::read_to_string(self.resolve(path)).map_err(|err| {
            log::debug!("include {} failed: {}", path, err);
            InclusionError::MissingFile {
                path: path.to_string(),
            }
        })
    }

    fn read_at_revision(&self, path: &str, revision: &Revision) -> Result<String, InclusionError> {
        let repo = self.resolve(&revision.repo);
        if !repo.is_dir() {
            return Err(InclusionError::MissingRepository {
                repo: revision.repo.clone(),
            });
        }
        let tag_ok = Command::new("git")
            .arg("-C")
            .arg(&repo)
            .args(["rev-parse", "--verify", "--quiet"])
            .arg(format!("{}^{{commit}}", revision.tag))
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);
        if !tag_ok {
            return Err(InclusionError::MissingTag {
                tag: revision.tag.clone(),
                repo: revision.repo.clone(),
            });
        }
        let output = Command::new("git")
            .arg("-C")
            .arg(&repo)
            .arg("show")
            .arg(format!("{}:{}", revision.tag, path))
            .output()
            .map_err(|_| InclusionError::MissingRepository {
                repo: revision.repo.clone(),
            })?;
        if !output.status.success() {
            return Err(InclusionError::MissingFile {
                path: format!("{}:{}", revision.tag, path),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Selects 1-based lines by a spec such as `5-3, 9, 1`.
///
/// Ranges may run in either direction; zero and numbers past the end are
/// dropped; the written order is kept.
pub fn select_lines<'a>(lines: &[&'a str], spec: &str) -> Vec<&'a str> {
    let mut out = Vec::new();
    let mut push = |number: usize| {
        if number >= 1 && number <= lines.len() {
            out.push(lines[number - 1]);
        }
    };
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        match part.split_once('-') {
            Some((start, end)) => {
                let (Ok(start), Ok(end)) =
                    (start.trim().parse::<usize>(), end.trim().parse::<usize>())
                else {
                    continue;
                };
                if start <= end {
                    (start..=end).for_each(&mut push);
                } else {
                    (end..=start).rev().for_each(&mut push);
                }
            }
            None => {
                if let Ok(number) = part.parse::<usize>() {
                    push(number);
                }
            }
        }
    }
    out
}

/// Lines between the `begin name` comment and its matching `end` comment.
pub fn select_section<'a>(lines: &[&'a str], name: &str) -> Option<Vec<&'a str>> {
    let start = lines
        .iter()
        .position(|line| section_marker(line) == Some(("begin", name)))?;
    let mut depth = 1usize;
    let mut out = Vec::new();
    for line in &lines[start + 1..] {
        match section_marker(line) {
            Some(("begin", _)) => depth += 1,
            Some(("end", _)) => {
                depth -= 1;
                if depth == 0 {
                    return Some(out);
                }
            }
            _ => {}
        }
        out.push(*line);
    }
    // An unclosed section runs to the end of the file.
    Some(out)
}

/// Parses `<leader> begin name` / `<leader> end [name]` comment lines.
fn section_marker(line: &str) -> Option<(&'static str, &str)> {
    let trimmed = line.trim();
    let body = COMMENT_LEADERS
        .iter()
        .find_map(|leader| trimmed.strip_prefix(leader))?;
    let body = body
        .trim()
        .trim_end_matches("-->")
        .trim_end_matches("*/")
        .trim();
    let mut words = body.split_whitespace();
    match words.next()? {
        "begin" => Some(("begin", words.next()?)),
        "end" => Some(("end", words.next().unwrap_or_default())),
        _ => None,
    }
}

/// Highlighter language for a file extension; `text` when unknown.
pub fn language_for_path(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "rb" => "ruby",
        "py" => "python",
        "rs" => "rust",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "c" | "h" => "c",
        "cc" | "cpp" | "hpp" => "cpp",
        "go" => "go",
        "java" => "java",
        "sh" | "bash" => "bash",
        "html" | "htm" => "html",
        "css" => "css",
        "json" => "json",
        "yml" | "yaml" => "yaml",
        "toml" => "toml",
        "md" => "markdown",
        "tex" => "latex",
        "sql" => "sql",
        "hs" => "haskell",
        "ex" | "exs" => "elixir",
        "erb" => "erb",
        _ => "text",
    }
}

/// Resolves one directive to its selected lines.
pub fn resolve_directive(
    directive: &Directive,
    sources: &dyn SourceProvider,
) -> Result<Vec<String>, InclusionError> {
    let text = match &directive.revision {
        Some(revision) => sources.read_at_revision(&directive.path, revision)?,
        None => sources.read(&directive.path)?,
    };
    let lines: Vec<&str> = text.lines().collect();
    let selected = match &directive.subset {
        Subset::Whole => lines,
        Subset::Lines(spec) => select_lines(&lines, spec),
        Subset::Section(name) => {
            select_section(&lines, name).ok_or_else(|| InclusionError::MissingSection {
                section: name.clone(),
                path: directive.path.clone(),
            })?
        }
    };
    Ok(selected.into_iter().map(str::to_string).collect())
}

/// Replaces every inclusion directive outside literal environments with a
/// tagged code block; failures become inline error annotations.
pub fn expand_inclusions(
    source: &str,
    sources: &dyn SourceProvider,
    diagnostics: &mut Vec<Diagnostic>,
) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut literal: Option<(&str, usize)> = None;

    for (idx, line) in source.split('\n').enumerate() {
        if let Some((name, depth)) = literal.as_mut() {
            if begin_marker(line) == Some(*name) {
                *depth += 1;
            } else if end_marker(line) == Some(*name) {
                *depth -= 1;
                if *depth == 0 {
                    literal = None;
                }
            }
            out.push(line.to_string());
            continue;
        }
        if let Some(name) = begin_marker(line) {
            if LITERAL_ENVIRONMENTS.contains(&name) {
                literal = Some((name, 1));
                out.push(line.to_string());
                continue;
            }
        }

        let Some(parsed) = Directive::parse(line) else {
            out.push(line.to_string());
            continue;
        };
        let resolved = parsed.and_then(|directive| {
            resolve_directive(&directive, sources).map(|lines| (directive, lines))
        });
        match resolved {
            Ok((directive, lines)) => {
                let language = directive
                    .language
                    .clone()
                    .unwrap_or_else(|| language_for_path(&directive.path).to_string());
                log::debug!(
                    "included {} lines of {} as {}",
                    lines.len(),
                    directive.path,
                    language
                );
                let mut annotation = format!("%= lang:{}", language);
                if let Some(options) = &directive.options {
                    annotation.push_str(", options: ");
                    annotation.push_str(options);
                }
                out.push(annotation);
                out.push("\\begin{code}".to_string());
                out.extend(lines);
                out.push("\\end{code}".to_string());
            }
            Err(err) => {
                log::warn!("line {}: {}", idx + 1, err);
                diagnostics
                    .push(Diagnostic::warning(W_INCLUDE_FAILED, err.to_string()).at_line(idx + 1));
                out.push(format!(
                    "%= <span class=\"inline_error\">ERROR: {}</span>",
                    escape_html(&err.to_string())
                ));
            }
        }
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{Directive, Subset, section_marker};

    #[test]
    fn directive_with_every_clause() {
        let directive = Directive::parse(
            "%= <<(app/models/user.rb[3-5, 1], lang: ruby, git: {tag: v1.0, repo: sample}, options: \"hl_lines\": [1])",
        )
        .unwrap()
        .unwrap();
        assert_eq!(directive.path, "app/models/user.rb");
        assert_eq!(directive.subset, Subset::Lines("3-5, 1".to_string()));
        assert_eq!(directive.language.as_deref(), Some("ruby"));
        assert_eq!(directive.options.as_deref(), Some("\"hl_lines\": [1]"));
        let revision = directive.revision.unwrap();
        assert_eq!(revision.tag, "v1.0");
        assert_eq!(revision.repo, "sample");
    }

    #[test]
    fn section_selector_is_not_lines() {
        let directive = Directive::parse("%= <<(lib/hello.py[greet])").unwrap().unwrap();
        assert_eq!(directive.subset, Subset::Section("greet".to_string()));
        assert!(Directive::parse("plain text").is_none());
        assert!(Directive::parse("%= <<(file.rb, color: red)").unwrap().is_err());
    }

    #[test]
    fn comment_leaders_mark_sections() {
        assert_eq!(section_marker("  # begin setup"), Some(("begin", "setup")));
        assert_eq!(section_marker("<!-- end setup -->"), Some(("end", "setup")));
        assert_eq!(section_marker("// end"), Some(("end", "")));
        assert_eq!(section_marker("let begin = 1;"), None);
    }
}
