use std::collections::{HashMap, HashSet};

use crate::ast::{Document, FloatKind, Node, NodeKind, SectionLevel};
use crate::cache::LiteralCache;
use crate::diagnostic::{Diagnostic, W_LABEL_DUP};

const FLOAT_KINDS: [FloatKind; 5] = [
    FloatKind::Figure,
    FloatKind::Table,
    FloatKind::Equation,
    FloatKind::Aside,
    FloatKind::CodeListing,
];

/// Counters for one forward numbering traversal.
///
/// A new chapter resets every other counter, a new section resets the
/// subsection and subsubsection counters, and a new subsection resets the
/// subsubsection counter.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct NumberingContext {
    article: bool,
    chapter: u32,
    section: u32,
    subsection: u32,
    subsubsection: u32,
    floats: [u32; 5],
}

impl NumberingContext {
    pub fn new(article: bool) -> Self {
        Self {
            article,
            ..Self::default()
        }
    }

    pub fn chapter(&self) -> u32 {
        self.chapter
    }

    /// Advances the counter for `level` and returns the new number.
    pub fn enter(&mut self, level: SectionLevel) -> String {
        match level {
            SectionLevel::Chapter => {
                self.chapter += 1;
                self.section = 0;
                self.subsection = 0;
                self.subsubsection = 0;
                self.floats = [0; 5];
            }
            SectionLevel::Section => {
                self.section += 1;
                self.subsection = 0;
                self.subsubsection = 0;
            }
            SectionLevel::Subsection => {
                self.subsection += 1;
                self.subsubsection = 0;
            }
            SectionLevel::Subsubsection => {
                self.subsubsection += 1;
            }
        }
        self.section_number(level)
    }

    pub fn section_number(&self, level: SectionLevel) -> String {
        let parts = match level {
            SectionLevel::Chapter => vec![self.chapter],
            SectionLevel::Section => vec![self.chapter, self.section],
            SectionLevel::Subsection => vec![self.chapter, self.section, self.subsection],
            SectionLevel::Subsubsection => vec![
                self.chapter,
                self.section,
                self.subsection,
                self.subsubsection,
            ],
        };
        if self.article && parts.len() > 1 {
            join_number(&parts[1..])
        } else {
            join_number(&parts)
        }
    }

    /// Numbers the next float of `kind`.
    ///
    /// A provisional parser id is trusted only when it is scoped to the
    /// current chapter and moves the counter forward; numbering then
    /// continues from it.
    pub fn float(&mut self, kind: FloatKind, provisional: Option<&str>) -> String {
        let slot = float_slot(kind);
        let next = self.floats[slot] + 1;
        let trusted = provisional
            .and_then(|seq| self.trusted_ordinal(seq))
            .filter(|&ordinal| ordinal >= next);
        self.floats[slot] = trusted.unwrap_or(next);
        self.float_number(kind)
    }

    pub fn float_number(&self, kind: FloatKind) -> String {
        let ordinal = self.floats[float_slot(kind)];
        if self.article {
            ordinal.to_string()
        } else {
            join_number(&[self.chapter, ordinal])
        }
    }

    fn trusted_ordinal(&self, seq: &str) -> Option<u32> {
        let seq = seq.trim();
        if self.article {
            return seq.parse().ok();
        }
        let (chapter, ordinal) = seq.split_once('.')?;
        if chapter.parse::<u32>().ok()? != self.chapter {
            return None;
        }
        ordinal.parse().ok()
    }
}

fn float_slot(kind: FloatKind) -> usize {
    FLOAT_KINDS
        .iter()
        .position(|candidate| *candidate == kind)
        .unwrap_or_default()
}

fn join_number(parts: &[u32]) -> String {
    parts
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LabelTarget {
    /// Number to display; the heading text for unnumbered sections.
    pub number: String,
    pub id: String,
    pub kind: &'static str,
}

/// Label name to target, built once by the numbering pass.
pub type LabelMap = HashMap<String, LabelTarget>;

#[derive(Clone, Debug, Default)]
pub struct NumberingResult {
    pub labels: LabelMap,
    pub diagnostics: Vec<Diagnostic>,
}

/// Identifier for an unnumbered heading: lower-cased, word characters only.
pub fn derive_identifier(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || *c == '_')
        .flat_map(char::to_lowercase)
        .collect()
}

/// Assigns numbers and anchor ids to every sectioning node and float.
pub fn number_document(
    document: &mut Document,
    cache: &LiteralCache,
    article: bool,
) -> NumberingResult {
    let mut pass = NumberingPass {
        context: NumberingContext::new(article),
        cache,
        article,
        result: NumberingResult::default(),
        ids: HashSet::new(),
        in_frontmatter: false,
    };
    pass.visit(&mut document.root);
    log::debug!(
        "numbered document: {} labels, {} chapters",
        pass.result.labels.len(),
        pass.context.chapter()
    );
    pass.result
}

struct NumberingPass<'a> {
    context: NumberingContext,
    cache: &'a LiteralCache,
    article: bool,
    result: NumberingResult,
    ids: HashSet<String>,
    in_frontmatter: bool,
}

impl NumberingPass<'_> {
    fn visit(&mut self, node: &mut Node) {
        let outer_frontmatter = self.in_frontmatter;
        match node.kind.clone() {
            NodeKind::Frontmatter => self.in_frontmatter = true,
            NodeKind::Mainmatter => self.in_frontmatter = false,
            NodeKind::Sectioning(level) => self.number_section(node, level),
            NodeKind::Float(kind) => self.number_float(node, kind),
            _ => {}
        }
        for child in &mut node.children {
            self.visit(child);
        }
        if node.kind == NodeKind::Frontmatter {
            self.in_frontmatter = outer_frontmatter;
        }
    }

    fn number_section(&mut self, node: &mut Node, level: SectionLevel) {
        let unnumbered = node.attrs.starred
            || self.in_frontmatter
            || (self.article && level == SectionLevel::Chapter);
        let title = node
            .title()
            .map(|title| self.cache.plain(&title.plain_text()))
            .unwrap_or_default();

        if unnumbered {
            node.add_class("unnumbered");
            let id = match (&node.attrs.label, &node.attrs.id) {
                (Some(label), _) => label.clone(),
                (None, Some(id)) => id.clone(),
                (None, None) => self.unique_slug(&title, level.name()),
            };
            self.ids.insert(id.clone());
            node.attrs.id = Some(id.clone());
            self.register(node, title.trim().to_string(), id, level.name());
            return;
        }

        let number = self.context.enter(level);
        let id = self.anchor(node, level.name(), &number);
        node.number = Some(number.clone());
        self.register(node, number, id, level.name());
    }

    fn number_float(&mut self, node: &mut Node, kind: FloatKind) {
        if kind == FloatKind::Equation {
            let lifted = lift_math_labels(node, self.cache);
            if node.attrs.label.is_none() {
                node.attrs.label = lifted.into_iter().next();
            }
        }
        if node.attrs.starred {
            node.add_class("unnumbered");
            if let Some(label) = node.attrs.label.clone() {
                node.attrs.id = Some(label);
            }
            return;
        }
        let number = self.context.float(kind, node.attrs.seq.as_deref());
        let id = self.anchor(node, kind.name(), &number);
        node.number = Some(number.clone());
        self.register(node, number, id, kind.name());
    }

    fn anchor(&mut self, node: &mut Node, kind: &str, number: &str) -> String {
        let id = match (&node.attrs.label, &node.attrs.id) {
            (Some(label), _) => label.clone(),
            (None, Some(id)) => id.clone(),
            (None, None) => format!("{}-{}", kind, number.replace('.', "-")),
        };
        self.ids.insert(id.clone());
        node.attrs.id = Some(id.clone());
        id
    }

    fn unique_slug(&mut self, title: &str, fallback: &str) -> String {
        let mut base = derive_identifier(title);
        if base.is_empty() {
            base = fallback.to_string();
        }
        let mut candidate = base.clone();
        let mut suffix = 2;
        while self.ids.contains(&candidate) {
            candidate = format!("{}-{}", base, suffix);
            suffix += 1;
        }
        candidate
    }

    fn register(&mut self, node: &Node, number: String, id: String, kind: &'static str) {
        let Some(label) = node.attrs.label.clone() else {
            return;
        };
        if self.result.labels.contains_key(&label) {
            log::warn!("duplicate label {}", label);
            self.result.diagnostics.push(Diagnostic::warning(
                W_LABEL_DUP,
                format!("label `{}` is defined more than once; the first definition wins", label),
            ));
            return;
        }
        self.result
            .labels
            .insert(label, LabelTarget { number, id, kind });
    }
}

/// Strips label tokens from the text under `node`, returning the labels.
fn lift_math_labels(node: &mut Node, cache: &LiteralCache) -> Vec<String> {
    let mut labels = Vec::new();
    strip_label_tokens(node, cache, &mut labels);
    labels
}

fn strip_label_tokens(node: &mut Node, cache: &LiteralCache, labels: &mut Vec<String>) {
    if let NodeKind::Text(text) = &mut node.kind {
        let (rest, found) = cache.take_labels(text);
        if !found.is_empty() {
            *text = rest;
            labels.extend(found);
        }
    }
    for child in &mut node.children {
        strip_label_tokens(child, cache, labels);
    }
}
