use std::collections::BTreeMap;

use crate::ast::{Document, FootnoteMark, Node, NodeKind, SectionLevel};

/// Cyclic markers for symbol mode; the sequence wraps by modulus.
pub const FOOTNOTE_SYMBOLS: [&str; 9] = ["*", "†", "‡", "§", "¶", "‖", "**", "††", "‡‡"];

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FootnoteStyle {
    #[default]
    Numbered,
    Symbols,
}

/// Symbol for the 1-based footnote `index`.
pub fn footnote_symbol(index: usize) -> &'static str {
    FOOTNOTE_SYMBOLS[(index.max(1) - 1) % FOOTNOTE_SYMBOLS.len()]
}

struct FootnoteRecord {
    mark: FootnoteMark,
    content: Vec<Node>,
}

/// Numbers footnotes per chapter and moves their content into per-chapter
/// lists placed before the next numbered chapter and at the document end.
///
/// Footnotes in unnumbered chapters or sections belong to the nearest
/// preceding numbered chapter; key 0 collects everything before the first.
pub fn place_footnotes(document: &mut Document, style: FootnoteStyle) -> usize {
    let mut collector = Collector {
        style,
        chapter: 0,
        counts: BTreeMap::new(),
        records: BTreeMap::new(),
    };
    collector.visit(&mut document.root);
    let total: usize = collector.counts.values().sum();

    let mut pending = collector.records;
    insert_lists(&mut document.root.children, &mut pending);
    let remaining: Vec<u32> = pending.keys().copied().collect();
    for chapter in remaining {
        if let Some(records) = pending.remove(&chapter) {
            document.root.children.push(footnote_list(chapter, records));
        }
    }
    log::debug!("placed {} footnotes", total);
    total
}

struct Collector {
    style: FootnoteStyle,
    chapter: u32,
    counts: BTreeMap<u32, usize>,
    records: BTreeMap<u32, Vec<FootnoteRecord>>,
}

impl Collector {
    fn visit(&mut self, node: &mut Node) {
        if let Some(chapter) = numbered_chapter(node) {
            self.chapter = chapter;
        }
        if let NodeKind::Footnote { mark } = &mut node.kind {
            let count = self.counts.entry(self.chapter).or_insert(0);
            *count += 1;
            let index = *count;
            let display = match self.style {
                FootnoteStyle::Numbered => index.to_string(),
                FootnoteStyle::Symbols => footnote_symbol(index).to_string(),
            };
            let assigned = FootnoteMark {
                chapter: self.chapter,
                index,
                display,
            };
            *mark = Some(assigned.clone());
            // Nested notes list after the note containing them.
            let records = self.records.entry(self.chapter).or_default();
            let slot = records.len();
            records.push(FootnoteRecord {
                mark: assigned,
                content: Vec::new(),
            });
            let mut content = std::mem::take(&mut node.children);
            for child in &mut content {
                self.visit(child);
            }
            fix_sentence_spacing(&mut content);
            if let Some(record) = self
                .records
                .get_mut(&self.chapter)
                .and_then(|records| records.get_mut(slot))
            {
                record.content = content;
            }
            return;
        }
        for child in &mut node.children {
            self.visit(child);
        }
        fix_sentence_spacing(&mut node.children);
    }
}

fn numbered_chapter(node: &Node) -> Option<u32> {
    match node.kind {
        NodeKind::Sectioning(SectionLevel::Chapter) => node.number.as_deref()?.parse().ok(),
        _ => None,
    }
}

fn insert_lists(children: &mut Vec<Node>, pending: &mut BTreeMap<u32, Vec<FootnoteRecord>>) {
    let mut idx = 0;
    while idx < children.len() {
        if let Some(chapter) = numbered_chapter(&children[idx]) {
            let due: Vec<u32> = pending.range(..chapter).map(|(key, _)| *key).collect();
            for key in due {
                if let Some(records) = pending.remove(&key) {
                    children.insert(idx, footnote_list(key, records));
                    idx += 1;
                }
            }
        }
        if !matches!(children[idx].kind, NodeKind::Footnote { .. }) {
            insert_lists(&mut children[idx].children, pending);
        }
        idx += 1;
    }
}

fn footnote_list(chapter: u32, records: Vec<FootnoteRecord>) -> Node {
    let items = records
        .into_iter()
        .map(|record| {
            Node::with_children(NodeKind::FootnoteItem { mark: record.mark }, record.content)
        })
        .collect();
    Node::with_children(NodeKind::FootnoteList { chapter }, items)
}

/// After a footnote that ends a sentence and is followed by more text, an
/// inter-sentence space marker follows it; otherwise no marker does.
fn fix_sentence_spacing(children: &mut Vec<Node>) {
    let mut idx = 0;
    while idx < children.len() {
        if !matches!(children[idx].kind, NodeKind::Footnote { .. }) {
            idx += 1;
            continue;
        }
        let ends_sentence = idx > 0 && ends_with_sentence(&children[idx - 1]);
        let next_is_marker = children
            .get(idx + 1)
            .map(|next| next.kind == NodeKind::IntersentenceSpace)
            .unwrap_or(false);
        if ends_sentence {
            let more_text = children[idx + 1..].iter().any(|node| match &node.kind {
                NodeKind::Text(text) => !text.trim().is_empty(),
                NodeKind::IntersentenceSpace => false,
                _ => true,
            });
            if more_text && !next_is_marker {
                children.insert(idx + 1, Node::new(NodeKind::IntersentenceSpace));
            }
        } else if next_is_marker {
            children.remove(idx + 1);
        }
        idx += 1;
    }
}

fn ends_with_sentence(node: &Node) -> bool {
    let NodeKind::Text(text) = &node.kind else {
        return false;
    };
    let trimmed = text
        .trim_end()
        .trim_end_matches([')', '\'', '"', '’', '”', ']']);
    trimmed.ends_with(['.', '?', '!'])
}
