use crate::ast::{Document, Node, NodeKind, ResolvedRef};
use crate::cache::LiteralCache;
use crate::diagnostic::{Diagnostic, W_LINK_UNDEFINED, W_REF_UNDEFINED};
use crate::labels::LabelDictionary;
use crate::numbering::LabelMap;

/// Resolves references and `#label` hyperlinks against the label map.
///
/// Runs strictly after numbering. Unknown identifiers never fail the run:
/// they are marked with the `undefined_ref` class and reported. Text and
/// hrefs are matched through `cache`, since the scanner has tokenized URLs
/// and non-ASCII runs.
pub fn resolve_references(
    document: &mut Document,
    labels: &LabelMap,
    dictionary: &LabelDictionary,
    cache: &LiteralCache,
) -> Vec<Diagnostic> {
    let mut resolver = Resolver {
        labels,
        dictionary,
        cache,
        diagnostics: Vec::new(),
    };
    resolver.resolve_node(&mut document.root);
    resolver.diagnostics
}

struct Resolver<'a> {
    labels: &'a LabelMap,
    dictionary: &'a LabelDictionary,
    cache: &'a LiteralCache,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver<'_> {
    fn resolve_node(&mut self, node: &mut Node) {
        let mut undefined = false;
        match &mut node.kind {
            NodeKind::Ref {
                target, resolved, ..
            } => match self.labels.get(target.as_str()) {
                Some(info) => {
                    *resolved = Some(ResolvedRef {
                        id: info.id.clone(),
                        number: info.number.clone(),
                    });
                }
                None => {
                    log::warn!("undefined reference {}", target);
                    self.diagnostics.push(Diagnostic::warning(
                        W_REF_UNDEFINED,
                        format!("reference to undefined label `{}`", target),
                    ));
                    undefined = true;
                }
            },
            NodeKind::Link { href } => {
                let plain = self.cache.plain(href);
                if let Some(label) = plain.strip_prefix('#') {
                    match self.labels.get(label) {
                        Some(info) => *href = format!("#{}", info.id),
                        None => {
                            log::warn!("undefined link target {}", plain);
                            self.diagnostics.push(Diagnostic::warning(
                                W_LINK_UNDEFINED,
                                format!("hyperlink to undefined label `{}`", label),
                            ));
                            undefined = true;
                        }
                    }
                }
            }
            _ => {}
        }
        if undefined {
            node.add_class("undefined_ref");
        }

        for child in &mut node.children {
            self.resolve_node(child);
        }
        self.merge_linking_phrases(&mut node.children);
    }

    /// Moves a dictionary word that directly precedes a resolved reference
    /// into the reference, so both render as one hyperlink.
    fn merge_linking_phrases(&self, children: &mut Vec<Node>) {
        let mut idx = 1;
        while idx < children.len() {
            let resolved = matches!(
                &children[idx].kind,
                NodeKind::Ref {
                    resolved: Some(_),
                    ..
                }
            );
            if !resolved {
                idx += 1;
                continue;
            }
            let split = match &children[idx - 1].kind {
                NodeKind::Text(text) => self
                    .phrase_start(text)
                    .map(|start| (text[..start].to_string(), text[start..].to_string())),
                _ => None,
            };
            let Some((before, phrase)) = split else {
                idx += 1;
                continue;
            };
            if let NodeKind::Ref { phrase: slot, .. } = &mut children[idx].kind {
                *slot = Some(normalize_separator(&phrase));
            }
            if before.is_empty() {
                children.remove(idx - 1);
            } else {
                children[idx - 1].kind = NodeKind::Text(before);
                idx += 1;
            }
        }
    }

    /// Byte offset in `text` where a trailing linking phrase starts. The
    /// phrase is matched on readable text, then mapped back to the token
    /// boundary it starts at.
    fn phrase_start(&self, text: &str) -> Option<usize> {
        let plain = self.cache.plain(text);
        let start = self.dictionary.trailing_phrase(&plain)?;
        let phrase = &plain[start..];
        text.char_indices()
            .rev()
            .map(|(pos, _)| pos)
            .find(|&pos| self.cache.plain(&text[pos..]) == phrase)
    }
}

fn normalize_separator(phrase: &str) -> String {
    match phrase.strip_suffix('~') {
        Some(word) => format!("{}\u{a0}", word),
        None => phrase.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::resolve_references;
    use crate::ast::{Document, Node, NodeKind, RefStyle};
    use crate::cache::{CacheKind, LiteralCache};
    use crate::labels::LabelDictionary;
    use crate::numbering::{LabelMap, LabelTarget};

    fn reference(target: &str) -> Node {
        Node::new(NodeKind::Ref {
            target: target.to_string(),
            style: RefStyle::Plain,
            resolved: None,
            phrase: None,
        })
    }

    #[test]
    fn phrase_joins_resolved_reference() {
        let mut labels = LabelMap::new();
        labels.insert(
            "fig:a".to_string(),
            LabelTarget {
                number: "1.1".to_string(),
                id: "fig:a".to_string(),
                kind: "figure",
            },
        );
        let mut document = Document::new(vec![Node::with_children(
            NodeKind::Paragraph,
            vec![Node::text("see figure~"), reference("fig:a")],
        )]);
        let diagnostics = resolve_references(
            &mut document,
            &labels,
            &LabelDictionary::default(),
            &LiteralCache::new(),
        );
        assert!(diagnostics.is_empty());

        let paragraph = &document.root.children[0];
        assert_eq!(paragraph.children.len(), 2);
        assert_eq!(paragraph.children[0].kind, NodeKind::Text("see ".to_string()));
        match &paragraph.children[1].kind {
            NodeKind::Ref {
                phrase, resolved, ..
            } => {
                assert_eq!(phrase.as_deref(), Some("figure\u{a0}"));
                assert_eq!(resolved.as_ref().map(|r| r.number.as_str()), Some("1.1"));
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn tokenized_phrase_joins_at_token_boundary() {
        let mut cache = LiteralCache::with_salt("salt");
        let prefix = cache.cache("См", CacheKind::Unicode);
        let word = cache.cache("Рисунок", CacheKind::Unicode);
        let mut labels = LabelMap::new();
        labels.insert(
            "fig:a".to_string(),
            LabelTarget {
                number: "1.1".to_string(),
                id: "fig:a".to_string(),
                kind: "figure",
            },
        );
        let mut dictionary = LabelDictionary::default();
        dictionary.figure = "Рисунок".to_string();
        let mut document = Document::new(vec![Node::with_children(
            NodeKind::Paragraph,
            vec![
                Node::text(format!("{}. {} ", prefix, word)),
                reference("fig:a"),
            ],
        )]);
        resolve_references(&mut document, &labels, &dictionary, &cache);

        let paragraph = &document.root.children[0];
        assert_eq!(
            paragraph.children[0].kind,
            NodeKind::Text(format!("{}. ", prefix))
        );
        match &paragraph.children[1].kind {
            NodeKind::Ref { phrase, .. } => {
                assert_eq!(phrase.as_deref(), Some(format!("{} ", word).as_str()))
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn undefined_reference_is_marked() {
        let mut document = Document::new(vec![reference("missing")]);
        let diagnostics = resolve_references(
            &mut document,
            &LabelMap::new(),
            &LabelDictionary::default(),
            &LiteralCache::new(),
        );
        assert_eq!(diagnostics.len(), 1);
        assert!(document.root.children[0].has_class("undefined_ref"));
    }
}
