use crate::ast::{Document, Node, NodeKind, SectionLevel};
use crate::emit::{escape_attr, render_heading_title};

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TocEntry {
    pub depth: usize,
    pub level: SectionLevel,
    pub id: String,
    pub number: Option<String>,
    pub title_html: String,
}

/// Outline of the finalized tree, in document order.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Toc {
    pub entries: Vec<TocEntry>,
}

impl Toc {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Nested `<ul>` outline. Skipped levels get an empty intermediate item
    /// so every `<ul>` sits inside an `<li>`.
    pub fn to_html(&self) -> String {
        let mut out = String::from("<div id=\"table_of_contents\">\n");
        let mut depth = 0;
        for entry in &self.entries {
            while depth > entry.depth {
                out.push_str("</li>\n</ul>\n");
                depth -= 1;
            }
            if depth == entry.depth && depth > 0 {
                out.push_str("</li>\n");
            }
            while depth < entry.depth {
                out.push_str("<ul>\n");
                depth += 1;
                if depth < entry.depth {
                    out.push_str("<li>\n");
                }
            }
            out.push_str(&format!(
                "<li class=\"{}\"><a href=\"#{}\" class=\"heading\">",
                entry.level.name(),
                escape_attr(&entry.id)
            ));
            if let Some(number) = &entry.number {
                out.push_str(&format!("<span class=\"number\">{}</span> ", number));
            }
            out.push_str(&entry.title_html);
            out.push_str("</a>\n");
        }
        while depth > 0 {
            out.push_str("</li>\n</ul>\n");
            depth -= 1;
        }
        out.push_str("</div>");
        out
    }
}

/// Outline depth of a heading: chapters 1, sections 2, subsections 3.
/// Article mode shifts sections to 1 and leaves chapters out.
fn toc_depth(level: SectionLevel, article: bool) -> Option<usize> {
    match (level, article) {
        (SectionLevel::Chapter, false) => Some(1),
        (SectionLevel::Section, false) => Some(2),
        (SectionLevel::Subsection, false) => Some(3),
        (SectionLevel::Section, true) => Some(1),
        (SectionLevel::Subsection, true) => Some(2),
        _ => None,
    }
}

pub fn build_toc(document: &Document, article: bool) -> Toc {
    let mut toc = Toc::default();
    collect(&document.root, article, &mut toc);
    log::debug!("table of contents has {} entries", toc.entries.len());
    toc
}

fn collect(node: &Node, article: bool, toc: &mut Toc) {
    if let NodeKind::Sectioning(level) = node.kind {
        if let (Some(depth), Some(id)) = (toc_depth(level, article), node.attrs.id.as_ref()) {
            toc.entries.push(TocEntry {
                depth,
                level,
                id: id.clone(),
                number: node.number.clone(),
                title_html: node.title().map(render_heading_title).unwrap_or_default(),
            });
        }
    }
    for child in &node.children {
        collect(child, article, toc);
    }
}

#[cfg(test)]
mod tests {
    use super::{Toc, TocEntry};
    use crate::ast::SectionLevel;

    fn entry(depth: usize, level: SectionLevel, id: &str) -> TocEntry {
        TocEntry {
            depth,
            level,
            id: id.to_string(),
            number: None,
            title_html: id.to_string(),
        }
    }

    #[test]
    fn skipped_level_opens_intermediate_item() {
        let toc = Toc {
            entries: vec![
                entry(1, SectionLevel::Chapter, "a"),
                entry(3, SectionLevel::Subsection, "b"),
            ],
        };
        let html = toc.to_html();
        assert_eq!(html.matches("<ul>").count(), 3);
        assert_eq!(html.matches("</ul>").count(), 3);
        assert_eq!(html.matches("<li").count(), html.matches("</li>").count());
    }
}
