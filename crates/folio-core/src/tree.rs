use roxmltree::Node as XmlNode;

use crate::ast::{Document, FloatKind, Node, NodeKind, RefStyle, SectionLevel};
use crate::error::ParserError;

/// The external structural parser: token-safe text in, tree out.
pub trait StructuralParser {
    fn parse(&self, text: &str) -> Result<Document, ParserError>;
}

/// Parser for text that is already the structural XML.
#[derive(Clone, Copy, Debug, Default)]
pub struct XmlParser;

impl StructuralParser for XmlParser {
    fn parse(&self, text: &str) -> Result<Document, ParserError> {
        parse_xml(text)
    }
}

/// Maps the structural parser's XML output onto the node tree.
///
/// Elements outside the known table become spans carrying the element name
/// as a class, so nothing the parser emits is lost.
pub fn parse_xml(xml: &str) -> Result<Document, ParserError> {
    let parsed = roxmltree::Document::parse(xml).map_err(|err| ParserError::Malformed {
        message: err.to_string(),
    })?;
    let root = parsed.root_element();
    let children = match root.tag_name().name() {
        "document" => convert_children(root),
        _ => convert(root).into_iter().collect(),
    };
    Ok(Document::new(children))
}

fn convert_children(element: XmlNode<'_, '_>) -> Vec<Node> {
    let block = is_block_container(element.tag_name().name());
    element
        .children()
        .filter_map(|child| {
            if child.is_text() {
                let text = child.text().unwrap_or_default();
                if block && text.trim().is_empty() {
                    return None;
                }
                return Some(Node::text(text));
            }
            convert(child)
        })
        .collect()
}

fn convert(element: XmlNode<'_, '_>) -> Option<Node> {
    if !element.is_element() {
        return None;
    }
    let name = element.tag_name().name();
    let kind = match name {
        "frontmatter" => NodeKind::Frontmatter,
        "mainmatter" => NodeKind::Mainmatter,
        "chapter" => NodeKind::Sectioning(SectionLevel::Chapter),
        "section" => NodeKind::Sectioning(SectionLevel::Section),
        "subsection" => NodeKind::Sectioning(SectionLevel::Subsection),
        "subsubsection" => NodeKind::Sectioning(SectionLevel::Subsubsection),
        "title" | "head" => NodeKind::Title,
        "figure" => NodeKind::Float(FloatKind::Figure),
        "table" => NodeKind::Float(FloatKind::Table),
        "equation" | "align" | "gather" | "multline" | "eqnarray" => {
            NodeKind::Float(FloatKind::Equation)
        }
        "aside" => NodeKind::Float(FloatKind::Aside),
        "codelisting" => NodeKind::Float(FloatKind::CodeListing),
        "caption" => NodeKind::Caption,
        "p" => NodeKind::Paragraph,
        "em" | "emph" => NodeKind::Emph,
        "strong" | "textbf" => NodeKind::Strong,
        "tt" | "code" => NodeKind::InlineCode,
        "span" => NodeKind::Span,
        "verbatim" => NodeKind::Verbatim,
        "codeblock" => NodeKind::CodeBlock,
        "math" | "inlinemath" => NodeKind::InlineMath,
        "displaymath" => NodeKind::DisplayMath,
        "url" => NodeKind::Url,
        "a" | "link" => NodeKind::Link {
            href: element.attribute("href").unwrap_or_default().to_string(),
        },
        "ref" | "eqref" => NodeKind::Ref {
            target: element
                .attribute("target")
                .map(str::to_string)
                .unwrap_or_else(|| text_of(element)),
            style: if name == "eqref" {
                RefStyle::Equation
            } else {
                RefStyle::Plain
            },
            resolved: None,
            phrase: None,
        },
        "footnote" => NodeKind::Footnote { mark: None },
        "intersentencespace" => NodeKind::IntersentenceSpace,
        "br" => NodeKind::LineBreak,
        "itemize" | "ul" => NodeKind::List { ordered: false },
        "enumerate" | "ol" => NodeKind::List { ordered: true },
        "item" | "li" => NodeKind::Item,
        "img" | "graphic" => NodeKind::Graphic {
            src: element
                .attribute("src")
                .or_else(|| element.attribute("file"))
                .unwrap_or_default()
                .to_string(),
        },
        "tableofcontents" => NodeKind::TableOfContents,
        _ => NodeKind::Span,
    };

    let mut node = Node::new(kind);
    if node.kind == NodeKind::Span && name != "span" {
        node.add_class(name);
    }
    node.attrs.id = element.attribute("id").map(str::to_string);
    node.attrs.label = element.attribute("label").map(str::to_string);
    node.attrs.starred = matches!(element.attribute("starred"), Some("true" | "yes" | "1"));
    node.attrs.seq = element
        .attribute("seq")
        .or_else(|| element.attribute("id-text"))
        .map(str::to_string);
    if let Some(classes) = element.attribute("class") {
        for class in classes.split_whitespace() {
            node.add_class(class);
        }
    }

    if !matches!(node.kind, NodeKind::Ref { .. }) {
        node.children = convert_children(element);
    }
    Some(node)
}

fn text_of(element: XmlNode<'_, '_>) -> String {
    element
        .descendants()
        .filter(|node| node.is_text())
        .filter_map(|node| node.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn is_block_container(name: &str) -> bool {
    matches!(
        name,
        "document"
            | "frontmatter"
            | "mainmatter"
            | "chapter"
            | "section"
            | "subsection"
            | "subsubsection"
            | "figure"
            | "table"
            | "equation"
            | "aside"
            | "codelisting"
            | "itemize"
            | "enumerate"
            | "ul"
            | "ol"
    )
}

#[cfg(test)]
mod tests {
    use super::parse_xml;
    use crate::ast::{NodeKind, RefStyle, SectionLevel};

    #[test]
    fn maps_known_elements_and_attributes() {
        let document = parse_xml(
            "<document>\n  <chapter label=\"cha:one\"><title>One</title>\n  <p>See <eqref target=\"eq:a\"/>.</p></chapter>\n</document>",
        )
        .unwrap();
        assert_eq!(document.root.children.len(), 1);
        let chapter = &document.root.children[0];
        assert_eq!(chapter.kind, NodeKind::Sectioning(SectionLevel::Chapter));
        assert_eq!(chapter.attrs.label.as_deref(), Some("cha:one"));
        assert_eq!(chapter.children.len(), 2);
        let paragraph = &chapter.children[1];
        match &paragraph.children[1].kind {
            NodeKind::Ref { target, style, .. } => {
                assert_eq!(target, "eq:a");
                assert_eq!(*style, RefStyle::Equation);
            }
            other => panic!("unexpected node {:?}", other),
        }
    }

    #[test]
    fn unknown_elements_become_classed_spans() {
        let document = parse_xml("<document><p><sc>Hi</sc></p></document>").unwrap();
        let span = &document.root.children[0].children[0];
        assert_eq!(span.kind, NodeKind::Span);
        assert!(span.has_class("sc"));
    }

    #[test]
    fn malformed_xml_is_an_error() {
        assert!(parse_xml("<document><p></document>").is_err());
    }
}
