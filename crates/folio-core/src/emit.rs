use std::collections::{HashMap, HashSet};

use ammonia::Builder;

use crate::ast::{Document, FloatKind, Node, NodeKind, RefStyle, SectionLevel};
use crate::labels::LabelDictionary;
use crate::toc::Toc;

/// What the emitter needs besides the tree.
#[derive(Clone, Copy, Debug)]
pub struct EmitContext<'a> {
    pub dictionary: &'a LabelDictionary,
    /// Rendered in place of `tableofcontents` nodes.
    pub toc: Option<&'a Toc>,
}

/// Emits HTML for a numbered, resolved tree. Cache tokens pass through
/// untouched; restoring them is the caller's job.
pub fn emit_html(document: &Document, context: &EmitContext<'_>) -> String {
    // Deterministic formatting: 2-space indentation and LF newlines.
    let mut writer = HtmlWriter::new(context);
    for child in &document.root.children {
        writer.block(child);
    }
    writer.finish()
}

/// Cleans emitted HTML against an allow-list of the markup the emitter and
/// the highlighters produce.
pub fn sanitize_html(html: &str) -> String {
    let tags: HashSet<&'static str> = [
        "a", "br", "code", "div", "em", "h1", "h2", "h3", "h4", "hr", "img", "li", "ol", "p",
        "pre", "span", "strong", "sup", "ul",
    ]
    .iter()
    .copied()
    .collect();

    let mut generic_attributes: HashSet<&'static str> = HashSet::new();
    generic_attributes.insert("class");
    generic_attributes.insert("id");

    let mut tag_attributes = HashMap::new();
    tag_attributes.insert("a", ["href", "title"].iter().copied().collect());
    tag_attributes.insert("img", ["alt", "src"].iter().copied().collect());
    tag_attributes.insert("span", ["style"].iter().copied().collect());

    let mut generic_attribute_prefixes = HashSet::new();
    generic_attribute_prefixes.insert("data-");

    Builder::new()
        .tags(tags)
        .generic_attributes(generic_attributes)
        .tag_attributes(tag_attributes)
        .generic_attribute_prefixes(generic_attribute_prefixes)
        .clean(html)
        .to_string()
}

struct HtmlWriter<'a> {
    out: String,
    indent: usize,
    context: &'a EmitContext<'a>,
}

/// Inline rendering inside a heading or outline entry drops nested links.
#[derive(Clone, Copy, Eq, PartialEq)]
enum RenderContext {
    Normal,
    Heading,
}

impl<'a> HtmlWriter<'a> {
    fn new(context: &'a EmitContext<'a>) -> Self {
        Self {
            out: String::new(),
            indent: 0,
            context,
        }
    }

    fn line(&mut self, line: &str) {
        for _ in 0..self.indent {
            self.out.push_str("  ");
        }
        self.out.push_str(line);
        self.out.push('\n');
    }

    fn finish(mut self) -> String {
        if self.out.ends_with('\n') {
            self.out.pop();
        }
        self.out
    }

    fn children(&mut self, node: &Node) {
        for child in &node.children {
            self.block(child);
        }
    }

    fn open(&mut self, tag: &str, attrs: &str) {
        self.line(&format!("<{}{}>", tag, attrs));
        self.indent += 1;
    }

    fn close(&mut self, tag: &str) {
        self.indent -= 1;
        self.line(&format!("</{}>", tag));
    }

    fn block(&mut self, node: &Node) {
        match &node.kind {
            NodeKind::Frontmatter | NodeKind::Mainmatter => {
                let name = if node.kind == NodeKind::Frontmatter {
                    "frontmatter"
                } else {
                    "mainmatter"
                };
                self.open("div", &format!(" id=\"{}\"", name));
                self.children(node);
                self.close("div");
            }
            NodeKind::Document => self.children(node),
            NodeKind::Sectioning(level) => self.section(node, *level),
            NodeKind::Float(kind) => self.float(node, *kind),
            NodeKind::Title => {}
            NodeKind::Caption => {
                let html = self.inline_children(node, RenderContext::Normal);
                self.line(&format!(
                    "<div class=\"caption\"><span class=\"description\">{}</span></div>",
                    html
                ));
            }
            NodeKind::Paragraph => {
                let html = self.inline_children(node, RenderContext::Normal);
                if !html.trim().is_empty() {
                    self.line(&format!("<p{}>{}</p>", attrs_html(node, None), html));
                }
            }
            NodeKind::Verbatim => {
                let text = node.plain_text();
                self.line(&format!(
                    "<pre class=\"verbatim\">{}</pre>",
                    escape_html(text.trim_matches('\n'))
                ));
            }
            NodeKind::CodeBlock => {
                self.open("div", &attrs_html(node, Some("code")));
                let text = node.plain_text();
                self.line(text.trim_matches('\n'));
                self.close("div");
            }
            NodeKind::DisplayMath => {
                let html = self.inline_children(node, RenderContext::Normal);
                self.line(&format!("<div class=\"equation\">{}</div>", html.trim()));
            }
            NodeKind::List { ordered } => {
                let tag = if *ordered { "ol" } else { "ul" };
                self.open(tag, &attrs_html(node, None));
                for item in &node.children {
                    self.item(item);
                }
                self.close(tag);
            }
            NodeKind::Item => self.item(node),
            NodeKind::TableOfContents => {
                if let Some(toc) = self.context.toc {
                    for line in toc.to_html().lines() {
                        self.line(line);
                    }
                }
            }
            NodeKind::FootnoteList { chapter } => self.footnote_list(node, *chapter),
            NodeKind::FootnoteItem { .. } => {}
            _ => {
                let html = render_inline(node, RenderContext::Normal);
                if !html.trim().is_empty() {
                    self.line(&html);
                }
            }
        }
    }

    fn section(&mut self, node: &Node, level: SectionLevel) {
        let id = node.attrs.id.as_deref().unwrap_or_default();
        self.open("div", &attrs_html(node, Some(level.name())));

        let mut heading = format!(
            "<{}><a href=\"#{}\" class=\"heading\">",
            level.heading_tag(),
            escape_attr(id)
        );
        if let Some(number) = &node.number {
            let badge = match level {
                SectionLevel::Chapter => self.context.dictionary.chapter_badge(number),
                _ => number.clone(),
            };
            heading.push_str(&format!("<span class=\"number\">{}</span> ", escape_html(&badge)));
        }
        if let Some(title) = node.title() {
            heading.push_str(&render_heading_title(title));
        }
        heading.push_str(&format!("</a></{}>", level.heading_tag()));
        self.line(&heading);

        self.children(node);
        self.close("div");
    }

    fn float(&mut self, node: &Node, kind: FloatKind) {
        self.open("div", &attrs_html(node, Some(kind.name())));
        for child in &node.children {
            match child.kind {
                NodeKind::Caption => self.caption(child, node, kind),
                _ => self.block(child),
            }
        }
        if kind == FloatKind::Equation {
            if let Some(number) = &node.number {
                self.line(&format!("<div class=\"equation_number\">({})</div>", number));
            }
        }
        self.close("div");
    }

    fn caption(&mut self, caption: &Node, float: &Node, kind: FloatKind) {
        let description = self.inline_children(caption, RenderContext::Normal);
        let header = match &float.number {
            Some(number) => format!(
                "<span class=\"header\">{} {}</span>",
                escape_html(self.context.dictionary.float_word(kind)),
                number
            ),
            None => String::new(),
        };
        self.line(&format!(
            "<div class=\"caption\">{}<span class=\"description\">{}</span></div>",
            header, description
        ));
    }

    fn item(&mut self, node: &Node) {
        if node.children.iter().all(|child| !is_block(child)) {
            let html = self.inline_children(node, RenderContext::Normal);
            self.line(&format!("<li>{}</li>", html.trim()));
            return;
        }
        self.open("li", "");
        self.children(node);
        self.close("li");
    }

    fn footnote_list(&mut self, node: &Node, chapter: u32) {
        let symbols = node.children.iter().any(|item| match &item.kind {
            NodeKind::FootnoteItem { mark } => mark.display != mark.index.to_string(),
            _ => false,
        });
        self.open("div", &format!(" id=\"cha-{}_footnotes\" class=\"footnotes\"", chapter));
        let class = if symbols {
            "footnotes nonumbers"
        } else {
            "footnotes"
        };
        self.open("ol", &format!(" class=\"{}\"", class));
        for item in &node.children {
            let NodeKind::FootnoteItem { mark } = &item.kind else {
                continue;
            };
            let mut body: Vec<String> = Vec::new();
            for child in &item.children {
                if child.kind == NodeKind::Paragraph {
                    body.push(self.inline_children(child, RenderContext::Normal));
                } else {
                    body.push(render_inline(child, RenderContext::Normal));
                }
            }
            let marker = if symbols {
                format!("<sup>{}</sup> ", escape_html(&mark.display))
            } else {
                String::new()
            };
            self.line(&format!(
                "<li id=\"{}\">{}{} <a class=\"arrow\" href=\"#{}\">↑</a></li>",
                mark.note_id(),
                marker,
                body.concat().trim(),
                mark.origin_id()
            ));
        }
        self.close("ol");
        self.close("div");
    }

    fn inline_children(&self, node: &Node, context: RenderContext) -> String {
        node.children
            .iter()
            .map(|child| render_inline(child, context))
            .collect()
    }
}

fn is_block(node: &Node) -> bool {
    matches!(
        node.kind,
        NodeKind::Document
            | NodeKind::Frontmatter
            | NodeKind::Mainmatter
            | NodeKind::Sectioning(_)
            | NodeKind::Title
            | NodeKind::Float(_)
            | NodeKind::Caption
            | NodeKind::Paragraph
            | NodeKind::Verbatim
            | NodeKind::CodeBlock
            | NodeKind::DisplayMath
            | NodeKind::List { .. }
            | NodeKind::Item
            | NodeKind::TableOfContents
            | NodeKind::FootnoteList { .. }
            | NodeKind::FootnoteItem { .. }
    )
}

/// Inline HTML for a heading title, without nested links.
pub(crate) fn render_heading_title(title: &Node) -> String {
    title
        .children
        .iter()
        .map(|child| render_inline(child, RenderContext::Heading))
        .collect()
}

fn render_inline(node: &Node, context: RenderContext) -> String {
    let inner = || -> String {
        node.children
            .iter()
            .map(|child| render_inline(child, context))
            .collect()
    };
    match &node.kind {
        NodeKind::Text(text) => escape_html(text),
        NodeKind::Emph => format!("<em>{}</em>", inner()),
        NodeKind::Strong => format!("<strong>{}</strong>", inner()),
        NodeKind::InlineCode => format!("<code class=\"tt\">{}</code>", inner()),
        NodeKind::Span => format!("<span{}>{}</span>", attrs_html(node, None), inner()),
        NodeKind::InlineMath => format!("<span class=\"inline_math\">{}</span>", inner()),
        NodeKind::Url => {
            let url = node.plain_text();
            match context {
                RenderContext::Normal => format!(
                    "<a href=\"{}\" class=\"url\">{}</a>",
                    url.trim(),
                    url.trim()
                ),
                RenderContext::Heading => format!("<span class=\"url\">{}</span>", url.trim()),
            }
        }
        NodeKind::Link { href } => match context {
            RenderContext::Normal => format!(
                "<a href=\"{}\"{}>{}</a>",
                escape_attr(href),
                attrs_html(node, None),
                inner()
            ),
            RenderContext::Heading => inner(),
        },
        NodeKind::Ref {
            target,
            style,
            resolved,
            phrase,
        } => {
            let Some(resolved) = resolved else {
                return format!("<span class=\"undefined_ref\">{}</span>", escape_html(target));
            };
            let number = match style {
                RefStyle::Plain => resolved.number.clone(),
                RefStyle::Equation => format!("({})", resolved.number),
            };
            let phrase = phrase.as_deref().map(escape_html).unwrap_or_default();
            let body = format!("{}<span class=\"ref\">{}</span>", phrase, escape_html(&number));
            match context {
                RenderContext::Normal => format!(
                    "<a href=\"#{}\" class=\"hyperref\">{}</a>",
                    escape_attr(&resolved.id),
                    body
                ),
                RenderContext::Heading => body,
            }
        }
        NodeKind::Footnote { mark } => match (mark, context) {
            (_, RenderContext::Heading) => String::new(),
            (Some(mark), RenderContext::Normal) => format!(
                "<sup id=\"{}\" class=\"footnote\"><a href=\"#{}\">{}</a></sup>",
                mark.origin_id(),
                mark.note_id(),
                escape_html(&mark.display)
            ),
            (None, RenderContext::Normal) => {
                format!("<span class=\"footnote\">{}</span>", inner())
            }
        },
        NodeKind::IntersentenceSpace => "<span class=\"intersentencespace\"></span>".to_string(),
        NodeKind::LineBreak => "<br />".to_string(),
        NodeKind::Graphic { src } => format!(
            "<img src=\"{}\" alt=\"{}\" />",
            escape_attr(src),
            escape_attr(src)
        ),
        NodeKind::TableOfContents | NodeKind::FootnoteList { .. } | NodeKind::FootnoteItem { .. } => {
            String::new()
        }
        _ => inner(),
    }
}

fn attrs_html(node: &Node, base_class: Option<&str>) -> String {
    let mut out = String::new();
    if let Some(id) = &node.attrs.id {
        out.push_str(&format!(" id=\"{}\"", escape_attr(id)));
    }
    let mut classes: Vec<&str> = base_class.into_iter().collect();
    classes.extend(node.attrs.classes.iter().map(String::as_str));
    if !classes.is_empty() {
        out.push_str(&format!(" class=\"{}\"", escape_attr(&classes.join(" "))));
    }
    out
}

pub(crate) fn escape_html(text: &str) -> String {
    let mut out = String::new();
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub(crate) fn escape_attr(text: &str) -> String {
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
