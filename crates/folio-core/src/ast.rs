/// A parsed document: the root node owns the whole tree.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub root: Node,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            root: Node::with_children(NodeKind::Document, children),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    pub attrs: Attrs,
    /// Number assigned by the numbering pass (sectioning nodes and floats).
    pub number: Option<String>,
    pub children: Vec<Node>,
}

impl Node {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: Attrs::default(),
            number: None,
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<Node>) -> Self {
        Self {
            children,
            ..Self::new(kind)
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::new(NodeKind::Text(value.into()))
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.attrs.label = Some(label.into());
        self
    }

    pub fn starred(mut self) -> Self {
        self.attrs.starred = true;
        self
    }

    /// Concatenated text of every descendant text node.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// The title child of a sectioning node, if the parser produced one.
    pub fn title(&self) -> Option<&Node> {
        self.children
            .iter()
            .find(|child| child.kind == NodeKind::Title)
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.attrs.classes.iter().any(|value| value == class)
    }

    pub fn add_class(&mut self, class: &str) {
        if !self.has_class(class) {
            self.attrs.classes.push(class.to_string());
        }
    }
}

fn collect_text(node: &Node, out: &mut String) {
    if let NodeKind::Text(text) = &node.kind {
        out.push_str(text);
    }
    for child in &node.children {
        collect_text(child, out);
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Attrs {
    /// Anchor id; assigned by the numbering pass when the parser gives none.
    pub id: Option<String>,
    pub label: Option<String>,
    pub starred: bool,
    /// Provisional sequence id supplied by the structural parser.
    pub seq: Option<String>,
    pub classes: Vec<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum NodeKind {
    Document,
    Frontmatter,
    Mainmatter,
    Sectioning(SectionLevel),
    Title,
    Float(FloatKind),
    Caption,
    Paragraph,
    Text(String),
    Emph,
    Strong,
    InlineCode,
    Span,
    Verbatim,
    CodeBlock,
    InlineMath,
    DisplayMath,
    Url,
    Link {
        href: String,
    },
    Ref {
        target: String,
        style: RefStyle,
        resolved: Option<ResolvedRef>,
        /// Linking phrase merged into the reference, separator included.
        phrase: Option<String>,
    },
    Footnote {
        mark: Option<FootnoteMark>,
    },
    FootnoteList {
        chapter: u32,
    },
    FootnoteItem {
        mark: FootnoteMark,
    },
    IntersentenceSpace,
    LineBreak,
    List {
        ordered: bool,
    },
    Item,
    Graphic {
        src: String,
    },
    TableOfContents,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub enum SectionLevel {
    Chapter,
    Section,
    Subsection,
    Subsubsection,
}

impl SectionLevel {
    pub fn name(self) -> &'static str {
        match self {
            SectionLevel::Chapter => "chapter",
            SectionLevel::Section => "section",
            SectionLevel::Subsection => "subsection",
            SectionLevel::Subsubsection => "subsubsection",
        }
    }

    pub fn heading_tag(self) -> &'static str {
        match self {
            SectionLevel::Chapter => "h1",
            SectionLevel::Section => "h2",
            SectionLevel::Subsection => "h3",
            SectionLevel::Subsubsection => "h4",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum FloatKind {
    Figure,
    Table,
    Equation,
    Aside,
    CodeListing,
}

impl FloatKind {
    pub fn name(self) -> &'static str {
        match self {
            FloatKind::Figure => "figure",
            FloatKind::Table => "table",
            FloatKind::Equation => "equation",
            FloatKind::Aside => "aside",
            FloatKind::CodeListing => "codelisting",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RefStyle {
    Plain,
    Equation,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ResolvedRef {
    pub id: String,
    pub number: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FootnoteMark {
    pub chapter: u32,
    pub index: usize,
    /// Displayed marker: the index, or a symbol in symbol mode.
    pub display: String,
}

impl FootnoteMark {
    pub fn note_id(&self) -> String {
        format!("cha-{}_footnote-{}", self.chapter, self.index)
    }

    pub fn origin_id(&self) -> String {
        format!("cha-{}_footnote-ref-{}", self.chapter, self.index)
    }
}
