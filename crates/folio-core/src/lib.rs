mod ast;
mod cache;
mod diagnostic;
mod emit;
mod error;
mod footnote;
mod highlight;
mod include;
mod labels;
mod numbering;
mod pipeline;
mod resolver;
mod scan;
mod toc;
mod tree;

pub use ast::{
    Attrs, Document, FloatKind, FootnoteMark, Node, NodeKind, RefStyle, ResolvedRef, SectionLevel,
};
pub use cache::{CacheEntry, CacheKind, CodeKey, LiteralCache};
pub use diagnostic::{
    Diagnostic, DiagnosticSeverity, W_HIGHLIGHT_CACHE, W_INCLUDE_FAILED, W_LABEL_DUP,
    W_LINK_UNDEFINED, W_REF_UNDEFINED,
};
pub use emit::{EmitContext, emit_html, sanitize_html};
pub use error::{FatalError, InclusionError, ParserError};
pub use footnote::{FOOTNOTE_SYMBOLS, FootnoteStyle, footnote_symbol, place_footnotes};
pub use highlight::{
    HighlightOptions, HighlightStore, Highlighter, OutputFormat, PlainHighlighter,
    markup_verbatim, wrap_html_lines,
};
pub use include::{
    Directive, FsSources, Revision, SourceProvider, Subset, expand_inclusions,
    language_for_path, resolve_directive, select_lines, select_section,
};
pub use labels::{ChapterLabel, ChapterOrder, LabelDictionary};
pub use numbering::{
    LabelMap, LabelTarget, NumberingContext, NumberingResult, derive_identifier, number_document,
};
pub use pipeline::{Pipeline, PipelineOptions, RenderOutput};
pub use resolver::resolve_references;
pub use scan::Scanner;
pub use toc::{Toc, TocEntry, build_toc};
pub use tree::{StructuralParser, XmlParser, parse_xml};
