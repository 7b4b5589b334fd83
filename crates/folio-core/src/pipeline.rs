use std::path::PathBuf;

use crate::cache::LiteralCache;
use crate::diagnostic::{Diagnostic, W_HIGHLIGHT_CACHE};
use crate::emit::{EmitContext, emit_html, sanitize_html};
use crate::error::FatalError;
use crate::footnote::{FootnoteStyle, place_footnotes};
use crate::highlight::{HighlightStore, Highlighter, OutputFormat, PlainHighlighter};
use crate::include::{FsSources, SourceProvider, expand_inclusions};
use crate::labels::LabelDictionary;
use crate::numbering::number_document;
use crate::resolver::resolve_references;
use crate::scan::Scanner;
use crate::toc::build_toc;
use crate::tree::StructuralParser;

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    pub format: OutputFormat,
    /// Sections are the top level; chapters are not numbered.
    pub article: bool,
    pub footnotes: FootnoteStyle,
    pub sanitize: bool,
    pub dictionary: LabelDictionary,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            format: OutputFormat::Html,
            article: false,
            footnotes: FootnoteStyle::Numbered,
            sanitize: false,
            dictionary: LabelDictionary::default(),
        }
    }
}

impl PipelineOptions {
    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_article(mut self, article: bool) -> Self {
        self.article = article;
        self
    }

    pub fn with_footnotes(mut self, footnotes: FootnoteStyle) -> Self {
        self.footnotes = footnotes;
        self
    }

    pub fn with_sanitize(mut self, sanitize: bool) -> Self {
        self.sanitize = sanitize;
        self
    }

    pub fn with_dictionary(mut self, dictionary: LabelDictionary) -> Self {
        self.dictionary = dictionary;
        self
    }
}

#[derive(Clone, Debug, Default)]
pub struct RenderOutput {
    /// HTML body, or re-serialized markup in markup mode.
    pub body: String,
    /// Outline HTML; `None` in markup mode.
    pub toc: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// One conversion run. Caches and counters live only for the duration of
/// [`Pipeline::run`]; the highlight store is flushed at the end of each run.
pub struct Pipeline {
    options: PipelineOptions,
    highlighter: Box<dyn Highlighter>,
    sources: Box<dyn SourceProvider>,
    store: HighlightStore,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            highlighter: Box::new(PlainHighlighter),
            sources: Box::new(FsSources::new(PathBuf::from("."))),
            store: HighlightStore::in_memory(),
        }
    }

    pub fn with_highlighter(mut self, highlighter: impl Highlighter + 'static) -> Self {
        self.highlighter = Box::new(highlighter);
        self
    }

    pub fn with_sources(mut self, sources: impl SourceProvider + 'static) -> Self {
        self.sources = Box::new(sources);
        self
    }

    pub fn with_highlight_store(mut self, store: HighlightStore) -> Self {
        self.store = store;
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    pub fn run(
        &mut self,
        source: &str,
        parser: &dyn StructuralParser,
    ) -> Result<RenderOutput, FatalError> {
        let format = self.options.format;
        let mut diagnostics = Vec::new();

        log::info!("expanding code inclusions");
        let expanded = expand_inclusions(source, self.sources.as_ref(), &mut diagnostics);

        log::info!("caching literal content");
        let mut cache = LiteralCache::new();
        let scanned = Scanner::new(
            &mut cache,
            self.highlighter.as_ref(),
            &mut self.store,
            format,
        )
        .scan(&expanded)?;
        log::debug!("{} spans cached", cache.len());

        if format == OutputFormat::Markup {
            let body = cache.restore(&scanned, OutputFormat::Markup);
            self.flush_store(&mut diagnostics);
            return Ok(RenderOutput {
                body,
                toc: None,
                diagnostics,
            });
        }

        log::info!("running structural parser");
        let mut document = parser.parse(&scanned)?;

        log::info!("numbering");
        let numbering = number_document(&mut document, &cache, self.options.article);
        diagnostics.extend(numbering.diagnostics);

        log::info!("resolving cross-references");
        diagnostics.extend(resolve_references(
            &mut document,
            &numbering.labels,
            &self.options.dictionary,
            &cache,
        ));

        log::info!("placing footnotes");
        place_footnotes(&mut document, self.options.footnotes);

        log::info!("building table of contents");
        let toc = build_toc(&document, self.options.article);

        log::info!("emitting html");
        let html = emit_html(
            &document,
            &EmitContext {
                dictionary: &self.options.dictionary,
                toc: Some(&toc),
            },
        );
        let mut body = cache.restore(&html, OutputFormat::Html);
        let mut toc_html = cache.restore(&toc.to_html(), OutputFormat::Html);
        if self.options.sanitize {
            body = sanitize_html(&body);
            toc_html = sanitize_html(&toc_html);
        }

        self.flush_store(&mut diagnostics);
        Ok(RenderOutput {
            body,
            toc: Some(toc_html),
            diagnostics,
        })
    }

    fn flush_store(&mut self, diagnostics: &mut Vec<Diagnostic>) {
        if let Err(err) = self.store.flush() {
            log::warn!("highlight cache not written: {}", err);
            diagnostics.push(Diagnostic::warning(
                W_HIGHLIGHT_CACHE,
                format!("highlight cache not written: {}", err),
            ));
        }
    }
}
