use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use folio_core::{
    Diagnostic, DiagnosticSeverity, FootnoteStyle, FsSources, HighlightStore, LabelDictionary,
    OutputFormat, Pipeline, PipelineOptions, RenderOutput, StructuralParser, XmlParser,
};
use folio_renderer::{CommandParser, Renderer, SyntectHighlighter, Theme};

const DEFAULT_PARSER: &str = "folio-parse";

#[derive(Parser)]
#[command(name = "folio")]
#[command(version, about = "Numbered, cross-referenced HTML from LaTeX-like sources", long_about = None)]
#[command(after_help = "EXAMPLES:
    folio book.tex -o book.html --standalone      Render a complete page
    folio --format markup book.tex                Expand inclusions and highlight only
    folio --xml tree.xml                          Render an already parsed tree")]
struct Cli {
    /// Source document; standard input when omitted
    #[arg(value_name = "INPUT")]
    input: Option<PathBuf>,

    /// Write the result here instead of standard output
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = FormatArg::Html)]
    format: FormatArg,

    /// Sections are the top level and chapters are not numbered
    #[arg(long)]
    article: bool,

    /// Mark footnotes with symbols instead of numbers
    #[arg(long)]
    footnote_symbols: bool,

    /// Structural parser executable
    #[arg(long, value_name = "PROGRAM", default_value = DEFAULT_PARSER)]
    parser: String,

    /// Extra argument for the structural parser (repeatable)
    #[arg(long = "parser-arg", value_name = "ARG", allow_hyphen_values = true)]
    parser_args: Vec<String>,

    /// The input is already the structural parser's XML
    #[arg(long)]
    xml: bool,

    /// TOML file with localized display words
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,

    /// Persist option-free highlight results in this JSON file
    #[arg(long, value_name = "FILE")]
    highlight_cache: Option<PathBuf>,

    /// Directory that inclusion paths are relative to
    #[arg(long, value_name = "DIR", default_value = ".")]
    include_root: PathBuf,

    /// Write the table of contents fragment to this file
    #[arg(long, value_name = "FILE")]
    toc: Option<PathBuf>,

    /// Wrap the body in a complete page with the stylesheet inlined
    #[arg(long)]
    standalone: bool,

    /// Clean the HTML with an allow-list sanitizer
    #[arg(long)]
    sanitized: bool,

    #[arg(long, value_enum, default_value_t = ThemeArg::Auto)]
    theme: ThemeArg,

    /// Page title for --standalone
    #[arg(long)]
    title: Option<String>,

    #[arg(long, value_enum, default_value_t = DiagnosticsMode::Pretty)]
    diagnostics: DiagnosticsMode,
}

#[derive(Clone, Copy, ValueEnum)]
enum FormatArg {
    Html,
    Markup,
}

#[derive(Clone, Copy, ValueEnum)]
enum ThemeArg {
    Auto,
    Light,
    Dark,
}

#[derive(Clone, Copy, ValueEnum)]
enum DiagnosticsMode {
    Json,
    Pretty,
    Off,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let source = read_input(cli.input.as_deref())?;
    let dictionary = match &cli.labels {
        Some(path) => load_dictionary(path)?,
        None => LabelDictionary::default(),
    };

    let format = match cli.format {
        FormatArg::Html => OutputFormat::Html,
        FormatArg::Markup => OutputFormat::Markup,
    };
    let footnotes = if cli.footnote_symbols {
        FootnoteStyle::Symbols
    } else {
        FootnoteStyle::Numbered
    };
    let theme = match cli.theme {
        ThemeArg::Auto => Theme::Auto,
        ThemeArg::Light => Theme::Light,
        ThemeArg::Dark => Theme::Dark,
    };

    let options = PipelineOptions::default()
        .with_format(format)
        .with_article(cli.article)
        .with_footnotes(footnotes)
        .with_sanitize(cli.sanitized)
        .with_dictionary(dictionary);
    let store = match &cli.highlight_cache {
        Some(path) => HighlightStore::open(path),
        None => HighlightStore::in_memory(),
    };
    let mut pipeline = Pipeline::new(options)
        .with_highlighter(SyntectHighlighter::new(theme))
        .with_sources(FsSources::new(cli.include_root.clone()))
        .with_highlight_store(store);

    let parser: Box<dyn StructuralParser> = if cli.xml {
        Box::new(XmlParser)
    } else {
        Box::new(CommandParser::new(cli.parser.clone()).with_args(cli.parser_args.clone()))
    };

    let output = pipeline
        .run(&source, parser.as_ref())
        .context("conversion failed")?;
    report(&output.diagnostics, cli.diagnostics)?;

    if let (Some(path), Some(toc)) = (&cli.toc, &output.toc) {
        fs::write(path, toc).with_context(|| format!("failed to write {}", path.display()))?;
    }

    let text = if cli.standalone && format == OutputFormat::Html {
        let mut renderer = Renderer::new(theme);
        if let Some(title) = &cli.title {
            renderer = renderer.with_title(title.clone());
        }
        renderer.embed_html(&output.body, true, has_math(&output))
    } else {
        output.body
    };

    match &cli.output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            Ok(buffer)
        }
    }
}

fn load_dictionary(path: &Path) -> Result<LabelDictionary> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("invalid label dictionary {}", path.display()))
}

fn has_math(output: &RenderOutput) -> bool {
    let body = &output.body;
    body.contains("\\(") || body.contains("\\[") || body.contains("\\begin{")
}

fn report(diagnostics: &[Diagnostic], mode: DiagnosticsMode) -> Result<()> {
    for diagnostic in diagnostics {
        log::debug!("{}: {}", diagnostic.code, diagnostic.message);
    }
    match mode {
        DiagnosticsMode::Off => {}
        DiagnosticsMode::Pretty => {
            for diagnostic in diagnostics {
                eprintln!("{}", diagnostic_to_pretty(diagnostic));
            }
        }
        DiagnosticsMode::Json => eprintln!(
            "{}",
            serde_json::to_string_pretty(diagnostics).context("failed to encode diagnostics")?
        ),
    }
    Ok(())
}

fn diagnostic_to_pretty(diagnostic: &Diagnostic) -> String {
    let location = match diagnostic.line {
        Some(line) => format!("{}: ", line),
        None => String::new(),
    };
    format!(
        "{}{} {} {}",
        location,
        severity_label(diagnostic.severity),
        diagnostic.code,
        diagnostic.message
    )
}

fn severity_label(severity: DiagnosticSeverity) -> &'static str {
    match severity {
        DiagnosticSeverity::Error => "error",
        DiagnosticSeverity::Warning => "warning",
    }
}
