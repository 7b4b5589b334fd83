use thiserror::Error;

/// Conditions that abort a pipeline run.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("unterminated `{name}` environment starting on line {line}")]
    UnterminatedEnvironment { name: String, line: usize },

    #[error("`\\end{{{name}}}` on line {line} has no matching `\\begin{{{name}}}`")]
    UnbalancedEnvironment { name: String, line: usize },

    #[error(
        "highlight option hl_lines refers to line {requested}, but the code block on line {line} has {available} lines"
    )]
    HighlightLineOutOfRange {
        requested: u32,
        available: usize,
        line: usize,
    },

    #[error("invalid highlight options `{options}` on line {line}: {message}")]
    InvalidHighlightOptions {
        options: String,
        line: usize,
        message: String,
    },

    #[error(transparent)]
    Parser(#[from] ParserError),
}

/// Failures of the external structural parser. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ParserError {
    #[error(
        "structural parser `{program}` was not found; install it or point the pipeline at another parser executable"
    )]
    Unavailable { program: String },

    #[error("structural parser `{program}` failed: {message}")]
    Failed { program: String, message: String },

    #[error("structural parser produced malformed output: {message}")]
    Malformed { message: String },

    #[error("structural parser I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Recoverable inclusion failures; rendered inline by the resolver.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum InclusionError {
    #[error("file `{path}` could not be read")]
    MissingFile { path: String },

    #[error("section `{section}` not found in `{path}`")]
    MissingSection { section: String, path: String },

    #[error("tag `{tag}` not found in repository `{repo}`")]
    MissingTag { tag: String, repo: String },

    #[error("repository `{repo}` not found")]
    MissingRepository { repo: String },

    #[error("malformed inclusion directive `{directive}`")]
    MalformedDirective { directive: String },
}
