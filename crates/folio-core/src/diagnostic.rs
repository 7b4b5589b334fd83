use serde::Serialize;

pub const W_INCLUDE_FAILED: &str = "W_INCLUDE_FAILED";
pub const W_REF_UNDEFINED: &str = "W_REF_UNDEFINED";
pub const W_LINK_UNDEFINED: &str = "W_LINK_UNDEFINED";
pub const W_LABEL_DUP: &str = "W_LABEL_DUP";
pub const W_HIGHLIGHT_CACHE: &str = "W_HIGHLIGHT_CACHE";

/// A recoverable finding. Fatal conditions are `FatalError` values instead.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct Diagnostic {
    pub code: &'static str,
    pub severity: DiagnosticSeverity,
    /// 1-based source line, when the finding maps to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(
        line: Option<usize>,
        severity: DiagnosticSeverity,
        code: &'static str,
        message: impl Into<String>,
    ) -> Self {
        Self {
            line,
            severity,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: &'static str, message: impl Into<String>) -> Self {
        Self::new(None, DiagnosticSeverity::Warning, code, message)
    }

    pub fn at_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}
