mod external;
mod highlight;

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

pub use external::{CommandParser, resolve_executable};
pub use highlight::SyntectHighlighter;

const BASE_CSS: &str = include_str!("../assets/folio.css");
const MATHJAX_CONFIG: &str = include_str!("../assets/mathjax-config.js");
const MATHJAX_URL: &str = "https://cdn.jsdelivr.net/npm/mathjax@3/es5/tex-chtml.js";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Theme {
    Auto,
    Light,
    Dark,
}

impl Theme {
    /// Syntect theme names to try, best first.
    pub(crate) fn highlight_candidates(self) -> [&'static str; 3] {
        match self {
            Theme::Dark => ["Monokai Extended Bright", "Monokai Extended", "base16-ocean.dark"],
            Theme::Light | Theme::Auto => {
                ["InspiredGitHub", "Solarized (light)", "base16-ocean.light"]
            }
        }
    }
}

/// Page-level presentation of rendered documents: stylesheet and standalone
/// embedding.
#[derive(Debug, Clone)]
pub struct Renderer {
    theme: Theme,
    title: Option<String>,
    custom_vars: BTreeMap<String, String>,
}

impl Renderer {
    pub fn new(theme: Theme) -> Self {
        Self {
            theme,
            title: None,
            custom_vars: BTreeMap::new(),
        }
    }

    pub fn with_var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.custom_vars.insert(key.into(), value.into());
        self
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn stylesheet(&self) -> String {
        let mut out = String::new();
        let (light_vars, dark_vars) = default_theme_vars();

        match self.theme {
            Theme::Auto => {
                out.push_str(&root_block(&light_vars, true));
                out.push_str("@media (prefers-color-scheme: dark) {\n");
                out.push_str(&indent_root_block(&dark_vars));
                out.push_str("}\n");
            }
            Theme::Light => {
                out.push_str(&root_block(&light_vars, true));
            }
            Theme::Dark => {
                out.push_str(&root_block(&dark_vars, true));
            }
        }

        if !self.custom_vars.is_empty() {
            out.push_str(&root_block(&self.custom_vars, false));
        }

        out.push_str(BASE_CSS);
        out
    }

    /// Wraps a rendered body in a complete page. Math spans are left for
    /// client-side rendering, so `with_math` loads MathJax.
    pub fn embed_html(&self, html: &str, with_inline_css: bool, with_math: bool) -> String {
        let mut out = String::new();
        out.push_str("<!DOCTYPE html>\n");
        out.push_str("<html lang=\"en\">\n");
        out.push_str("<head>\n");
        out.push_str("  <meta charset=\"utf-8\" />\n");
        out.push_str("  <meta name=\"viewport\" content=\"width=device-width, initial-scale=1\" />\n");
        if let Some(title) = &self.title {
            out.push_str(&format!("  <title>{}</title>\n", escape_text(title)));
        }
        if with_inline_css {
            out.push_str("  <style>\n");
            out.push_str(&self.stylesheet());
            out.push_str("\n  </style>\n");
        } else {
            out.push_str("  <link rel=\"stylesheet\" href=\"folio.css\" />\n");
        }
        if with_math {
            out.push_str("  <script>\n");
            out.push_str(MATHJAX_CONFIG);
            out.push_str("\n  </script>\n");
            out.push_str(&format!("  <script async src=\"{}\"></script>\n", MATHJAX_URL));
        }
        out.push_str("</head>\n");
        out.push_str("<body>\n");
        out.push_str("<div id=\"book\">\n");
        out.push_str(html);
        if !html.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("</div>\n");
        out.push_str("</body>\n");
        out.push_str("</html>\n");
        out
    }

    pub fn generate_files(&self, out_dir: &Path) -> io::Result<()> {
        fs::create_dir_all(out_dir)?;
        fs::write(out_dir.join("folio.css"), self.stylesheet())?;
        Ok(())
    }
}

fn default_theme_vars() -> (BTreeMap<String, String>, BTreeMap<String, String>) {
    let light = BTreeMap::from([
        ("--folio-bg".to_string(), "#fdfdfb".to_string()),
        ("--folio-fg".to_string(), "#1f2328".to_string()),
        ("--folio-muted".to_string(), "#5f6b76".to_string()),
        ("--folio-border".to_string(), "#d8dee4".to_string()),
        ("--folio-accent".to_string(), "#2b6cb0".to_string()),
        ("--folio-code-bg".to_string(), "#f4f6f8".to_string()),
        ("--folio-hll-bg".to_string(), "#fff5b1".to_string()),
        ("--folio-aside-bg".to_string(), "#f7f6f1".to_string()),
        ("--folio-error".to_string(), "#c53030".to_string()),
    ]);

    let dark = BTreeMap::from([
        ("--folio-bg".to_string(), "#0e1116".to_string()),
        ("--folio-fg".to_string(), "#e6edf3".to_string()),
        ("--folio-muted".to_string(), "#9aa4af".to_string()),
        ("--folio-border".to_string(), "#2a313b".to_string()),
        ("--folio-accent".to_string(), "#63b3ed".to_string()),
        ("--folio-code-bg".to_string(), "#202634".to_string()),
        ("--folio-hll-bg".to_string(), "#4a4420".to_string()),
        ("--folio-aside-bg".to_string(), "#1b212b".to_string()),
        ("--folio-error".to_string(), "#fc8181".to_string()),
    ]);

    (light, dark)
}

fn format_vars(vars: &BTreeMap<String, String>, indent: &str) -> String {
    let mut out = String::new();
    for (key, value) in vars {
        out.push_str(indent);
        out.push_str(key);
        out.push_str(": ");
        out.push_str(value);
        out.push_str(";\n");
    }
    out
}

fn root_block(vars: &BTreeMap<String, String>, include_color_scheme: bool) -> String {
    let mut out = String::new();
    out.push_str(":root {\n");
    if include_color_scheme {
        out.push_str("  color-scheme: light dark;\n");
    }
    out.push_str(&format_vars(vars, "  "));
    out.push_str("}\n");
    out
}

fn indent_root_block(vars: &BTreeMap<String, String>) -> String {
    let mut out = String::new();
    out.push_str("  :root {\n");
    out.push_str("    color-scheme: light dark;\n");
    out.push_str(&format_vars(vars, "    "));
    out.push_str("  }\n");
    out
}

fn escape_text(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::{Renderer, Theme};

    #[test]
    fn embed_html_includes_css_and_math() {
        let renderer = Renderer::new(Theme::Light).with_title("A & B");
        let html = renderer.embed_html("<p>Hi</p>", true, true);
        assert!(html.contains("<style>"));
        assert!(html.contains("mathjax"));
        assert!(html.contains("<title>A &amp; B</title>"));
        assert!(html.contains("<p>Hi</p>"));
    }

    #[test]
    fn embed_html_can_link_stylesheet() {
        let renderer = Renderer::new(Theme::Light);
        let html = renderer.embed_html("<p>Hi</p>", false, false);
        assert!(!html.contains("<style>"));
        assert!(!html.contains("<script"));
        assert!(html.contains("href=\"folio.css\""));
    }

    #[test]
    fn auto_theme_has_dark_media_query() {
        let css = Renderer::new(Theme::Auto)
            .with_var("--folio-accent", "red")
            .stylesheet();
        assert!(css.contains("prefers-color-scheme: dark"));
        assert!(css.contains("--folio-accent: red;"));
    }
}
