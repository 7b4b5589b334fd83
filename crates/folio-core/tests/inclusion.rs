use std::error::Error;
use std::fs;

use folio_core::{
    Diagnostic, FsSources, InclusionError, W_INCLUDE_FAILED, expand_inclusions, select_lines,
};

fn expand(root: &std::path::Path, source: &str) -> (String, Vec<Diagnostic>) {
    let mut diagnostics = Vec::new();
    let out = expand_inclusions(source, &FsSources::new(root), &mut diagnostics);
    (out, diagnostics)
}

#[test]
fn line_selections_keep_written_order() {
    let lines = ["one", "two", "three", "four", "five"];
    assert_eq!(select_lines(&lines, "2-4"), vec!["two", "three", "four"]);
    assert_eq!(select_lines(&lines, "5-3, 1"), vec!["five", "four", "three", "one"]);
    assert_eq!(select_lines(&lines, "0, 9, 2"), vec!["two"]);
}

#[test]
fn selected_lines_become_a_tagged_code_block() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("lib.py"), "a = 1\nb = 2\nc = 3\n")?;

    let (out, diagnostics) = expand(
        dir.path(),
        "before\n%= <<(lib.py[3, 1], options: \"linenos\": true)\nafter",
    );
    assert!(diagnostics.is_empty());
    assert_eq!(
        out,
        "before\n%= lang:python, options: \"linenos\": true\n\\begin{code}\nc = 3\na = 1\n\\end{code}\nafter"
    );
    Ok(())
}

#[test]
fn nested_sections_balance_and_language_can_be_forced() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("page.html"),
        "<!-- begin outer -->\n<div>\n<!-- begin inner -->\n<p></p>\n<!-- end inner -->\n</div>\n<!-- end outer -->\n",
    )?;

    let (out, _) = expand(dir.path(), "%= <<(page.html[outer], lang: erb)");
    assert_eq!(
        out,
        "%= lang:erb\n\\begin{code}\n<div>\n<!-- begin inner -->\n<p></p>\n<!-- end inner -->\n</div>\n\\end{code}"
    );
    Ok(())
}

#[test]
fn failures_become_inline_errors() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("a.rb"), "puts 1\n")?;

    let source = "%= <<(a.rb[missing])\n%= <<(a.rb, git: {tag: v1, repo: nowhere})\n%= <<(a.rb, colour: red)";
    let (out, diagnostics) = expand(dir.path(), source);

    let lines: Vec<&str> = out.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|line| line.starts_with("%= <span class=\"inline_error\">ERROR: ")));
    assert!(lines[0].contains("section `missing` not found in `a.rb`"));
    assert!(lines[1].contains(&InclusionError::MissingRepository {
        repo: "nowhere".to_string()
    }
    .to_string()));
    assert!(lines[2].contains("malformed inclusion directive"));

    let codes: Vec<&str> = diagnostics.iter().map(|diag| diag.code).collect();
    assert_eq!(codes, vec![W_INCLUDE_FAILED; 3]);
    let lines_reported: Vec<Option<usize>> = diagnostics.iter().map(|diag| diag.line).collect();
    assert_eq!(lines_reported, vec![Some(1), Some(2), Some(3)]);
    Ok(())
}

#[test]
fn directives_inside_literal_blocks_are_left_alone() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let source = "\\begin{verbatim}\n%= <<(missing.rb)\n\\end{verbatim}";
    let (out, diagnostics) = expand(dir.path(), source);
    assert_eq!(out, source);
    assert!(diagnostics.is_empty());
    Ok(())
}
