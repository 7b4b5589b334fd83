use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use folio_core::{Document, ParserError, StructuralParser, parse_xml};

const INPUT_NAME: &str = "document.tex";
const OUTPUT_NAME: &str = "document.xml";

/// Runs an external structural parser executable.
///
/// Each call gets its own temporary directory: the token-safe text is
/// written to `document.tex`, the program runs with that file as its only
/// argument, and `document.xml` is read back as the tree.
#[derive(Debug, Clone)]
pub struct CommandParser {
    program: String,
    args: Vec<String>,
}

impl CommandParser {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Extra arguments placed before the input file name.
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn executable(&self) -> Result<PathBuf, ParserError> {
        let direct = Path::new(&self.program);
        if direct.components().count() > 1 {
            if is_executable(direct) {
                return Ok(direct.to_path_buf());
            }
        } else if let Some(found) = resolve_executable(&[self.program.as_str()]) {
            return Ok(found);
        }
        Err(ParserError::Unavailable {
            program: self.program.clone(),
        })
    }
}

impl StructuralParser for CommandParser {
    fn parse(&self, text: &str) -> Result<Document, ParserError> {
        let executable = self.executable()?;
        let workdir = tempfile::tempdir()?;
        fs::write(workdir.path().join(INPUT_NAME), text)?;
        log::debug!(
            "running {} in {}",
            executable.display(),
            workdir.path().display()
        );

        let mut cmd = Command::new(&executable);
        cmd.current_dir(workdir.path());
        cmd.args(&self.args);
        cmd.arg(INPUT_NAME);
        run_command(cmd, &self.program)?;

        let output = workdir.path().join(OUTPUT_NAME);
        let xml = fs::read_to_string(&output).map_err(|err| ParserError::Failed {
            program: self.program.clone(),
            message: format!("no {} produced: {}", OUTPUT_NAME, err),
        })?;
        parse_xml(&xml)
    }
}

fn run_command(mut cmd: Command, label: &str) -> Result<(), ParserError> {
    let output = cmd.output().map_err(|err| ParserError::Failed {
        program: label.to_string(),
        message: format!("could not be started: {}", err),
    })?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut message = match output.status.code() {
        Some(code) => format!("exited with status {}", code),
        None => "terminated by a signal".to_string(),
    };
    let stderr = stderr.trim();
    let stdout = stdout.trim();
    if !stderr.is_empty() {
        message.push_str(&format!(": {}", stderr));
    } else if !stdout.is_empty() {
        message.push_str(&format!(": {}", stdout));
    }
    Err(ParserError::Failed {
        program: label.to_string(),
        message,
    })
}

/// First candidate found as an executable file on `PATH`.
pub fn resolve_executable(candidates: &[&str]) -> Option<PathBuf> {
    let path_var = env::var_os("PATH")?;
    for dir in env::split_paths(&path_var) {
        for candidate in candidates {
            let full = dir.join(candidate);
            if is_executable(&full) {
                return Some(full);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    let metadata = match fs::metadata(path) {
        Ok(value) => value,
        Err(_) => return false,
    };
    metadata.is_file() && metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::CommandParser;
    use folio_core::{ParserError, StructuralParser};

    #[test]
    fn missing_program_is_unavailable() {
        let parser = CommandParser::new("folio-no-such-parser-binary");
        match parser.parse("\\chapter{x}") {
            Err(ParserError::Unavailable { program }) => {
                assert_eq!(program, "folio-no-such-parser-binary");
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
    }

    #[cfg(unix)]
    #[test]
    fn script_output_becomes_the_tree() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("fake-parser");
        std::fs::write(
            &script,
            "#!/bin/sh\nprintf '<document><p>%s</p></document>' \"$(cat \"$1\")\" > document.xml\n",
        )?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let parser = CommandParser::new(script.to_string_lossy());
        let document = parser.parse("hello")?;
        assert_eq!(document.root.plain_text(), "hello");
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn failing_program_reports_stderr() -> Result<(), Box<dyn std::error::Error>> {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir()?;
        let script = dir.path().join("broken-parser");
        std::fs::write(&script, "#!/bin/sh\necho 'bad input' >&2\nexit 3\n")?;
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755))?;

        let parser = CommandParser::new(script.to_string_lossy());
        match parser.parse("x") {
            Err(ParserError::Failed { message, .. }) => {
                assert!(message.contains("status 3"));
                assert!(message.contains("bad input"));
            }
            other => panic!("unexpected result {:?}", other.map(|_| ())),
        }
        Ok(())
    }
}
