//! External command execution
//!
//! Every side effect the dispatcher performs ends up as a shell command line.
//! [`CommandRunner`] is the seam between the dispatcher and the process table,
//! [`ShellRunner`] is the production implementation.

use std::env;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use thiserror::Error;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Output reported for a command that was never spawned
    pub fn skipped() -> Self {
        Self::default()
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

impl From<Output> for CommandOutput {
    fn from(output: Output) -> Self {
        Self {
            exit_code: exit_code(&output.status),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
    }
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    use std::os::unix::process::ExitStatusExt;

    // Same convention as the shell: killed by signal N reports 128 + N
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[derive(Error, Debug)]
pub enum ShellError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("required program `{0}` not found in PATH")]
    MissingProgram(String),
}

/// Runs command lines to completion
///
/// A non-zero exit code is not an error at this level; callers inspect
/// [`CommandOutput::exit_code`] and decide.
pub trait CommandRunner {
    fn run(&self, command_line: &str) -> Result<CommandOutput, ShellError>;

    /// Whether `run` is a no-op that never spawns anything
    fn is_dry_run(&self) -> bool {
        false
    }
}

/// Runs command lines through `sh -c`, blocking until they exit
///
/// No timeout is applied; a hung command holds the caller until it exits.
#[derive(Debug, Clone, Default)]
pub struct ShellRunner {
    dry_run: bool,
}

impl ShellRunner {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }
}

impl CommandRunner for ShellRunner {
    fn run(&self, command_line: &str) -> Result<CommandOutput, ShellError> {
        if self.dry_run {
            tracing::debug!(command = command_line, "dry run, not spawning");
            return Ok(CommandOutput::skipped());
        }

        tracing::debug!(command = command_line, "spawning");

        let output = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .output()
            .map_err(|source| ShellError::Spawn {
                command: command_line.to_string(),
                source,
            })?;

        Ok(output.into())
    }

    fn is_dry_run(&self) -> bool {
        self.dry_run
    }
}

/// Quote `text` as a single POSIX shell word
pub fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('\'');
    for c in text.chars() {
        if c == '\'' {
            quoted.push_str("'\\''");
        } else {
            quoted.push(c);
        }
    }
    quoted.push('\'');
    quoted
}

/// Resolve `program` against `PATH` the way `which` does
pub fn find_program(program: &str) -> Option<PathBuf> {
    let path = env::var_os("PATH")?;
    env::split_paths(&path)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Fail with the first program in `programs` that is not installed
pub fn ensure_programs<'a, I>(programs: I) -> Result<(), ShellError>
where
    I: IntoIterator<Item = &'a str>,
{
    for program in programs {
        let Some(path) = find_program(program) else {
            return Err(ShellError::MissingProgram(program.to_string()));
        };
        tracing::debug!(program, path = %path.display(), "found required program");
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_captures_output() {
        let runner = ShellRunner::new(false);
        let output = runner.run("echo out; echo err >&2").unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
    }

    #[test]
    fn test_nonzero_exit_is_not_an_error() {
        let runner = ShellRunner::new(false);
        let output = runner.run("exit 3").unwrap();
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[test]
    fn test_unknown_command_reports_127() {
        let runner = ShellRunner::new(false);
        let output = runner.run("definitely-not-a-real-program-xyz").unwrap();
        assert_eq!(output.exit_code, 127);
    }

    #[test]
    fn test_dry_run_never_spawns() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        let runner = ShellRunner::new(true);

        let output = runner
            .run(&format!("touch {}", quote(&marker.to_string_lossy())))
            .unwrap();

        assert!(output.success());
        assert!(runner.is_dry_run());
        assert!(!marker.exists());
    }

    #[test]
    fn test_quote_roundtrips_through_shell() {
        let runner = ShellRunner::new(false);
        let text = "it's $HOME `x` \"y\"";
        let output = runner.run(&format!("printf '%s' {}", quote(text))).unwrap();
        assert_eq!(output.stdout, text);
    }

    #[test]
    fn test_quote_plain() {
        assert_eq!(quote("FIRE!"), "'FIRE!'");
        assert_eq!(quote("a'b"), "'a'\\''b'");
    }

    #[test]
    fn test_find_program_resolves_sh() {
        assert!(find_program("sh").is_some());
        assert!(find_program("definitely-not-a-real-program-xyz").is_none());
    }

    #[test]
    fn test_ensure_programs_reports_missing() {
        let err = ensure_programs(["sh", "definitely-not-a-real-program-xyz"]).unwrap_err();
        assert!(matches!(err, ShellError::MissingProgram(p) if p == "definitely-not-a-real-program-xyz"));
    }
}
