//! Child process invocation (dependency install + entrypoint).
//!
//! Commands are executed directly (no shell); each passthrough token is a
//! separate argument. Stdio is inherited so the script talks to the terminal.

use anyhow::{Context, Result, bail};
use shell_words::split as shell_split;
use std::fmt;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

pub const DEFAULT_RUNNER: &str = "node";
pub const DEFAULT_INSTALLER: &str = "npm install";

/// A program plus its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandLine {
    /// Split a user-supplied command string with shell-style rules.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut parts = shell_split(raw.trim())
            .with_context(|| format!("Failed to parse command line: '{raw}'"))?
            .into_iter();
        let Some(program) = parts.next().filter(|p| !p.is_empty()) else {
            bail!("Empty command line");
        };
        Ok(CommandLine {
            program,
            args: parts.collect(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn extend<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(&self.args);
        f.write_str(&shell_words::join(words))
    }
}

/// Run command for an entrypoint: runner tokens, the entrypoint, then the
/// passthrough tail.
pub fn run_command(runner: &CommandLine, entrypoint: &str, passthrough: &[String]) -> CommandLine {
    runner.clone().arg(entrypoint).extend(passthrough.iter().cloned())
}

/// A child exited unsuccessfully.
#[derive(Debug)]
pub struct ChildFailed {
    pub command: String,
    /// `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ChildFailed {
    /// Exit status the tool should report for this failure.
    pub fn exit_code(&self) -> i32 {
        match self.code {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

impl fmt::Display for ChildFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "`{}` exited with status {code}", self.command),
            None => write!(f, "`{}` was terminated by a signal", self.command),
        }
    }
}

impl std::error::Error for ChildFailed {}

/// Run `cmd` inside `cwd`, inheriting stdio, and wait for it.
pub async fn execute(cmd: &CommandLine, cwd: &Path) -> Result<()> {
    crate::log_info!("exec in {}: {cmd}", cwd.display());
    let status = Command::new(&cmd.program)
        .args(&cmd.args)
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("Failed to spawn `{}`", cmd.program))?;

    if status.success() {
        return Ok(());
    }
    Err(ChildFailed {
        command: cmd.to_string(),
        code: status.code(),
    }
    .into())
}
