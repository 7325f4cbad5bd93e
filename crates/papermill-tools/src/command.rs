//! External process invocation.
//!
//! Every conversion shells out through [`ToolCommand`]: child processes run
//! with captured output, a hard timeout, and kill-on-drop so an abandoned
//! job never leaves a tool running.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, error};

/// Longest stderr excerpt carried on a failure.
const STDERR_LIMIT: usize = 2000;

/// Errors from running an external tool.
#[derive(Debug, Error)]
pub enum ToolError {
    /// The tool binary was not found on the system.
    #[error("tool not found: {0}")]
    NotFound(String),

    /// The tool ran past the configured timeout and was killed.
    #[error("{program} timed out after {timeout_secs} seconds")]
    Timeout {
        /// The tool binary.
        program: String,
        /// The limit it exceeded.
        timeout_secs: u64,
    },

    /// The tool exited with a non-zero code.
    #[error("{program} exited with code {code}: {stderr}")]
    Failed {
        /// The tool binary.
        program: String,
        /// The exit code.
        code: i32,
        /// Captured standard error, truncated.
        stderr: String,
    },

    /// Spawning or reaping the process failed.
    #[error("failed to run {program}: {source}")]
    Io {
        /// The tool binary.
        program: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },
}

/// Captured output of a successful run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error; tools often narrate here even on success.
    pub stderr: String,
}

/// One tool invocation, built argument by argument.
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Start building an invocation of `program` with the given timeout.
    pub fn new(program: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a filesystem path as an argument.
    pub fn arg_path(self, path: impl AsRef<Path>) -> Self {
        self.arg(path.as_ref().to_string_lossy())
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run to completion, capturing output.
    ///
    /// The child never reads stdin; on timeout it is killed rather than
    /// orphaned.
    pub async fn run(self) -> Result<ToolOutput, ToolError> {
        debug!(program = %self.program, args = ?self.args, "Running external tool");

        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let timeout_secs = self.timeout.as_secs();
        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                error!(program = %self.program, "Tool binary not found");
                return Err(ToolError::NotFound(self.program));
            }
            Ok(Err(e)) => {
                error!(program = %self.program, error = %e, "Failed to run tool");
                return Err(ToolError::Io {
                    program: self.program,
                    source: e,
                });
            }
            Err(_) => {
                error!(program = %self.program, timeout_secs, "Tool timed out, killed");
                return Err(ToolError::Timeout {
                    program: self.program,
                    timeout_secs,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            error!(
                program = %self.program,
                code,
                stderr = %stderr.chars().take(500).collect::<String>(),
                "Tool failed"
            );
            return Err(ToolError::Failed {
                program: self.program,
                code,
                stderr: stderr.chars().take(STDERR_LIMIT).collect(),
            });
        }

        debug!(program = %self.program, "Tool completed");
        Ok(ToolOutput { stdout, stderr })
    }
}
