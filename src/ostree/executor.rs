use crate::audit::CommandLog;
use crate::error::{OstreeError, Result};
use std::process::{Command, Output};

/// Default name of the ostree executable, resolved through `PATH`
pub const DEFAULT_BINARY: &str = "ostree";

/// Exit status and stderr of one ostree invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    /// `None` when the process was terminated by a signal
    pub exit_code: Option<i32>,
    pub stderr: String,
}

impl Diagnostics {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Raw result of executing an ostree command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: Vec<u8>,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl CommandOutput {
    /// Stdout decoded as UTF-8 and trimmed
    pub fn text(&self) -> Result<String> {
        let text = std::str::from_utf8(&self.stdout)?;
        Ok(text.trim().to_string())
    }

    pub fn diagnostics(&self) -> Diagnostics {
        Diagnostics {
            exit_code: self.exit_code,
            stderr: self.stderr.clone(),
        }
    }
}

/// Runs ostree commands against one repository
#[derive(Debug)]
pub struct OstreeExecutor {
    binary: String,
    repo: String,
    strict_exit_status: bool,
    log: Option<CommandLog>,
}

impl OstreeExecutor {
    /// Create an executor that runs `ostree ... --repo=<repo>`
    pub fn new<S: Into<String>>(repo: S) -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            repo: repo.into(),
            strict_exit_status: false,
            log: None,
        }
    }

    /// Use a different executable, e.g. an absolute path
    pub fn with_binary<S: Into<String>>(mut self, binary: S) -> Self {
        self.binary = binary.into();
        self
    }

    /// Fail with `CommandFailed` when ostree exits non-zero
    pub fn with_strict_exit_status(mut self, strict: bool) -> Self {
        self.strict_exit_status = strict;
        self
    }

    /// Record every invocation in `log`
    pub fn with_log(mut self, log: CommandLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Execute an ostree subcommand and collect its output.
    ///
    /// The `--repo` flag is appended after `args`. Blocks until the process
    /// exits; stdout and stderr are both drained.
    pub fn execute(&self, args: &[&str]) -> Result<CommandOutput> {
        let repo_flag = format!("--repo={}", self.repo);

        let output = Command::new(&self.binary)
            .args(args)
            .arg(&repo_flag)
            .output()
            .map_err(|e| {
                OstreeError::CommandFailed(format!("Failed to execute {}: {}", self.binary, e))
            })?;

        self.process_output(output, args)
    }

    fn process_output(&self, output: Output, args: &[&str]) -> Result<CommandOutput> {
        let cmd_output = CommandOutput {
            stdout: output.stdout,
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        };

        if let Some(log) = &self.log {
            // A failed log write never fails the command
            let _ = log.log_command(&self.binary, args, &self.repo, cmd_output.exit_code);
        }

        if self.strict_exit_status && !output.status.success() {
            return Err(OstreeError::CommandFailed(format!(
                "Command '{} {}' failed with exit code {}: {}",
                self.binary,
                args.join(" "),
                cmd_output
                    .exit_code
                    .map_or_else(|| "none".to_string(), |code| code.to_string()),
                cmd_output.stderr.trim()
            )));
        }

        Ok(cmd_output)
    }

    /// Get the repository location passed as `--repo`
    pub fn repo(&self) -> &str {
        &self.repo
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }
}
