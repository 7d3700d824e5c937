use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::config::ShellConfig;
use crate::executor::{BoxFuture, Tool, ToolError, ToolParams, deserialize_params};
use crate::guard::{CommandGuard, GuardConfigError};

pub const MAX_OUTPUT_CHARS: usize = 10_000;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ExecParams {
    /// The shell command to execute
    pub command: String,
    /// Optional working directory for the command
    #[serde(default)]
    pub working_dir: Option<String>,
}

/// The `exec` tool: guarded shell execution with a wall-clock timeout.
///
/// Every outcome, including guard rejections, timeouts and spawn failures,
/// is returned as the tool's text result.
#[derive(Debug)]
pub struct ExecTool {
    guard: CommandGuard,
    timeout: Duration,
    working_dir: Option<PathBuf>,
}

impl ExecTool {
    /// # Errors
    ///
    /// Returns `GuardConfigError` if a configured guard pattern is invalid.
    pub fn new(config: &ShellConfig) -> Result<Self, GuardConfigError> {
        Ok(Self {
            guard: CommandGuard::new(config)?,
            timeout: Duration::from_secs(config.timeout),
            working_dir: config.working_dir.clone(),
        })
    }

    #[must_use]
    pub fn guard(&self) -> &CommandGuard {
        &self.guard
    }

    /// Working directory for a call: the explicit one, else the configured
    /// one, else the process directory.
    #[must_use]
    pub fn resolve_cwd(&self, working_dir: Option<&str>) -> PathBuf {
        working_dir
            .filter(|d| !d.is_empty())
            .map(PathBuf::from)
            .or_else(|| self.working_dir.clone())
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }

    /// Guard, run and format one command.
    pub async fn run(&self, command: &str, working_dir: Option<&str>) -> String {
        let cwd = self.resolve_cwd(working_dir);
        if let Err(rejection) = self.guard.check(command, &cwd) {
            return rejection.to_string();
        }

        let child = match spawn_shell(command, &cwd) {
            Ok(child) => child,
            Err(e) => return format!("Error executing command: {e}"),
        };
        let pid = child.id();

        let mut wait = std::pin::pin!(child.wait_with_output());
        match tokio::time::timeout(self.timeout, &mut wait).await {
            Ok(Ok(output)) => truncate_output(format_output(&output)),
            Ok(Err(e)) => format!("Error executing command: {e}"),
            Err(_) => {
                // The shell is still owned by `wait` here, so its pid is still
                // the group id. Dropping `wait` then kills and reaps the shell.
                if let Some(pid) = pid {
                    kill_process_group(pid);
                }
                tracing::warn!(
                    "command timed out after {}s: {}",
                    self.timeout.as_secs(),
                    command.chars().take(100).collect::<String>()
                );
                format!(
                    "Error: Command timed out after {} seconds",
                    self.timeout.as_secs()
                )
            }
        }
    }
}

impl Tool for ExecTool {
    fn name(&self) -> &str {
        "exec"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output. Use with caution."
    }

    fn parameters(&self) -> Value {
        crate::schema::params_schema::<ExecParams>()
    }

    fn execute<'a>(&'a self, params: ToolParams) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let params: ExecParams = deserialize_params(&params)?;
            Ok(self.run(&params.command, params.working_dir.as_deref()).await)
        })
    }
}

/// The child is killed if it is dropped before exiting, which is how the
/// timeout path terminates it.
fn spawn_shell(command: &str, cwd: &Path) -> std::io::Result<tokio::process::Child> {
    let mut cmd = if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(command);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(command);
        c
    };

    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn()
}

/// SIGKILL every process in the group led by the shell, including
/// background jobs and nested shells it started.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; it does not touch our memory.
    if unsafe { libc::killpg(pgid, libc::SIGKILL) } != 0 {
        tracing::debug!(
            "failed to kill process group {pgid}: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pid: u32) {}

fn format_output(output: &Output) -> String {
    let mut parts = Vec::new();

    if !output.stdout.is_empty() {
        parts.push(String::from_utf8_lossy(&output.stdout).into_owned());
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.trim().is_empty() {
        parts.push(format!("STDERR:\n{stderr}"));
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        parts.push(format!("\nExit code: {code}"));
    }

    if parts.is_empty() {
        "(no output)".to_owned()
    } else {
        parts.join("\n")
    }
}

fn truncate_output(output: String) -> String {
    let total = output.chars().count();
    if total <= MAX_OUTPUT_CHARS {
        return output;
    }
    let head: String = output.chars().take(MAX_OUTPUT_CHARS).collect();
    format!(
        "{head}\n... (truncated, {} more chars)",
        total - MAX_OUTPUT_CHARS
    )
}
