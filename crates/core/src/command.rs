//! Local command execution for manifest validations.
//!
//! [`ShellRunner`] runs a validation's command line through `bash -c`,
//! captures stdout/stderr, and enforces a per-command timeout. The
//! [`CommandRunner`] trait lets callers substitute a scripted runner.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stdout or stderr size captured per stream (1 MiB).
const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// One command to run.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub command: String,
    pub env_vars: Vec<(String, String)>,
    pub working_directory: Option<String>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(command: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            env_vars: Vec::new(),
            working_directory: None,
            timeout,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env_vars.push((key.into(), value.into()));
        self
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// `-1` when the process was terminated by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("Failed to run command: {0}")]
    Io(#[from] std::io::Error),

    #[error("Command timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands with `bash -c`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let mut cmd = Command::new("bash");
        cmd.arg("-c").arg(&spec.command);
        run_command(&mut cmd, spec).await
    }
}

/// Spawn `cmd`, capture its output, and kill it if `spec.timeout` elapses.
pub async fn run_command(
    cmd: &mut Command,
    spec: &CommandSpec,
) -> Result<CommandOutput, CommandError> {
    // kill_on_drop reaps the child when the timeout drops it.
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    for (key, value) in &spec.env_vars {
        cmd.env(key, value);
    }
    if let Some(dir) = &spec.working_directory {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn()?;

    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
    let readers = [stdout_task.abort_handle(), stderr_task.abort_handle()];

    // The deadline covers the pipes too: a backgrounded process can hold
    // them open after the shell exits.
    let collect = async {
        let status = child.wait().await?;
        let stdout_bytes = stdout_task.await.unwrap_or_default();
        let stderr_bytes = stderr_task.await.unwrap_or_default();
        Ok::<_, std::io::Error>((status, stdout_bytes, stderr_bytes))
    };

    match tokio::time::timeout(spec.timeout, collect).await {
        Ok(Ok((status, stdout_bytes, stderr_bytes))) => Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code: status.code().unwrap_or(-1),
            duration_ms: start.elapsed().as_millis() as u64,
        }),
        Ok(Err(e)) => Err(CommandError::Io(e)),
        Err(_elapsed) => {
            for reader in &readers {
                reader.abort();
            }
            Err(CommandError::Timeout {
                elapsed_ms: start.elapsed().as_millis() as u64,
            })
        }
    }
}

/// Read a stream to the end, capped at [`MAX_OUTPUT_BYTES`].
async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_OUTPUT_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
