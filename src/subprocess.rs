//! Subprocess execution with timeout support.
//!
//! Readers that shell out to native utilities (`top`, `vm_stat`, `df`) go
//! through here so that a hung command can never stall the poll loop.

use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Result of a subprocess execution with timeout.
#[derive(Debug)]
pub enum SubprocessResult {
    /// Command completed successfully with output.
    Success(Output),
    /// Command timed out and was killed.
    Timeout,
    /// Command failed to spawn.
    SpawnError,
    /// Command exited with non-zero status.
    Failed(Output),
}

/// Runs a command with a timeout.
///
/// The child is spawned with `kill_on_drop`, so when the timeout elapses the
/// pending future is dropped and the process is killed.
pub async fn run_with_timeout(cmd: &str, args: &[&str], timeout: Duration) -> SubprocessResult {
    let mut command = Command::new(cmd);
    command.args(args).stdin(Stdio::null()).kill_on_drop(true);

    match tokio::time::timeout(timeout, command.output()).await {
        Ok(Ok(output)) => {
            if output.status.success() {
                SubprocessResult::Success(output)
            } else {
                SubprocessResult::Failed(output)
            }
        }
        Ok(Err(_)) => SubprocessResult::SpawnError,
        Err(_) => SubprocessResult::Timeout,
    }
}

/// Runs a command with timeout and returns stdout as `Option<String>`.
///
/// Convenience wrapper that returns None on timeout, spawn error or non-zero exit.
pub async fn run_with_timeout_stdout(cmd: &str, args: &[&str], timeout: Duration) -> Option<String> {
    match run_with_timeout(cmd, args, timeout).await {
        SubprocessResult::Success(output) => Some(String::from_utf8_lossy(&output.stdout).to_string()),
        _ => None,
    }
}
