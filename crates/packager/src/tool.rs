//! External tool execution
//!
//! Commands are assembled as `std::process::Command` (so builders stay pure and
//! easy to inspect in tests) and executed here on tokio. Every child is spawned
//! with kill-on-drop and raced against a cancellation token, so cancelling an
//! asset or dropping its pipeline tears down the encoder processes with it.

use std::process::{Command, Stdio};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Error type for external tool invocations
#[derive(Debug, Error)]
pub enum ToolError {
    /// The process could not be started
    #[error("failed to start {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    /// The process exited with a non-zero status
    #[error("{tool} failed with exit code {code}: {stderr}")]
    Failed {
        tool: String,
        code: i32,
        stderr: String,
    },

    /// The process was terminated by a signal
    #[error("{tool} was terminated by signal: {stderr}")]
    Terminated { tool: String, stderr: String },

    /// The owning asset was cancelled while the process was running
    #[error("{tool} was cancelled")]
    Cancelled { tool: String },
}

/// Captured output of a successful run
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Short program name for messages (`/usr/bin/ffmpeg` -> `ffmpeg`)
pub fn program_name(cmd: &Command) -> String {
    let program = std::path::Path::new(cmd.get_program());
    program
        .file_name()
        .unwrap_or(program.as_os_str())
        .to_string_lossy()
        .to_string()
}

/// Run a command to completion, capturing stdout and stderr.
///
/// Returns `ToolError::Cancelled` as soon as `cancel` fires; the child is
/// killed when its handle is dropped.
pub async fn run_tool(cmd: Command, cancel: &CancellationToken) -> Result<ToolOutput, ToolError> {
    let tool = program_name(&cmd);
    debug!(tool = %tool, args = ?cmd.get_args().collect::<Vec<_>>(), "spawning");

    let mut cmd = tokio::process::Command::from(cmd);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd.spawn().map_err(|source| ToolError::Spawn {
        tool: tool.clone(),
        source,
    })?;

    let output = tokio::select! {
        result = child.wait_with_output() => result.map_err(|source| ToolError::Spawn {
            tool: tool.clone(),
            source,
        })?,
        _ = cancel.cancelled() => return Err(ToolError::Cancelled { tool }),
    };

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

    if output.status.success() {
        Ok(ToolOutput { stdout, stderr })
    } else {
        match output.status.code() {
            Some(code) => Err(ToolError::Failed { tool, code, stderr }),
            None => Err(ToolError::Terminated { tool, stderr }),
        }
    }
}
