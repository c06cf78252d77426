//! Media probing via ffprobe.
//!
//! Two questions are asked of ffprobe: how long a source is (for thumbnail
//! timing) and what pixel size a generated rendition actually has (for the
//! master playlist). Both print a single line that is parsed here.

use crate::tool::{run_tool, ToolError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe could not be run or exited non-zero.
    #[error("ffprobe failed: {0}")]
    Tool(#[from] ToolError),

    /// ffprobe ran but printed something we could not interpret.
    #[error("unparsable ffprobe output for {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

/// Pixel dimensions of a video stream, rendered as `WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Source of media facts for the pipeline.
///
/// Both calls stop early with [`ToolError::Cancelled`] once `cancel` fires.
pub trait MediaProbe: Send + Sync {
    /// Container duration of a source file in seconds.
    fn probe_duration(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<f64, ProbeError>> + Send;

    /// Width and height of the first video stream of a rendition playlist.
    fn probe_resolution(
        &self,
        playlist: &Path,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<FrameSize, ProbeError>> + Send;
}

/// [`MediaProbe`] backed by the ffprobe binary.
#[derive(Debug, Clone)]
pub struct Ffprobe {
    program: PathBuf,
}

impl Ffprobe {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MediaProbe for Ffprobe {
    async fn probe_duration(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<f64, ProbeError> {
        let cmd = build_duration_command(&self.program, path);
        let output = run_tool(cmd, cancel).await?;
        parse_duration(&output.stdout).map_err(|reason| ProbeError::Parse {
            path: path.to_path_buf(),
            reason,
        })
    }

    async fn probe_resolution(
        &self,
        playlist: &Path,
        cancel: &CancellationToken,
    ) -> Result<FrameSize, ProbeError> {
        let cmd = build_resolution_command(&self.program, playlist);
        let output = run_tool(cmd, cancel).await?;
        parse_frame_size(&output.stdout).map_err(|reason| ProbeError::Parse {
            path: playlist.to_path_buf(),
            reason,
        })
    }
}

/// `ffprobe -v error -hide_banner -show_entries format=duration
/// -of default=noprint_wrappers=1:nokey=1 <path>`
pub fn build_duration_command(program: &Path, path: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(["-v", "error", "-hide_banner"]);
    cmd.args(["-show_entries", "format=duration"]);
    cmd.args(["-of", "default=noprint_wrappers=1:nokey=1"]);
    cmd.arg(path);
    cmd
}

/// `ffprobe -v error -hide_banner -select_streams v:0
/// -show_entries stream=width,height -of csv=s=x:p=0 <playlist>`
pub fn build_resolution_command(program: &Path, playlist: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(["-v", "error", "-hide_banner"]);
    cmd.args(["-select_streams", "v:0"]);
    cmd.args(["-show_entries", "stream=width,height"]);
    cmd.args(["-of", "csv=s=x:p=0"]);
    cmd.arg(playlist);
    cmd
}

fn first_line(output: &str) -> Option<&str> {
    output.lines().map(str::trim).find(|line| !line.is_empty())
}

/// Parses the duration line printed by ffprobe (e.g. `60.041000`).
pub fn parse_duration(output: &str) -> Result<f64, String> {
    let line = first_line(output).ok_or_else(|| "empty output".to_string())?;
    let secs: f64 = line
        .parse()
        .map_err(|_| format!("'{}' is not a duration", line))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("duration '{}' is out of range", line));
    }
    Ok(secs)
}

/// Parses the `WxH` line printed by ffprobe (e.g. `1280x720`).
///
/// Some builds append a trailing separator (`1280x720x`), which is tolerated.
pub fn parse_frame_size(output: &str) -> Result<FrameSize, String> {
    let line = first_line(output).ok_or_else(|| "empty output".to_string())?;
    let mut parts = line.split('x').filter(|p| !p.is_empty());

    let width = parts.next().and_then(|w| w.trim().parse::<u32>().ok());
    let height = parts.next().and_then(|h| h.trim().parse::<u32>().ok());

    match (width, height, parts.next()) {
        (Some(width), Some(height), None) if width > 0 && height > 0 => {
            Ok(FrameSize { width, height })
        }
        _ => Err(format!("'{}' is not a WxH resolution", line)),
    }
}
