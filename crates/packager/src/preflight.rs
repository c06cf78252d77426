//! Preflight checks for the HLS packager
//!
//! Verifies before any work starts that:
//! - ffprobe runs
//! - ffmpeg runs and is version 5 or newer (`-fps_mode` is used for the mosaic)

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

/// Oldest ffmpeg major version with `-fps_mode`
pub const MIN_FFMPEG_MAJOR: u32 = 5;

/// Error types for preflight checks
#[derive(Debug, Error)]
pub enum PreflightError {
    #[error("{tool} not available: {reason}")]
    Unavailable { tool: String, reason: String },

    #[error("FFmpeg version requirement not met: {0}")]
    FfmpegVersion(String),
}

/// Versions reported by the external tools
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolVersions {
    /// Version token printed by `ffmpeg -version` (e.g. `6.1.1`, `N-112233-gabc`)
    pub ffmpeg: String,
    pub ffprobe: String,
}

/// Extract the version token following `<tool> version`
///
/// `ffmpeg version n6.1-3-g1234 Copyright ...` -> `n6.1-3-g1234`
pub fn parse_version_token(version_output: &str, tool: &str) -> Option<String> {
    let marker = format!("{} version", tool.to_lowercase());
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains(&marker))?;

    version_line
        .to_lowercase()
        .split(&marker)
        .nth(1)?
        .split_whitespace()
        .next()
        .map(str::to_string)
}

/// Parse a tool version string and extract the major version number
///
/// Handles various FFmpeg version formats:
/// - Standard: "ffmpeg version 6.0 ..."
/// - N-prefixed: "ffmpeg version n6.0-... ..."
///
/// Snapshot builds (`N-112233-g...`) carry no release number and yield `None`.
pub fn parse_tool_version(version_output: &str, tool: &str) -> Option<u32> {
    let token = parse_version_token(version_output, tool)?;
    let version_str = token.trim_start_matches('n');

    // Extract major version (before first '.' or '-')
    let major_str = version_str.split(['.', '-']).next()?;
    major_str.parse().ok()
}

/// True for builds from the development branch (`N-<revision>-g<hash>`)
pub fn is_snapshot_build(version_output: &str, tool: &str) -> bool {
    parse_version_token(version_output, tool)
        .map(|token| {
            let mut parts = token.splitn(3, '-');
            parts.next() == Some("n")
                && parts
                    .next()
                    .map(|rev| !rev.is_empty() && rev.chars().all(|c| c.is_ascii_digit()))
                    .unwrap_or(false)
        })
        .unwrap_or(false)
}

/// Run `<program> -version` and return its version token
pub fn check_tool(program: &Path, tool: &str) -> Result<String, PreflightError> {
    let unavailable = |reason: String| PreflightError::Unavailable {
        tool: tool.to_string(),
        reason,
    };

    let output = Command::new(program).arg("-version").output().map_err(|e| {
        unavailable(format!(
            "{} -version failed; is it installed and in PATH? Error: {}",
            program.display(),
            e
        ))
    })?;

    if !output.status.success() {
        return Err(unavailable(format!("{} -version failed", program.display())));
    }

    let version_output = String::from_utf8_lossy(&output.stdout);
    parse_version_token(&version_output, tool).ok_or_else(|| {
        unavailable(format!(
            "could not read version from: {}",
            version_output.lines().next().unwrap_or("(empty)")
        ))
    })
}

/// Accept release builds at or above [`MIN_FFMPEG_MAJOR`] and snapshot builds
pub fn check_ffmpeg_version(version_output: &str) -> Result<(), PreflightError> {
    if is_snapshot_build(version_output, "ffmpeg") {
        return Ok(());
    }

    let major_version = parse_tool_version(version_output, "ffmpeg").ok_or_else(|| {
        PreflightError::FfmpegVersion(format!(
            "Could not parse FFmpeg version from output: {}",
            version_output.lines().next().unwrap_or("(empty)")
        ))
    })?;

    if major_version < MIN_FFMPEG_MAJOR {
        return Err(PreflightError::FfmpegVersion(format!(
            "FFmpeg {}.x or newer required, got: {}",
            MIN_FFMPEG_MAJOR, major_version
        )));
    }

    Ok(())
}

/// Run all preflight checks in order
///
/// 1. ffprobe availability
/// 2. ffmpeg availability and version
pub fn run_preflight(cfg: &Config) -> Result<ToolVersions, PreflightError> {
    let ffprobe = check_tool(&cfg.runtime.ffprobe, "ffprobe")?;
    let ffmpeg = check_tool(&cfg.runtime.ffmpeg, "ffmpeg")?;
    check_ffmpeg_version(&format!("ffmpeg version {}", ffmpeg))?;
    Ok(ToolVersions { ffmpeg, ffprobe })
}
