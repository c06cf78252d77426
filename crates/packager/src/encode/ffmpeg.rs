//! ffmpeg encoder module for the HLS packager
//!
//! Builds and executes the per-rendition ffmpeg invocation that scales the
//! source, encodes H.264/AAC and cuts it into fixed-length MPEG-TS segments with
//! a VOD playlist.

use super::Transcoder;
use crate::bandwidth::is_segment_file;
use crate::config::{EncodeConfig, RenditionSpec};
use crate::thumbnails::{
    build_mosaic_command, build_poster_command, MosaicRequest, PosterRequest, ThumbnailError,
};
use crate::tool::{run_tool, ToolError};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Segment file name pattern inside a rendition directory
pub const SEGMENT_PATTERN: &str = "segment%02d.ts";

/// Error type for encoding operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// ffmpeg could not be started, exited non-zero or was cancelled
    #[error("encoder failed: {0}")]
    Tool(#[from] ToolError),

    /// The rendition directory could not be created or cleared
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Parameters for a single rendition encode
#[derive(Debug, Clone)]
pub struct HlsEncodeParams {
    /// Path to the source video
    pub input_path: PathBuf,
    /// Rendition directory (`<asset>/<res>p`)
    pub output_dir: PathBuf,
    /// Asset name; the rendition playlist is `<asset_name>.m3u8`
    pub asset_name: String,
    /// Ladder row being encoded
    pub rendition: RenditionSpec,
    /// Settings shared across renditions
    pub encode: EncodeConfig,
}

impl HlsEncodeParams {
    /// Path of the rendition's own playlist
    pub fn playlist_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.m3u8", self.asset_name))
    }

    /// Path pattern ffmpeg fills in for each segment
    pub fn segment_pattern(&self) -> PathBuf {
        self.output_dir.join(SEGMENT_PATTERN)
    }
}

/// Create the rendition directory and clear what an earlier run left in it
///
/// Old segments would otherwise be measured as this run's output, and an
/// encoder that exits cleanly without writing would look successful.
pub async fn prepare_output_dir(params: &HlsEncodeParams) -> Result<(), EncodeError> {
    tokio::fs::create_dir_all(&params.output_dir).await?;

    let mut entries = tokio::fs::read_dir(&params.output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if is_segment_file(&path) && entry.file_type().await?.is_file() {
            debug!(path = %path.display(), "removing stale segment");
            remove_if_present(&path).await?;
        }
    }
    remove_if_present(&params.playlist_path()).await?;
    Ok(())
}

async fn remove_if_present(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Build the ffmpeg HLS command for one rendition
///
/// Creates a Command configured with:
/// - Scaling to the rendition height, width derived and rounded to even
/// - Uniform codec, CRF and preset across renditions
/// - Fixed GOP with scene-cut detection disabled and keyframes forced on every
///   segment boundary, so all renditions cut at the same instants
/// - Capped video bitrate and buffer from the ladder row
/// - AAC audio resampled to the configured rate at the row's bitrate
/// - HLS muxer: VOD playlist, independent segments, MPEG-TS segments named
///   `segmentNN.ts`, playlist named after the asset
pub fn build_hls_command(program: &Path, params: &HlsEncodeParams) -> Command {
    let encode = &params.encode;
    let rendition = &params.rendition;
    let gop = encode.gop_size().to_string();

    let mut cmd = Command::new(program);
    cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
    cmd.arg("-i").arg(&params.input_path);
    cmd.arg("-threads").arg(encode.threads.to_string());

    // Video
    cmd.arg("-vf")
        .arg(format!("scale=-2:{}", rendition.resolution.height()));
    cmd.arg("-c:v").arg(&encode.video_codec);
    cmd.arg("-crf").arg(encode.crf.to_string());
    cmd.arg("-preset").arg(&encode.preset);
    cmd.arg("-g").arg(&gop);
    cmd.arg("-keyint_min").arg(&gop);
    cmd.arg("-sc_threshold").arg("0");
    cmd.arg("-force_key_frames")
        .arg(format!("expr:gte(t,n_forced*{})", encode.segment_seconds));
    cmd.arg("-b:v").arg(rendition.video_max_bitrate.as_str());
    cmd.arg("-maxrate").arg(rendition.video_max_bitrate.as_str());
    cmd.arg("-bufsize").arg(rendition.video_buffer_size.as_str());

    // Audio
    cmd.arg("-c:a").arg("aac");
    cmd.arg("-b:a").arg(rendition.audio_bitrate.as_str());
    cmd.arg("-ar").arg(encode.audio_sample_rate.to_string());

    // HLS muxer
    cmd.arg("-f").arg("hls");
    cmd.arg("-hls_time").arg(encode.segment_seconds.to_string());
    cmd.arg("-hls_playlist_type").arg("vod");
    cmd.arg("-hls_flags").arg("independent_segments");
    cmd.arg("-hls_segment_type").arg("mpegts");
    cmd.arg("-hls_segment_filename").arg(params.segment_pattern());
    cmd.arg(params.playlist_path());

    cmd
}

/// [`Transcoder`] backed by the ffmpeg binary
#[derive(Debug, Clone)]
pub struct Ffmpeg {
    program: PathBuf,
}

impl Ffmpeg {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Transcoder for Ffmpeg {
    async fn encode_rendition(
        &self,
        params: &HlsEncodeParams,
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        let cmd = build_hls_command(&self.program, params);
        run_tool(cmd, cancel).await?;
        Ok(())
    }

    async fn capture_poster(
        &self,
        request: &PosterRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ThumbnailError> {
        let cmd = build_poster_command(&self.program, request);
        run_tool(cmd, cancel).await?;
        Ok(())
    }

    async fn render_mosaic(
        &self,
        request: &MosaicRequest,
        cancel: &CancellationToken,
    ) -> Result<(), ThumbnailError> {
        let cmd = build_mosaic_command(&self.program, request);
        run_tool(cmd, cancel).await?;
        Ok(())
    }
}
