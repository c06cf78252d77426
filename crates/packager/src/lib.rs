//! HLS Packager
//!
//! Turns a directory of source videos into adaptive-bitrate HLS packages: one
//! rendition per ladder row, thumbnails, and a master playlist per asset.

pub mod bandwidth;
pub mod concurrency;
pub mod encode;
pub mod manifest;
pub mod orchestrator;
pub mod packager;
pub mod pipeline;
pub mod preflight;
pub mod probe;
pub mod report;
pub mod scan;
pub mod thumbnails;
pub mod tool;

#[cfg(test)]
mod testing;

pub use bandwidth::{peak_segment_bytes, playlist_bandwidth, BandwidthError, BandwidthTable};
pub use concurrency::{derive_plan, ConcurrencyPlan};
pub use encode::{
    build_hls_command, prepare_output_dir, EncodeError, Ffmpeg, HlsEncodeParams, Transcoder,
};
pub use hls_packager_config as config;
pub use hls_packager_config::Config;
pub use manifest::{
    ManifestError, ManifestSynthesizer, MasterPlaylist, MasterPlaylistEntry, MASTER_PLAYLIST_NAME,
};
pub use orchestrator::{EncodeJob, EncodeOrchestrator, EncodeOutcome, JobError, JobStatus};
pub use packager::{Packager, PackagerError};
pub use pipeline::{AssetError, AssetPipeline, SourceAsset};
pub use preflight::{run_preflight, PreflightError, ToolVersions};
pub use probe::{Ffprobe, FrameSize, MediaProbe, ProbeError};
pub use report::{AssetReport, AssetStatus, RenditionReport};
pub use scan::{scan_inputs, SourceFile};
pub use thumbnails::{ArtifactStatus, ThumbnailError, ThumbnailGenerator, ThumbnailReport};
pub use tool::{run_tool, ToolError};
