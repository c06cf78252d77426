//! Poster frame and preview mosaic generation.
//!
//! Both artifacts depend only on the source and its duration, never on the
//! renditions. They run alongside the encode and their failures are reported
//! without touching the rendition outcome.

use crate::config::{ThumbnailConfig, TileLayout};
use crate::encode::Transcoder;
use crate::pipeline::SourceAsset;
use crate::tool::ToolError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Directory inside an asset's output folder holding the still images
pub const THUMBNAILS_DIR: &str = "thumbnails";

/// Error type for thumbnail generation
#[derive(Debug, Error)]
pub enum ThumbnailError {
    #[error("thumbnail encoder failed: {0}")]
    Tool(#[from] ToolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of one thumbnail artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// Disabled in configuration
    Disabled,
    /// Written at this location (a pattern for the mosaic sheets)
    Created { path: PathBuf },
    Failed { reason: String },
}

impl ArtifactStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, ArtifactStatus::Failed { .. })
    }
}

/// Outcome of the thumbnail task for one asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailReport {
    pub poster: ArtifactStatus,
    pub mosaic: ArtifactStatus,
}

impl ThumbnailReport {
    /// Both artifacts failed for the same reason (e.g. the directory could not be created)
    pub fn failed(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            poster: ArtifactStatus::Failed {
                reason: reason.clone(),
            },
            mosaic: ArtifactStatus::Failed { reason },
        }
    }
}

/// Seek position for the poster frame: `duration * percentage / 100`
pub fn poster_timestamp(duration_secs: f64, percentage: f64) -> f64 {
    duration_secs * percentage / 100.0
}

/// Upper bound on frames the mosaic filter samples: one per interval
pub fn preview_frame_budget(duration_secs: f64, interval_secs: u32) -> u64 {
    if duration_secs <= 0.0 || interval_secs == 0 {
        return 0;
    }
    (duration_secs / interval_secs as f64).ceil() as u64
}

/// Number of mosaic sheets needed to tile `frames` frames
pub fn mosaic_sheet_count(frames: u64, layout: TileLayout) -> u64 {
    frames.div_ceil(layout.cells() as u64)
}

/// Single poster frame extraction
#[derive(Debug, Clone)]
pub struct PosterRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub timestamp_secs: f64,
}

/// Tiled preview sheet extraction
#[derive(Debug, Clone)]
pub struct MosaicRequest {
    pub input_path: PathBuf,
    /// Numbered output pattern (`preview_thumb%03d.<ext>`)
    pub output_pattern: PathBuf,
    pub interval_secs: u32,
    pub frame_height: u32,
    pub layout: TileLayout,
}

/// `ffmpeg -y -hide_banner -loglevel error -ss <t> -i <src> -frames:v 1 <out>`
pub fn build_poster_command(program: &Path, request: &PosterRequest) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
    cmd.arg("-ss").arg(format!("{:.3}", request.timestamp_secs));
    cmd.arg("-i").arg(&request.input_path);
    cmd.args(["-frames:v", "1"]);
    cmd.arg(&request.output_path);
    cmd
}

/// Filter graph picking one frame per interval, scaling and tiling it
pub fn mosaic_filter(interval_secs: u32, frame_height: u32, layout: TileLayout) -> String {
    format!(
        "select='isnan(prev_selected_t)+gte(t-prev_selected_t,{})',scale=-2:{},tile=layout={}",
        interval_secs, frame_height, layout
    )
}

/// `ffmpeg ... -i <src> -vf <mosaic filter> -fps_mode vfr -q:v 2 <pattern>`
pub fn build_mosaic_command(program: &Path, request: &MosaicRequest) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(["-y", "-hide_banner", "-loglevel", "error"]);
    cmd.arg("-i").arg(&request.input_path);
    cmd.arg("-vf").arg(mosaic_filter(
        request.interval_secs,
        request.frame_height,
        request.layout,
    ));
    cmd.args(["-fps_mode", "vfr", "-q:v", "2"]);
    cmd.arg(&request.output_pattern);
    cmd
}

/// Produces the poster and mosaic for one asset
pub struct ThumbnailGenerator<T> {
    transcoder: Arc<T>,
    config: ThumbnailConfig,
}

impl<T: Transcoder> ThumbnailGenerator<T> {
    pub fn new(transcoder: Arc<T>, config: ThumbnailConfig) -> Self {
        Self { transcoder, config }
    }

    pub fn poster_request(&self, asset: &SourceAsset, thumbs_dir: &Path) -> PosterRequest {
        PosterRequest {
            input_path: asset.path.clone(),
            output_path: thumbs_dir.join(format!("main.{}", self.config.extension)),
            timestamp_secs: poster_timestamp(asset.duration_secs, self.config.poster_percentage),
        }
    }

    pub fn mosaic_request(&self, asset: &SourceAsset, thumbs_dir: &Path) -> MosaicRequest {
        MosaicRequest {
            input_path: asset.path.clone(),
            output_pattern: thumbs_dir.join(format!("preview_thumb%03d.{}", self.config.extension)),
            interval_secs: self.config.preview_interval_secs,
            frame_height: self.config.preview_height,
            layout: self.config.preview_layout,
        }
    }

    /// Generate both artifacts concurrently under `<asset_dir>/thumbnails`
    pub async fn generate(
        &self,
        asset: &SourceAsset,
        asset_dir: &Path,
        cancel: &CancellationToken,
    ) -> ThumbnailReport {
        if !self.config.poster && !self.config.preview {
            return ThumbnailReport {
                poster: ArtifactStatus::Disabled,
                mosaic: ArtifactStatus::Disabled,
            };
        }

        let thumbs_dir = asset_dir.join(THUMBNAILS_DIR);
        if let Err(e) = tokio::fs::create_dir_all(&thumbs_dir).await {
            warn!(asset = %asset.name, error = %e, "could not create thumbnails directory");
            return ThumbnailReport::failed(ThumbnailError::Io(e).to_string());
        }

        let poster = async {
            if !self.config.poster {
                return ArtifactStatus::Disabled;
            }
            let request = self.poster_request(asset, &thumbs_dir);
            info!(
                asset = %asset.name,
                at_secs = request.timestamp_secs,
                "creating poster thumbnail"
            );
            match self.transcoder.capture_poster(&request, cancel).await {
                Ok(()) => ArtifactStatus::Created {
                    path: request.output_path,
                },
                Err(e) => ArtifactStatus::Failed {
                    reason: e.to_string(),
                },
            }
        };

        let mosaic = async {
            if !self.config.preview {
                return ArtifactStatus::Disabled;
            }
            let request = self.mosaic_request(asset, &thumbs_dir);
            let frames = preview_frame_budget(asset.duration_secs, request.interval_secs);
            info!(
                asset = %asset.name,
                interval_secs = request.interval_secs,
                frames,
                sheets = mosaic_sheet_count(frames, request.layout),
                "creating preview thumbnails"
            );
            match self.transcoder.render_mosaic(&request, cancel).await {
                Ok(()) => ArtifactStatus::Created {
                    path: request.output_pattern,
                },
                Err(e) => ArtifactStatus::Failed {
                    reason: e.to_string(),
                },
            }
        };

        let (poster, mosaic) = tokio::join!(poster, mosaic);

        for (artifact, status) in [("poster", &poster), ("mosaic", &mosaic)] {
            match status {
                ArtifactStatus::Failed { reason } => {
                    warn!(asset = %asset.name, artifact, reason = %reason, "thumbnail failed")
                }
                ArtifactStatus::Created { .. } => {
                    info!(asset = %asset.name, artifact, "thumbnail created")
                }
                ArtifactStatus::Disabled => {}
            }
        }

        ThumbnailReport { poster, mosaic }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMedia;
    use proptest::prelude::*;
    use tempfile::TempDir;

    fn get_command_args(cmd: &Command) -> Vec<String> {
        cmd.get_args()
            .filter_map(|arg| arg.to_str().map(String::from))
            .collect()
    }

    fn asset(duration_secs: f64) -> SourceAsset {
        SourceAsset {
            path: PathBuf::from("input/movie.mp4"),
            name: "movie".to_string(),
            duration_secs,
        }
    }

    #[test]
    fn test_poster_timestamp_examples() {
        assert!((poster_timestamp(100.0, 20.0) - 20.0).abs() < 1e-9);
        assert!((poster_timestamp(60.0, 50.0) - 30.0).abs() < 1e-9);
        assert_eq!(poster_timestamp(0.0, 20.0), 0.0);
    }

    #[test]
    fn test_preview_frame_budget_examples() {
        assert_eq!(preview_frame_budget(60.0, 5), 12);
        assert_eq!(preview_frame_budget(61.0, 5), 13);
        assert_eq!(preview_frame_budget(0.0, 5), 0);
        assert_eq!(preview_frame_budget(3.0, 5), 1);
    }

    #[test]
    fn test_mosaic_sheet_count() {
        let layout = TileLayout { columns: 5, rows: 5 };
        assert_eq!(mosaic_sheet_count(12, layout), 1);
        assert_eq!(mosaic_sheet_count(25, layout), 1);
        assert_eq!(mosaic_sheet_count(26, layout), 2);
        assert_eq!(mosaic_sheet_count(0, layout), 0);
    }

    #[test]
    fn test_poster_command_seeks_before_input() {
        let request = PosterRequest {
            input_path: PathBuf::from("input/movie.mp4"),
            output_path: PathBuf::from("out/movie/thumbnails/main.jpg"),
            timestamp_secs: 30.0,
        };
        let args = get_command_args(&build_poster_command(Path::new("ffmpeg"), &request));
        assert_eq!(
            args,
            vec![
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-ss",
                "30.000",
                "-i",
                "input/movie.mp4",
                "-frames:v",
                "1",
                "out/movie/thumbnails/main.jpg",
            ]
        );
    }

    #[test]
    fn test_mosaic_command_filter_graph() {
        let request = MosaicRequest {
            input_path: PathBuf::from("input/movie.mp4"),
            output_pattern: PathBuf::from("out/movie/thumbnails/preview_thumb%03d.jpg"),
            interval_secs: 5,
            frame_height: 144,
            layout: TileLayout { columns: 5, rows: 5 },
        };
        let args = get_command_args(&build_mosaic_command(Path::new("ffmpeg"), &request));
        let expected = "select='isnan(prev_selected_t)+gte(t-prev_selected_t,5)',\
                        scale=-2:144,tile=layout=5x5";
        assert!(args.windows(2).any(|w| w[0] == "-vf" && w[1] == expected));
        assert!(args.windows(2).any(|w| w[0] == "-fps_mode" && w[1] == "vfr"));
        assert!(args.windows(2).any(|w| w[0] == "-q:v" && w[1] == "2"));
        assert_eq!(
            args.last().map(String::as_str),
            Some("out/movie/thumbnails/preview_thumb%03d.jpg")
        );
    }

    #[tokio::test]
    async fn test_generate_writes_both_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeMedia::new(60.0));
        let generator = ThumbnailGenerator::new(fake.clone(), ThumbnailConfig {
            poster_percentage: 50.0,
            ..ThumbnailConfig::default()
        });

        let report = generator
            .generate(&asset(60.0), temp_dir.path(), &CancellationToken::new())
            .await;

        let thumbs = temp_dir.path().join(THUMBNAILS_DIR);
        assert_eq!(
            report.poster,
            ArtifactStatus::Created {
                path: thumbs.join("main.jpg")
            }
        );
        assert_eq!(
            report.mosaic,
            ArtifactStatus::Created {
                path: thumbs.join("preview_thumb%03d.jpg")
            }
        );
        assert_eq!(fake.poster_timestamps(), vec![30.0]);
        assert!(thumbs.join("main.jpg").exists());
        assert!(thumbs.join("preview_thumb001.jpg").exists());
    }

    #[tokio::test]
    async fn test_generate_reports_failures_independently() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeMedia::new(60.0).failing_poster());
        let generator = ThumbnailGenerator::new(fake, ThumbnailConfig::default());

        let report = generator
            .generate(&asset(60.0), temp_dir.path(), &CancellationToken::new())
            .await;

        assert!(report.poster.is_failed());
        assert!(matches!(report.mosaic, ArtifactStatus::Created { .. }));
    }

    #[tokio::test]
    async fn test_generate_respects_disabled_artifacts() {
        let temp_dir = TempDir::new().unwrap();
        let fake = Arc::new(FakeMedia::new(60.0));
        let generator = ThumbnailGenerator::new(fake.clone(), ThumbnailConfig {
            preview: false,
            ..ThumbnailConfig::default()
        });

        let report = generator
            .generate(&asset(60.0), temp_dir.path(), &CancellationToken::new())
            .await;

        assert!(matches!(report.poster, ArtifactStatus::Created { .. }));
        assert_eq!(report.mosaic, ArtifactStatus::Disabled);
        assert_eq!(fake.mosaic_calls(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_poster_lands_inside_source(duration in 0.0f64..100_000.0, pct in 0.0f64..=100.0) {
            let t = poster_timestamp(duration, pct);
            prop_assert!(t >= 0.0);
            prop_assert!(t <= duration + 1e-9);
        }

        #[test]
        fn prop_frame_budget_covers_duration(
            duration in 0.001f64..100_000.0,
            interval in 1u32..600,
        ) {
            let frames = preview_frame_budget(duration, interval);
            prop_assert!(frames as f64 * interval as f64 >= duration);
            prop_assert!((frames.saturating_sub(1)) as f64 * (interval as f64) < duration);
        }
    }
}
