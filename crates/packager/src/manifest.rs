//! Master playlist synthesis.
//!
//! Runs after the encode barrier. Each completed rendition is re-probed for its
//! actual pixel size and listed in rendition table order, so the output does
//! not depend on which encoder finished first.

use crate::bandwidth::playlist_bandwidth;
use crate::config::EncodeConfig;
use crate::orchestrator::{EncodeOutcome, JobStatus};
use crate::probe::{FrameSize, MediaProbe, ProbeError};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// File name of the master playlist inside an asset directory
pub const MASTER_PLAYLIST_NAME: &str = "master.m3u8";

/// Error type for manifest synthesis
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to probe rendition {uri}: {source}")]
    Probe {
        uri: String,
        #[source]
        source: ProbeError,
    },

    #[error("failed to write master playlist: {0}")]
    Io(#[from] std::io::Error),

    #[error("no rendition succeeded")]
    NoRenditions,

    /// Called before the barrier or with a table that disagrees with the jobs
    #[error("encode outcome is incomplete: {0}")]
    Incomplete(String),
}

/// One `#EXT-X-STREAM-INF` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterPlaylistEntry {
    pub bandwidth: u64,
    pub resolution: FrameSize,
    /// Relative to the master playlist (`720p/movie.m3u8`)
    pub uri: String,
}

/// Master playlist text model
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterPlaylist {
    pub entries: Vec<MasterPlaylistEntry>,
}

impl MasterPlaylist {
    pub fn render(&self) -> String {
        let mut out = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
        for entry in &self.entries {
            // Infallible for String
            let _ = write!(
                out,
                "\n#EXT-X-STREAM-INF:BANDWIDTH={},RESOLUTION={}\n{}\n",
                entry.bandwidth, entry.resolution, entry.uri
            );
        }
        out
    }
}

/// Relative URI of a rendition playlist
pub fn rendition_uri(dir_name: &str, asset_name: &str) -> String {
    format!("{}/{}.m3u8", dir_name, asset_name)
}

/// Write `contents` to `path` through a temporary sibling and a rename, so
/// readers never observe a partial file.
pub async fn write_atomic(path: &Path, contents: &str) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let written = match tokio::fs::write(&tmp, contents).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if written.is_err() {
        let _ = tokio::fs::remove_file(&tmp).await;
    }
    written
}

/// Remove a master playlist left by an earlier run, if any
async fn remove_stale_master(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

/// Builds and writes the master playlist of one asset
pub struct ManifestSynthesizer<P> {
    probe: Arc<P>,
    encode: EncodeConfig,
}

impl<P: MediaProbe> ManifestSynthesizer<P> {
    pub fn new(probe: Arc<P>, encode: EncodeConfig) -> Self {
        Self { probe, encode }
    }

    /// Build the playlist model from a finished encode outcome.
    ///
    /// Fails with `Incomplete` unless every job is terminal and the bandwidth
    /// table holds exactly the completed renditions. Probes stop once `cancel`
    /// fires.
    pub async fn build(
        &self,
        asset_name: &str,
        asset_dir: &Path,
        outcome: &EncodeOutcome,
        cancel: &CancellationToken,
    ) -> Result<MasterPlaylist, ManifestError> {
        check_outcome(outcome)?;

        let mut entries = Vec::new();
        for job in outcome.completed() {
            let resolution = job.spec.resolution;
            let peak = outcome.bandwidth.get(resolution).ok_or_else(|| {
                ManifestError::Incomplete(format!("no bandwidth recorded for {}", resolution))
            })?;

            let dir_name = resolution.dir_name();
            let uri = rendition_uri(&dir_name, asset_name);
            let playlist = asset_dir.join(&dir_name).join(format!("{}.m3u8", asset_name));
            let size = self
                .probe
                .probe_resolution(&playlist, cancel)
                .await
                .map_err(|source| ManifestError::Probe {
                    uri: uri.clone(),
                    source,
                })?;
            debug!(asset = %asset_name, resolution = %resolution, size = %size, "probed rendition");

            entries.push(MasterPlaylistEntry {
                bandwidth: playlist_bandwidth(
                    peak,
                    self.encode.bandwidth_mode,
                    self.encode.segment_seconds,
                ),
                resolution: size,
                uri,
            });
        }

        if entries.is_empty() {
            return Err(ManifestError::NoRenditions);
        }
        Ok(MasterPlaylist { entries })
    }

    /// Build the playlist and write it to `<asset_dir>/master.m3u8`
    ///
    /// When no playlist can be built, a master left by an earlier run is
    /// removed so the asset directory never advertises renditions from it.
    pub async fn synthesize(
        &self,
        asset_name: &str,
        asset_dir: &Path,
        outcome: &EncodeOutcome,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ManifestError> {
        let path = asset_dir.join(MASTER_PLAYLIST_NAME);
        let playlist = match self.build(asset_name, asset_dir, outcome, cancel).await {
            Ok(playlist) => playlist,
            Err(e) => {
                if let Err(io) = remove_stale_master(&path).await {
                    warn!(
                        asset = %asset_name,
                        path = %path.display(),
                        error = %io,
                        "failed to remove stale master playlist"
                    );
                }
                return Err(e);
            }
        };
        write_atomic(&path, &playlist.render()).await?;
        info!(
            asset = %asset_name,
            renditions = playlist.entries.len(),
            path = %path.display(),
            "master playlist written"
        );
        Ok(path)
    }
}

fn check_outcome(outcome: &EncodeOutcome) -> Result<(), ManifestError> {
    if let Some(job) = outcome.jobs.iter().find(|job| !job.is_terminal()) {
        return Err(ManifestError::Incomplete(format!(
            "{} is still {}",
            job.spec.resolution,
            job.status.as_str()
        )));
    }
    for job in &outcome.jobs {
        let recorded = outcome.bandwidth.contains(job.spec.resolution);
        let completed = job.status == JobStatus::Completed;
        if recorded != completed {
            return Err(ManifestError::Incomplete(format!(
                "bandwidth table disagrees with {} ({})",
                job.spec.resolution,
                job.status.as_str()
            )));
        }
    }
    if outcome.bandwidth.len() != outcome.completed().count() {
        return Err(ManifestError::Incomplete(
            "bandwidth table has entries for renditions that were not encoded".to_string(),
        ));
    }
    Ok(())
}
