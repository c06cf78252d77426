//! Per-asset pipeline
//!
//! probe duration → (thumbnails ‖ encode renditions → master playlist) → report.
//! The thumbnail branch shares the asset's cancellation token but its result
//! never decides whether the asset succeeded.

use crate::config::Config;
use crate::encode::Transcoder;
use crate::manifest::{ManifestError, ManifestSynthesizer};
use crate::orchestrator::EncodeOrchestrator;
use crate::probe::{MediaProbe, ProbeError};
use crate::report::{AssetReport, AssetStatus};
use crate::scan::SourceFile;
use crate::thumbnails::ThumbnailGenerator;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A probed source video
#[derive(Debug, Clone, PartialEq)]
pub struct SourceAsset {
    pub path: PathBuf,
    pub name: String,
    pub duration_secs: f64,
}

/// Errors that end an asset
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to create {path}: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to probe source duration: {0}")]
    Probe(#[from] ProbeError),

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// Processes one source file end to end
pub struct AssetPipeline<P, T> {
    probe: Arc<P>,
    transcoder: Arc<T>,
    config: Arc<Config>,
}

impl<P, T> AssetPipeline<P, T>
where
    P: MediaProbe + 'static,
    T: Transcoder + 'static,
{
    pub fn new(probe: Arc<P>, transcoder: Arc<T>, config: Arc<Config>) -> Self {
        Self {
            probe,
            transcoder,
            config,
        }
    }

    fn time_limit(&self) -> Option<Duration> {
        match self.config.runtime.asset_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Run the asset, enforcing the configured time limit.
    ///
    /// When the limit elapses the token is cancelled, which kills every child
    /// of the asset; the pipeline is still driven to the end so the report
    /// lists what each rendition did.
    pub async fn run(
        &self,
        source: &SourceFile,
        output_root: &Path,
        cancel: CancellationToken,
    ) -> AssetReport {
        let work = self.process(source, output_root, &cancel);
        let Some(limit) = self.time_limit() else {
            return work.await;
        };

        tokio::pin!(work);
        if let Ok(report) = tokio::time::timeout(limit, &mut work).await {
            return report;
        }

        warn!(asset = %source.name, limit_secs = limit.as_secs(), "asset timed out, cancelling");
        cancel.cancel();
        work.await.timed_out(AssetError::TimedOut(limit))
    }

    async fn process(
        &self,
        source: &SourceFile,
        output_root: &Path,
        cancel: &CancellationToken,
    ) -> AssetReport {
        let report = AssetReport::new(source);
        let asset_dir = output_root.join(&source.name);

        if let Err(e) = tokio::fs::create_dir_all(&asset_dir).await {
            cancel.cancel();
            return report.failed(AssetError::Filesystem {
                path: asset_dir,
                source: e,
            });
        }

        let duration_secs = match self.probe.probe_duration(&source.path, cancel).await {
            Ok(secs) => secs,
            Err(e) => {
                warn!(asset = %source.name, error = %e, "duration probe failed");
                cancel.cancel();
                return report.failed(AssetError::Probe(e));
            }
        };
        info!(asset = %source.name, duration_secs, "processing asset");

        let asset = Arc::new(SourceAsset {
            path: source.path.clone(),
            name: source.name.clone(),
            duration_secs,
        });

        let thumbnails =
            ThumbnailGenerator::new(Arc::clone(&self.transcoder), self.config.thumbnails.clone());
        let orchestrator =
            EncodeOrchestrator::new(Arc::clone(&self.transcoder), Arc::clone(&self.config));
        let synthesizer =
            ManifestSynthesizer::new(Arc::clone(&self.probe), self.config.encode.clone());

        let publish = async {
            let outcome = orchestrator.run(Arc::clone(&asset), &asset_dir, cancel).await;
            let manifest = synthesizer
                .synthesize(&asset.name, &asset_dir, &outcome, cancel)
                .await;
            (outcome, manifest)
        };

        let (thumbs, (outcome, manifest)) =
            tokio::join!(thumbnails.generate(&asset, &asset_dir, cancel), publish);

        let mut report = report;
        report.duration_secs = Some(duration_secs);
        report.thumbnails = Some(thumbs);
        report.record_renditions(&outcome);

        match manifest {
            Ok(path) => {
                info!(
                    asset = %asset.name,
                    failed_renditions = report.failed_renditions(),
                    "asset packaged"
                );
                report.status = AssetStatus::Packaged;
                report.manifest = Some(path);
                report
            }
            Err(e) => {
                warn!(asset = %asset.name, error = %e, "asset failed");
                report.failed(AssetError::Manifest(e))
            }
        }
    }
}
