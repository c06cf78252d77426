//! Encode orchestrator for the HLS packager
//!
//! Runs one encode job per rendition of an asset concurrently and waits for
//! all of them. Every job task owns a clone of a channel sender and reports
//! exactly one terminal outcome; the orchestrator drops its own sender and
//! drains the channel until it closes, which happens only once the last task
//! has ended. The bandwidth table is read only after that point.

use crate::bandwidth::{peak_segment_bytes, BandwidthError, BandwidthTable};
use crate::config::{Config, RenditionSpec, Resolution};
use crate::encode::{prepare_output_dir, EncodeError, HlsEncodeParams, Transcoder};
use crate::pipeline::SourceAsset;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Error type for a single rendition job
#[derive(Debug, Error)]
pub enum JobError {
    /// Preparing the rendition directory or encoding failed
    #[error("Encode failed: {0}")]
    Encode(#[from] EncodeError),

    /// Encoded output could not be measured
    #[error("Bandwidth measurement failed: {0}")]
    Bandwidth(#[from] BandwidthError),
}

/// Job status within the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    /// Planned, not yet dispatched
    Pending,
    /// Encoder running
    Running,
    /// Encoded and measured
    Completed,
    /// Failed with a reason
    Failed(String),
}

impl JobStatus {
    /// Convert status to string for reports
    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed(_) => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed(_))
    }
}

/// One rendition of one asset
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub asset: Arc<SourceAsset>,
    pub spec: RenditionSpec,
    /// `<asset_dir>/<res>p`
    pub output_dir: PathBuf,
    pub status: JobStatus,
    /// Peak segment size, set once the job completes
    pub bandwidth_bytes: Option<u64>,
}

impl EncodeJob {
    pub fn new(asset: Arc<SourceAsset>, spec: RenditionSpec, asset_dir: &Path) -> Self {
        let output_dir = asset_dir.join(spec.resolution.dir_name());
        Self {
            asset,
            spec,
            output_dir,
            status: JobStatus::Pending,
            bandwidth_bytes: None,
        }
    }

    pub fn resolution(&self) -> Resolution {
        self.spec.resolution
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// State of all jobs of an asset after the barrier
#[derive(Debug, Clone)]
pub struct EncodeOutcome {
    /// In rendition table order
    pub jobs: Vec<EncodeJob>,
    pub bandwidth: BandwidthTable,
}

impl EncodeOutcome {
    pub fn completed(&self) -> impl Iterator<Item = &EncodeJob> {
        self.jobs
            .iter()
            .filter(|job| job.status == JobStatus::Completed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &EncodeJob> {
        self.jobs
            .iter()
            .filter(|job| matches!(job.status, JobStatus::Failed(_)))
    }

    pub fn all_terminal(&self) -> bool {
        self.jobs.iter().all(EncodeJob::is_terminal)
    }
}

/// Runs the rendition encodes of one asset
pub struct EncodeOrchestrator<T> {
    transcoder: Arc<T>,
    config: Arc<Config>,
}

impl<T: Transcoder + 'static> EncodeOrchestrator<T> {
    pub fn new(transcoder: Arc<T>, config: Arc<Config>) -> Self {
        Self { transcoder, config }
    }

    /// One pending job per configured rendition, in table order
    pub fn plan(&self, asset: &Arc<SourceAsset>, asset_dir: &Path) -> Vec<EncodeJob> {
        self.config
            .renditions
            .iter()
            .map(|spec| EncodeJob::new(Arc::clone(asset), spec.clone(), asset_dir))
            .collect()
    }

    /// Encode every rendition concurrently and wait for all of them.
    ///
    /// One failing rendition never stops its siblings. Cancelling `cancel`
    /// kills every running encoder; the affected jobs end up `Failed`.
    pub async fn run(
        &self,
        asset: Arc<SourceAsset>,
        asset_dir: &Path,
        cancel: &CancellationToken,
    ) -> EncodeOutcome {
        let mut jobs = self.plan(&asset, asset_dir);
        let (tx, mut rx) = mpsc::unbounded_channel::<(usize, Result<u64, JobError>)>();
        let mut tasks = JoinSet::new();

        for (idx, job) in jobs.iter_mut().enumerate() {
            let params = HlsEncodeParams {
                input_path: asset.path.clone(),
                output_dir: job.output_dir.clone(),
                asset_name: asset.name.clone(),
                rendition: job.spec.clone(),
                encode: self.config.encode.clone(),
            };
            let transcoder = Arc::clone(&self.transcoder);
            let cancel = cancel.clone();
            let tx = tx.clone();

            job.status = JobStatus::Running;
            info!(
                asset = %asset.name,
                resolution = %job.spec.resolution,
                "encoding rendition"
            );

            tasks.spawn(async move {
                let result = run_job(transcoder.as_ref(), &params, &cancel).await;
                // The receiver lives until every sender is gone
                let _ = tx.send((idx, result));
            });
        }
        drop(tx);

        let mut bandwidth = BandwidthTable::new();
        while let Some((idx, result)) = rx.recv().await {
            let Some(job) = jobs.get_mut(idx) else {
                continue;
            };
            match result {
                Ok(peak) => {
                    bandwidth.record(job.spec.resolution, peak);
                    job.bandwidth_bytes = Some(peak);
                    job.status = JobStatus::Completed;
                    info!(
                        asset = %asset.name,
                        resolution = %job.spec.resolution,
                        bandwidth = peak,
                        "rendition complete"
                    );
                }
                Err(e) => {
                    warn!(
                        asset = %asset.name,
                        resolution = %job.spec.resolution,
                        error = %e,
                        "rendition failed"
                    );
                    job.status = JobStatus::Failed(e.to_string());
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                warn!(asset = %asset.name, error = %e, "encode task ended abnormally");
            }
        }

        for job in jobs.iter_mut().filter(|job| !job.is_terminal()) {
            job.status = JobStatus::Failed("encode task ended without reporting".to_string());
        }

        EncodeOutcome { jobs, bandwidth }
    }
}

/// Encode one rendition into a cleared directory and measure its peak segment
async fn run_job<T: Transcoder>(
    transcoder: &T,
    params: &HlsEncodeParams,
    cancel: &CancellationToken,
) -> Result<u64, JobError> {
    prepare_output_dir(params).await?;
    transcoder.encode_rendition(params, cancel).await?;

    let dir = params.output_dir.clone();
    let peak = tokio::task::spawn_blocking(move || peak_segment_bytes(&dir))
        .await
        .map_err(|e| BandwidthError::Io(std::io::Error::other(e)))??;
    Ok(peak)
}
