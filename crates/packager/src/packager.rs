//! Batch entry point for the HLS packager
//!
//! Scans the input directory and runs one asset pipeline per source file,
//! bounded by the configured asset concurrency.

use crate::concurrency::{derive_plan, ConcurrencyPlan};
use crate::config::Config;
use crate::encode::Transcoder;
use crate::pipeline::AssetPipeline;
use crate::probe::MediaProbe;
use crate::report::AssetReport;
use crate::scan::scan_inputs;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Error type for batch-level failures
#[derive(Debug, Error)]
pub enum PackagerError {
    /// Input directory missing or unreadable
    #[error("Failed to scan {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output root could not be created
    #[error("Failed to create output directory {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs the pipeline over every source file of an input directory
pub struct Packager<P, T> {
    pipeline: Arc<AssetPipeline<P, T>>,
    plan: ConcurrencyPlan,
}

impl<P, T> Packager<P, T>
where
    P: MediaProbe + 'static,
    T: Transcoder + 'static,
{
    pub fn new(probe: P, transcoder: T, config: Arc<Config>) -> Self {
        let plan = derive_plan(&config);
        let pipeline = AssetPipeline::new(Arc::new(probe), Arc::new(transcoder), config);
        Self {
            pipeline: Arc::new(pipeline),
            plan,
        }
    }

    pub fn concurrency_plan(&self) -> &ConcurrencyPlan {
        &self.plan
    }

    /// Package every source in `input_dir` under `output_root`.
    ///
    /// Per-asset failures are reported, not returned; reports are sorted by
    /// asset name.
    pub async fn run(
        &self,
        input_dir: &Path,
        output_root: &Path,
    ) -> Result<Vec<AssetReport>, PackagerError> {
        let sources = scan_inputs(input_dir).map_err(|source| PackagerError::Scan {
            path: input_dir.to_path_buf(),
            source,
        })?;

        tokio::fs::create_dir_all(output_root)
            .await
            .map_err(|source| PackagerError::Output {
                path: output_root.to_path_buf(),
                source,
            })?;

        if sources.is_empty() {
            info!(input = %input_dir.display(), "no source videos found");
            return Ok(Vec::new());
        }

        info!(
            assets = sources.len(),
            concurrent_assets = self.plan.concurrent_assets(sources.len()),
            peak_encoders = self.plan.peak_encoder_processes(sources.len()),
            cores = self.plan.total_cores,
            "starting batch"
        );
        if self.plan.is_oversubscribed(sources.len()) {
            warn!(
                peak_encoders = self.plan.peak_encoder_processes(sources.len()),
                cores = self.plan.total_cores,
                "more encoder processes than cores; consider runtime.max_concurrent_assets"
            );
        }

        let semaphore = Arc::new(Semaphore::new(self.plan.asset_permits()));
        let mut tasks = JoinSet::new();

        for source in sources.iter().cloned() {
            let pipeline = Arc::clone(&self.pipeline);
            let semaphore = Arc::clone(&semaphore);
            let output_root = output_root.to_path_buf();

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => return AssetReport::new(&source).failed(e),
                };
                pipeline
                    .run(&source, &output_root, CancellationToken::new())
                    .await
            });
        }

        let mut reports = Vec::with_capacity(sources.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => reports.push(report),
                Err(e) => warn!(error = %e, "asset task ended abnormally"),
            }
        }

        let reported: HashSet<String> = reports.iter().map(|r| r.asset.clone()).collect();
        for source in sources.iter().filter(|s| !reported.contains(&s.name)) {
            reports.push(AssetReport::new(source).failed("asset task ended without reporting"));
        }

        reports.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(reports)
    }
}
