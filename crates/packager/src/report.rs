//! Per-asset outcome reporting

use crate::config::Resolution;
use crate::orchestrator::{EncodeOutcome, JobStatus};
use crate::scan::SourceFile;
use crate::thumbnails::ThumbnailReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Final state of an asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Master playlist written
    Packaged,
    Failed,
    /// Cancelled by the per-asset time limit
    TimedOut,
}

/// Outcome of one rendition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenditionReport {
    pub resolution: Resolution,
    pub status: String,
    pub bandwidth_bytes: Option<u64>,
    pub error: Option<String>,
}

/// Everything that happened to one source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetReport {
    pub asset: String,
    pub source: PathBuf,
    pub status: AssetStatus,
    pub duration_secs: Option<f64>,
    pub renditions: Vec<RenditionReport>,
    pub thumbnails: Option<ThumbnailReport>,
    pub manifest: Option<PathBuf>,
    pub error: Option<String>,
}

impl AssetReport {
    /// Report for an asset nothing has happened to yet
    pub fn new(source: &SourceFile) -> Self {
        Self {
            asset: source.name.clone(),
            source: source.path.clone(),
            status: AssetStatus::Failed,
            duration_secs: None,
            renditions: Vec::new(),
            thumbnails: None,
            manifest: None,
            error: None,
        }
    }

    /// True when the master playlist was written within the time limit
    pub fn is_success(&self) -> bool {
        self.status == AssetStatus::Packaged && self.manifest.is_some()
    }

    pub fn failed(mut self, error: impl ToString) -> Self {
        self.status = AssetStatus::Failed;
        self.error = Some(error.to_string());
        self
    }

    pub fn timed_out(mut self, error: impl ToString) -> Self {
        self.status = AssetStatus::TimedOut;
        self.error = Some(error.to_string());
        self
    }

    pub fn record_renditions(&mut self, outcome: &EncodeOutcome) {
        self.renditions = outcome
            .jobs
            .iter()
            .map(|job| RenditionReport {
                resolution: job.spec.resolution,
                status: job.status.as_str().to_string(),
                bandwidth_bytes: job.bandwidth_bytes,
                error: match &job.status {
                    JobStatus::Failed(reason) => Some(reason.clone()),
                    _ => None,
                },
            })
            .collect();
    }

    pub fn failed_renditions(&self) -> usize {
        self.renditions
            .iter()
            .filter(|r| r.error.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> SourceFile {
        SourceFile {
            path: PathBuf::from("input/movie.mp4"),
            name: "movie".to_string(),
        }
    }

    #[test]
    fn test_new_report_is_not_a_success() {
        let report = AssetReport::new(&source());
        assert_eq!(report.asset, "movie");
        assert!(!report.is_success());
    }

    #[test]
    fn test_timed_out_is_not_a_success_even_with_manifest() {
        let mut report = AssetReport::new(&source());
        report.status = AssetStatus::Packaged;
        report.manifest = Some(PathBuf::from("out/movie/master.m3u8"));
        assert!(report.is_success());

        let report = report.timed_out("took too long");
        assert!(!report.is_success());
        assert_eq!(report.status, AssetStatus::TimedOut);
    }

    #[test]
    fn test_report_serializes_status_in_snake_case() {
        let report = AssetReport::new(&source()).timed_out("x");
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["asset"], "movie");
        assert_eq!(json["error"], "x");
    }
}
