//! Concurrency planning module for the HLS packager
//!
//! Derives how many assets may run at once and how many encoder processes that
//! implies, from CPU core count and configuration.

use crate::config::Config;
use tokio::sync::Semaphore;

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of assets processed at once, `None` when unbounded
    pub max_concurrent_assets: Option<u32>,
    /// ffmpeg processes one asset runs at the same time (renditions plus
    /// enabled thumbnail artifacts)
    pub encoders_per_asset: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan from configuration
    ///
    /// - Detects CPU cores via num_cpus
    /// - `max_concurrent_assets = 0` means unbounded
    pub fn derive(cfg: &Config) -> Self {
        Self::with_cores(cfg, num_cpus::get() as u32)
    }

    /// Same as [`ConcurrencyPlan::derive`] with an explicit core count
    pub fn with_cores(cfg: &Config, total_cores: u32) -> Self {
        let max_concurrent_assets = match cfg.runtime.max_concurrent_assets {
            0 => None,
            n => Some(n),
        };

        let thumbnail_processes = cfg.thumbnails.poster as u32 + cfg.thumbnails.preview as u32;
        let encoders_per_asset = cfg.renditions.len() as u32 + thumbnail_processes;

        Self {
            total_cores,
            max_concurrent_assets,
            encoders_per_asset,
        }
    }

    /// Number of permits for the asset semaphore
    pub fn asset_permits(&self) -> usize {
        match self.max_concurrent_assets {
            Some(n) => n as usize,
            None => Semaphore::MAX_PERMITS,
        }
    }

    /// Assets that can actually run at once for a batch of `asset_count`
    pub fn concurrent_assets(&self, asset_count: usize) -> usize {
        asset_count.min(self.asset_permits())
    }

    /// Upper bound on simultaneous ffmpeg processes for a batch
    pub fn peak_encoder_processes(&self, asset_count: usize) -> usize {
        self.concurrent_assets(asset_count) * self.encoders_per_asset as usize
    }

    /// More encoder processes than cores at peak
    pub fn is_oversubscribed(&self, asset_count: usize) -> bool {
        self.peak_encoder_processes(asset_count) > self.total_cores as usize
    }
}

/// Public function to derive a concurrency plan from configuration
pub fn derive_plan(cfg: &Config) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(cfg)
}
