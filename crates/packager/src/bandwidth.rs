//! Bandwidth Module
//!
//! Post-encode measurement of the largest segment in a rendition directory,
//! and conversion of that measurement into the master playlist's BANDWIDTH.

use crate::config::{BandwidthMode, Resolution};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Error type for bandwidth collection
#[derive(Debug, Error)]
pub enum BandwidthError {
    #[error("IO error while measuring segments: {0}")]
    Io(#[from] std::io::Error),

    /// The encoder reported success but left no segments behind
    #[error("no segment files in {0}")]
    NoSegments(PathBuf),
}

/// Checks if a path is an MPEG-TS segment (case-insensitive `.ts`)
pub fn is_segment_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("ts"))
        .unwrap_or(false)
}

/// Largest value of a set of segment sizes, `None` for an empty set
pub fn peak_of<I: IntoIterator<Item = u64>>(sizes: I) -> Option<u64> {
    sizes.into_iter().max()
}

/// Size in bytes of the largest segment file directly inside `dir`.
///
/// Blocking; callers on the runtime should go through `spawn_blocking`.
pub fn peak_segment_bytes(dir: &Path) -> Result<u64, BandwidthError> {
    let mut sizes = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(std::io::Error::from)?;
        if entry.file_type().is_file() && is_segment_file(entry.path()) {
            sizes.push(entry.metadata().map_err(std::io::Error::from)?.len());
        }
    }
    peak_of(sizes).ok_or_else(|| BandwidthError::NoSegments(dir.to_path_buf()))
}

/// BANDWIDTH attribute for a rendition with the given peak segment size
pub fn playlist_bandwidth(peak_bytes: u64, mode: BandwidthMode, segment_seconds: u32) -> u64 {
    match mode {
        BandwidthMode::PeakSegmentBytes => peak_bytes,
        BandwidthMode::PeakBitsPerSecond => {
            let bits = peak_bytes.saturating_mul(8);
            let secs = segment_seconds.max(1) as u64;
            bits.div_ceil(secs)
        }
    }
}

/// Peak segment bytes per resolution, filled as encode jobs finish
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BandwidthTable {
    entries: HashMap<Resolution, u64>,
}

impl BandwidthTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the peak for a resolution, returning the previous value if any
    pub fn record(&mut self, resolution: Resolution, peak_bytes: u64) -> Option<u64> {
        self.entries.insert(resolution, peak_bytes)
    }

    pub fn get(&self, resolution: Resolution) -> Option<u64> {
        self.entries.get(&resolution).copied()
    }

    pub fn contains(&self, resolution: Resolution) -> bool {
        self.entries.contains_key(&resolution)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
