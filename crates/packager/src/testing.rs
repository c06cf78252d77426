//! In-process stand-in for ffmpeg and ffprobe used by the unit tests.
//!
//! Encodes write real segment files with chosen sizes after a chosen delay, so
//! the barrier, bandwidth measurement and manifest ordering can be exercised
//! without any external binaries.

use crate::config::Resolution;
use crate::encode::{EncodeError, HlsEncodeParams, Transcoder};
use crate::manifest::MASTER_PLAYLIST_NAME;
use crate::probe::{FrameSize, MediaProbe, ProbeError};
use crate::thumbnails::{MosaicRequest, PosterRequest, ThumbnailError};
use crate::tool::ToolError;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const FAKE_TOOL: &str = "fake-ffmpeg";

#[derive(Debug, Clone, Default)]
struct Behaviour {
    delays: HashMap<Resolution, Duration>,
    segments: HashMap<Resolution, Vec<u64>>,
    failing: HashSet<Resolution>,
    panicking: HashSet<Resolution>,
    failing_duration_for: HashSet<String>,
    failing_duration: bool,
    failing_resolution: bool,
    hanging_duration: bool,
    hanging_resolution: bool,
    failing_poster: bool,
    failing_mosaic: bool,
}

#[derive(Debug, Default)]
struct Observed {
    completion_order: Vec<Resolution>,
    violations: Vec<String>,
    poster_timestamps: Vec<f64>,
    mosaic_calls: usize,
    active_encodes: usize,
    max_active_encodes: usize,
}

/// Fake media toolkit; clones share recorded observations
#[derive(Debug, Clone)]
pub struct FakeMedia {
    duration_secs: f64,
    behaviour: Arc<Behaviour>,
    observed: Arc<Mutex<Observed>>,
}

impl FakeMedia {
    pub fn new(duration_secs: f64) -> Self {
        Self {
            duration_secs,
            behaviour: Arc::new(Behaviour::default()),
            observed: Arc::new(Mutex::new(Observed::default())),
        }
    }

    fn configure(mut self, f: impl FnOnce(&mut Behaviour)) -> Self {
        let mut behaviour = (*self.behaviour).clone();
        f(&mut behaviour);
        self.behaviour = Arc::new(behaviour);
        self
    }

    pub fn with_delay(self, resolution: Resolution, delay: Duration) -> Self {
        self.configure(|b| {
            b.delays.insert(resolution, delay);
        })
    }

    /// Segment sizes written for a resolution; an empty list writes none
    pub fn with_segments(self, resolution: Resolution, sizes: Vec<u64>) -> Self {
        self.configure(|b| {
            b.segments.insert(resolution, sizes);
        })
    }

    pub fn failing(self, resolution: Resolution) -> Self {
        self.configure(|b| {
            b.failing.insert(resolution);
        })
    }

    pub fn panicking(self, resolution: Resolution) -> Self {
        self.configure(|b| {
            b.panicking.insert(resolution);
        })
    }

    pub fn failing_duration_probe(self) -> Self {
        self.configure(|b| b.failing_duration = true)
    }

    /// Duration probe fails only for sources whose file stem is `name`
    pub fn failing_duration_probe_for(self, name: &str) -> Self {
        let name = name.to_string();
        self.configure(|b| {
            b.failing_duration_for.insert(name);
        })
    }

    pub fn failing_resolution_probe(self) -> Self {
        self.configure(|b| b.failing_resolution = true)
    }

    /// Duration lookup never answers; it only returns once cancelled
    pub fn hanging_duration_lookup(self) -> Self {
        self.configure(|b| b.hanging_duration = true)
    }

    /// Resolution lookup never answers; it only returns once cancelled
    pub fn hanging_resolution_lookup(self) -> Self {
        self.configure(|b| b.hanging_resolution = true)
    }

    pub fn failing_poster(self) -> Self {
        self.configure(|b| b.failing_poster = true)
    }

    pub fn failing_mosaic(self) -> Self {
        self.configure(|b| b.failing_mosaic = true)
    }

    pub fn completion_order(&self) -> Vec<Resolution> {
        self.observed.lock().unwrap().completion_order.clone()
    }

    /// Encodes that finished while a master playlist already existed
    pub fn violations(&self) -> Vec<String> {
        self.observed.lock().unwrap().violations.clone()
    }

    pub fn poster_timestamps(&self) -> Vec<f64> {
        self.observed.lock().unwrap().poster_timestamps.clone()
    }

    pub fn mosaic_calls(&self) -> usize {
        self.observed.lock().unwrap().mosaic_calls
    }

    pub fn max_concurrent_encodes(&self) -> usize {
        self.observed.lock().unwrap().max_active_encodes
    }

    fn default_segments(resolution: Resolution) -> Vec<u64> {
        let base = resolution.height() as u64 * 100;
        vec![base, base * 2, base + 7]
    }

    fn failure(code: i32) -> ToolError {
        ToolError::Failed {
            tool: FAKE_TOOL.to_string(),
            code,
            stderr: "simulated failure".to_string(),
        }
    }
}

/// Height from a rendition directory name (`720p` -> 720)
fn height_from_dir(playlist: &Path) -> Option<u32> {
    let dir = playlist.parent()?.file_name()?.to_str()?;
    dir.strip_suffix('p')?.parse().ok()
}

struct ActiveEncode<'a>(&'a Mutex<Observed>);

impl<'a> ActiveEncode<'a> {
    fn enter(observed: &'a Mutex<Observed>) -> Self {
        let mut state = observed.lock().unwrap();
        state.active_encodes += 1;
        state.max_active_encodes = state.max_active_encodes.max(state.active_encodes);
        Self(observed)
    }
}

impl Drop for ActiveEncode<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            state.active_encodes -= 1;
        }
    }
}

async fn hang_until_cancelled(cancel: &CancellationToken) -> ProbeError {
    cancel.cancelled().await;
    ProbeError::Tool(ToolError::Cancelled {
        tool: "fake-ffprobe".to_string(),
    })
}

impl MediaProbe for FakeMedia {
    async fn probe_duration(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<f64, ProbeError> {
        if self.behaviour.hanging_duration {
            return Err(hang_until_cancelled(cancel).await);
        }
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
        if self.behaviour.failing_duration || self.behaviour.failing_duration_for.contains(stem) {
            return Err(ProbeError::Tool(Self::failure(1)));
        }
        Ok(self.duration_secs)
    }

    async fn probe_resolution(
        &self,
        playlist: &Path,
        cancel: &CancellationToken,
    ) -> Result<FrameSize, ProbeError> {
        if self.behaviour.hanging_resolution {
            return Err(hang_until_cancelled(cancel).await);
        }
        if self.behaviour.failing_resolution {
            return Err(ProbeError::Tool(Self::failure(1)));
        }
        let height = height_from_dir(playlist).ok_or_else(|| ProbeError::Parse {
            path: playlist.to_path_buf(),
            reason: "not a rendition directory".to_string(),
        })?;
        let width = (height * 16 / 9 + 1) & !1;
        Ok(FrameSize { width, height })
    }
}

impl Transcoder for FakeMedia {
    async fn encode_rendition(
        &self,
        params: &HlsEncodeParams,
        cancel: &CancellationToken,
    ) -> Result<(), EncodeError> {
        let resolution = params.rendition.resolution;
        let _active = ActiveEncode::enter(&self.observed);

        let delay = self
            .behaviour
            .delays
            .get(&resolution)
            .copied()
            .unwrap_or(Duration::from_millis(5));
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => {
                return Err(EncodeError::Tool(ToolError::Cancelled {
                    tool: FAKE_TOOL.to_string(),
                }));
            }
        }

        if self.behaviour.panicking.contains(&resolution) {
            panic!("simulated encoder crash at {}", resolution);
        }
        if self.behaviour.failing.contains(&resolution) {
            return Err(EncodeError::Tool(Self::failure(1)));
        }

        let sizes = self
            .behaviour
            .segments
            .get(&resolution)
            .cloned()
            .unwrap_or_else(|| Self::default_segments(resolution));
        for (i, size) in sizes.iter().enumerate() {
            let path = params.output_dir.join(format!("segment{:02}.ts", i));
            tokio::fs::write(path, vec![0u8; *size as usize]).await?;
        }
        tokio::fs::write(params.playlist_path(), "#EXTM3U\n#EXT-X-ENDLIST\n").await?;

        let master = params
            .output_dir
            .parent()
            .map(|dir| dir.join(MASTER_PLAYLIST_NAME));
        let mut observed = self.observed.lock().unwrap();
        if master.as_deref().map(Path::exists).unwrap_or(false) {
            observed
                .violations
                .push(format!("{} finished after the master playlist", resolution));
        }
        observed.completion_order.push(resolution);
        Ok(())
    }

    async fn capture_poster(
        &self,
        request: &PosterRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ThumbnailError> {
        self.observed
            .lock()
            .unwrap()
            .poster_timestamps
            .push(request.timestamp_secs);
        if self.behaviour.failing_poster {
            return Err(ThumbnailError::Tool(Self::failure(2)));
        }
        tokio::fs::write(&request.output_path, b"jpeg").await?;
        Ok(())
    }

    async fn render_mosaic(
        &self,
        request: &MosaicRequest,
        _cancel: &CancellationToken,
    ) -> Result<(), ThumbnailError> {
        self.observed.lock().unwrap().mosaic_calls += 1;
        if self.behaviour.failing_mosaic {
            return Err(ThumbnailError::Tool(Self::failure(2)));
        }
        let first_sheet =
            PathBuf::from(request.output_pattern.to_string_lossy().replace("%03d", "001"));
        tokio::fs::write(first_sheet, b"jpeg").await?;
        Ok(())
    }
}
