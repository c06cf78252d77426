//! Core configuration structures and loading logic

use crate::rendition::{default_renditions, RenditionSpec, Resolution};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Configuration parsed but holds values the packager cannot use
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// How the master playlist's BANDWIDTH attribute is derived from the peak
/// segment size of a rendition
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthMode {
    /// Emit the peak segment size in bytes unchanged
    #[default]
    PeakSegmentBytes,
    /// Emit `ceil(peak_bytes * 8 / segment_seconds)`
    PeakBitsPerSecond,
}

impl FromStr for BandwidthMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "peak_segment_bytes" => Ok(BandwidthMode::PeakSegmentBytes),
            "peak_bits_per_second" => Ok(BandwidthMode::PeakBitsPerSecond),
            other => Err(format!("unknown bandwidth mode '{}'", other)),
        }
    }
}

/// Encoder settings shared by every rendition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncodeConfig {
    #[serde(default = "default_video_codec")]
    pub video_codec: String,
    /// Constant rate factor (0-51)
    #[serde(default = "default_crf")]
    pub crf: u8,
    #[serde(default = "default_preset")]
    pub preset: String,
    /// Target HLS segment length in seconds
    #[serde(default = "default_segment_seconds")]
    pub segment_seconds: u32,
    /// Keyframes per second used to size the GOP (`segment_seconds * keyframe_rate`)
    #[serde(default = "default_keyframe_rate")]
    pub keyframe_rate: u32,
    /// Encoder threads per rendition (0 = let ffmpeg decide)
    #[serde(default)]
    pub threads: u32,
    #[serde(default = "default_audio_sample_rate")]
    pub audio_sample_rate: u32,
    #[serde(default)]
    pub bandwidth_mode: BandwidthMode,
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_crf() -> u8 {
    21
}

fn default_preset() -> String {
    "veryfast".to_string()
}

fn default_segment_seconds() -> u32 {
    2
}

fn default_keyframe_rate() -> u32 {
    24
}

fn default_audio_sample_rate() -> u32 {
    44100
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            video_codec: default_video_codec(),
            crf: default_crf(),
            preset: default_preset(),
            segment_seconds: default_segment_seconds(),
            keyframe_rate: default_keyframe_rate(),
            threads: 0,
            audio_sample_rate: default_audio_sample_rate(),
            bandwidth_mode: BandwidthMode::default(),
        }
    }
}

/// Longest accepted HLS segment
pub const MAX_SEGMENT_SECONDS: u32 = 60;

/// Highest accepted keyframe rate (frames per second)
pub const MAX_KEYFRAME_RATE: u32 = 240;

/// Most columns or rows a mosaic sheet may have
pub const MAX_TILE_SIDE: u32 = 32;

impl EncodeConfig {
    /// GOP length in frames, so every segment boundary lands on a keyframe
    pub fn gop_size(&self) -> u32 {
        self.segment_seconds.saturating_mul(self.keyframe_rate)
    }
}

/// Grid used to tile preview thumbnails (`columns x rows`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TileLayout {
    pub columns: u32,
    pub rows: u32,
}

impl TileLayout {
    /// Number of frames one mosaic sheet holds
    pub fn cells(&self) -> u32 {
        self.columns.saturating_mul(self.rows)
    }
}

impl FromStr for TileLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cols, rows) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("tile layout '{}' must look like 5x5", s))?;
        let columns: u32 = cols
            .parse()
            .map_err(|_| format!("invalid tile columns in '{}'", s))?;
        let rows: u32 = rows
            .parse()
            .map_err(|_| format!("invalid tile rows in '{}'", s))?;
        if columns == 0 || rows == 0 {
            return Err(format!("tile layout '{}' must be at least 1x1", s));
        }
        Ok(Self { columns, rows })
    }
}

impl TryFrom<String> for TileLayout {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<TileLayout> for String {
    fn from(l: TileLayout) -> Self {
        l.to_string()
    }
}

impl fmt::Display for TileLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.columns, self.rows)
    }
}

/// Poster frame and preview mosaic settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailConfig {
    /// Still image extension (selects the image encoder)
    #[serde(default = "default_thumbnail_extension")]
    pub extension: String,
    #[serde(default = "default_true")]
    pub poster: bool,
    /// Poster position as a percentage of the source duration
    #[serde(default = "default_poster_percentage")]
    pub poster_percentage: f64,
    #[serde(default = "default_true")]
    pub preview: bool,
    /// Seconds between sampled preview frames
    #[serde(default = "default_preview_interval_secs")]
    pub preview_interval_secs: u32,
    /// Height in pixels of each preview frame
    #[serde(default = "default_preview_height")]
    pub preview_height: u32,
    #[serde(default = "default_preview_layout")]
    pub preview_layout: TileLayout,
}

fn default_thumbnail_extension() -> String {
    "jpg".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poster_percentage() -> f64 {
    20.0
}

fn default_preview_interval_secs() -> u32 {
    5
}

fn default_preview_height() -> u32 {
    144
}

fn default_preview_layout() -> TileLayout {
    TileLayout {
        columns: 5,
        rows: 5,
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            extension: default_thumbnail_extension(),
            poster: true,
            poster_percentage: default_poster_percentage(),
            preview: true,
            preview_interval_secs: default_preview_interval_secs(),
            preview_height: default_preview_height(),
            preview_layout: default_preview_layout(),
        }
    }
}

/// Process-level settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuntimeConfig {
    /// Assets packaged at the same time (0 = all at once)
    #[serde(default)]
    pub max_concurrent_assets: u32,
    /// Kill an asset's encoder processes after this many seconds (0 = never)
    #[serde(default)]
    pub asset_timeout_secs: u64,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_concurrent_assets: 0,
            asset_timeout_secs: 0,
            ffmpeg: default_ffmpeg(),
            ffprobe: default_ffprobe(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub thumbnails: ThumbnailConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    /// Rendition ladder, in the order entries appear in the master playlist
    #[serde(default = "default_renditions")]
    pub renditions: Vec<RenditionSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            encode: EncodeConfig::default(),
            thumbnails: ThumbnailConfig::default(),
            runtime: RuntimeConfig::default(),
            renditions: default_renditions(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config.toml file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - HLS_CRF -> encode.crf
    /// - HLS_PRESET -> encode.preset
    /// - HLS_SEGMENT_SECONDS -> encode.segment_seconds
    /// - HLS_THREADS -> encode.threads
    /// - HLS_BANDWIDTH_MODE -> encode.bandwidth_mode
    /// - HLS_MAX_CONCURRENT_ASSETS -> runtime.max_concurrent_assets
    /// - HLS_ASSET_TIMEOUT_SECS -> runtime.asset_timeout_secs
    /// - HLS_FFMPEG -> runtime.ffmpeg
    /// - HLS_FFPROBE -> runtime.ffprobe
    ///
    /// Values that fail to parse are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(crf) = env_parse::<u8>("HLS_CRF") {
            self.encode.crf = crf;
        }

        if let Ok(val) = env::var("HLS_PRESET") {
            if !val.trim().is_empty() {
                self.encode.preset = val.trim().to_string();
            }
        }

        if let Some(secs) = env_parse::<u32>("HLS_SEGMENT_SECONDS") {
            self.encode.segment_seconds = secs;
        }

        if let Some(threads) = env_parse::<u32>("HLS_THREADS") {
            self.encode.threads = threads;
        }

        if let Some(mode) = env_parse::<BandwidthMode>("HLS_BANDWIDTH_MODE") {
            self.encode.bandwidth_mode = mode;
        }

        if let Some(assets) = env_parse::<u32>("HLS_MAX_CONCURRENT_ASSETS") {
            self.runtime.max_concurrent_assets = assets;
        }

        if let Some(secs) = env_parse::<u64>("HLS_ASSET_TIMEOUT_SECS") {
            self.runtime.asset_timeout_secs = secs;
        }

        if let Ok(val) = env::var("HLS_FFMPEG") {
            if !val.is_empty() {
                self.runtime.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("HLS_FFPROBE") {
            if !val.is_empty() {
                self.runtime.ffprobe = PathBuf::from(val);
            }
        }
    }

    /// Check that every value can be handed to the encoder
    ///
    /// Runs once at load time so a bad ladder fails before any asset is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.renditions.is_empty() {
            return Err(invalid("at least one rendition is required"));
        }

        let mut seen: HashSet<Resolution> = HashSet::new();
        for rendition in &self.renditions {
            if !seen.insert(rendition.resolution) {
                return Err(invalid(format!(
                    "rendition {} is listed more than once",
                    rendition.resolution
                )));
            }
        }

        let encode = &self.encode;
        if encode.crf > 51 {
            return Err(invalid(format!("crf must be 0-51, got {}", encode.crf)));
        }
        if encode.preset.trim().is_empty() {
            return Err(invalid("preset must not be empty"));
        }
        if encode.video_codec.trim().is_empty() {
            return Err(invalid("video_codec must not be empty"));
        }
        if !(1..=MAX_SEGMENT_SECONDS).contains(&encode.segment_seconds) {
            return Err(invalid(format!(
                "segment_seconds must be 1-{}, got {}",
                MAX_SEGMENT_SECONDS, encode.segment_seconds
            )));
        }
        if !(1..=MAX_KEYFRAME_RATE).contains(&encode.keyframe_rate) {
            return Err(invalid(format!(
                "keyframe_rate must be 1-{}, got {}",
                MAX_KEYFRAME_RATE, encode.keyframe_rate
            )));
        }
        if encode.audio_sample_rate == 0 {
            return Err(invalid("audio_sample_rate must be positive"));
        }

        let thumbs = &self.thumbnails;
        if thumbs.extension.trim().is_empty() || thumbs.extension.contains(['/', '.']) {
            return Err(invalid(format!(
                "thumbnail extension '{}' is not a plain extension",
                thumbs.extension
            )));
        }
        if !(0.0..=100.0).contains(&thumbs.poster_percentage) {
            return Err(invalid(format!(
                "poster_percentage must be 0-100, got {}",
                thumbs.poster_percentage
            )));
        }
        if thumbs.preview_interval_secs == 0 {
            return Err(invalid("preview_interval_secs must be at least 1"));
        }
        let layout = thumbs.preview_layout;
        if layout.columns > MAX_TILE_SIDE || layout.rows > MAX_TILE_SIDE {
            return Err(invalid(format!(
                "preview_layout {} exceeds {}x{}",
                layout, MAX_TILE_SIDE, MAX_TILE_SIDE
            )));
        }
        if thumbs.preview_height < 2 || thumbs.preview_height % 2 != 0 {
            return Err(invalid(format!(
                "preview_height must be an even number >= 2, got {}",
                thumbs.preview_height
            )));
        }

        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Built-in defaults with environment overrides applied, used when no file is given
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::Invalid(msg.into())
}
