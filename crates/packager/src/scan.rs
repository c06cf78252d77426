//! Scanner module for discovering source videos in the input directory.
//!
//! Every video file directly inside the input directory is one asset. The asset
//! name (and so its output directory) is the file name with its final extension
//! stripped.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Video file extensions supported by the scanner (case-insensitive matching).
pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".m4v", ".ts", ".m2ts", ".webm",
];

/// A source video discovered in the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Full path to the video file.
    pub path: PathBuf,
    /// Asset name, used as the output directory and sub-playlist name.
    pub name: String,
}

/// Checks if a file has a video extension (case-insensitive).
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext_lower = format!(".{}", ext.to_lowercase());
            VIDEO_EXTENSIONS.contains(&ext_lower.as_str())
        })
        .unwrap_or(false)
}

/// Derives the asset name by stripping the final extension.
///
/// `/in/movie.2024.mkv` -> `movie.2024`. Returns `None` for paths without a
/// usable UTF-8 file name.
pub fn asset_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    if stem.is_empty() {
        None
    } else {
        Some(stem.to_string())
    }
}

/// Scans the input directory (non-recursively) for source videos.
///
/// - Hidden files (names starting with `.`) are skipped
/// - Files are filtered by video extension (case-insensitive)
/// - Results are sorted by path so runs are reproducible
/// - Two files mapping to the same asset name would share an output
///   directory; only the first (by path order) is kept
pub fn scan_inputs(input_dir: &Path) -> io::Result<Vec<SourceFile>> {
    if !input_dir.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("input directory {} does not exist", input_dir.display()),
        ));
    }

    let mut paths = Vec::new();
    for entry in WalkDir::new(input_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        let hidden = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false);
        if hidden || !is_video_file(entry.path()) {
            continue;
        }

        paths.push(entry.into_path());
    }
    paths.sort();

    let mut seen = HashSet::new();
    let mut sources = Vec::with_capacity(paths.len());
    for path in paths {
        let Some(name) = asset_name(&path) else {
            warn!(path = %path.display(), "skipping file without a usable name");
            continue;
        };
        if !seen.insert(name.clone()) {
            warn!(
                path = %path.display(),
                asset = %name,
                "skipping file whose asset name is already taken"
            );
            continue;
        }
        sources.push(SourceFile { path, name });
    }

    Ok(sources)
}
