//! Scanner module for discovering input videos.
//!
//! A single file is taken as-is when its extension is supported. A directory
//! is walked one level deep, or fully when recursive, skipping hidden entries
//! and the pipeline's own work directories.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Input extensions accepted by the scanner (case-insensitive).
pub const VIDEO_EXTENSIONS: &[&str] = &["avi", "mpg", "mpeg", "wmv", "mov", "mp4", "mkv"];

/// Errors reported for the path given on the command line.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("input path does not exist: {0}")]
    NotFound(PathBuf),

    #[error("unsupported file type: {0}")]
    Unsupported(PathBuf),

    #[error("failed to read directory: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Checks if a file has a supported video extension.
pub fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            VIDEO_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_str().map(|n| n.starts_with('.')).unwrap_or(false)
}

/// Directories the walker must not descend into.
///
/// Single-component relative entries (like the default `tmp_fix`) match by
/// directory name anywhere in the tree; anything else matches by location.
#[derive(Debug, Clone, Default)]
pub struct Exclusions {
    names: Vec<std::ffi::OsString>,
    locations: Vec<PathBuf>,
}

impl Exclusions {
    pub fn new<'a>(dirs: impl IntoIterator<Item = &'a Path>) -> Self {
        let mut names = Vec::new();
        let mut locations = Vec::new();
        for dir in dirs {
            let mut components = dir.components();
            match (components.next(), components.next()) {
                (Some(std::path::Component::Normal(name)), None) => names.push(name.to_owned()),
                _ => {
                    if let Ok(canonical) = dir.canonicalize() {
                        locations.push(canonical);
                    }
                }
            }
        }
        Self { names, locations }
    }

    fn excludes(&self, dir: &Path) -> bool {
        if let Some(name) = dir.file_name() {
            if self.names.iter().any(|n| n == name) {
                return true;
            }
        }
        if self.locations.is_empty() {
            return false;
        }
        dir.canonicalize()
            .map(|c| self.locations.contains(&c))
            .unwrap_or(false)
    }
}

/// Reject paths that do not exist and single files of an unsupported type.
pub fn validate_input(path: &Path) -> Result<(), ScanError> {
    if !path.exists() {
        return Err(ScanError::NotFound(path.to_path_buf()));
    }
    if path.is_file() && !is_video_file(path) {
        return Err(ScanError::Unsupported(path.to_path_buf()));
    }
    Ok(())
}

/// Collect the inputs under `path`, sorted for a deterministic submission order.
pub fn scan_inputs(
    path: &Path,
    recursive: bool,
    exclusions: &Exclusions,
) -> Result<Vec<PathBuf>, ScanError> {
    validate_input(path)?;
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let walker = WalkDir::new(path)
        .max_depth(max_depth)
        .into_iter()
        .filter_entry(|entry| {
            // The root is always walked, even if hidden or excluded by name
            if entry.depth() == 0 {
                return true;
            }
            if is_hidden(entry.file_name()) {
                return false;
            }
            !(entry.file_type().is_dir() && exclusions.excludes(entry.path()))
        });

    let mut inputs = Vec::new();
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && is_video_file(entry.path()) {
            inputs.push(entry.into_path());
        }
    }
    inputs.sort();
    Ok(inputs)
}
