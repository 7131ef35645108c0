//! Archiver module for moving converted originals out of the way.
//!
//! Originals are moved, never copied and kept, into a shared archive directory.
//! Name collisions get a numeric suffix instead of overwriting an existing
//! archived file.

use crate::scratch::{claim_first_free, first_free};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Highest numeric suffix tried before giving up on a name.
const MAX_SUFFIX: u32 = 10_000;

/// Errors that can occur while archiving an original.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Failed to create the archive directory.
    #[error("failed to create archive directory: {0}")]
    CreateDir(io::Error),

    /// No free destination name could be reserved.
    #[error("failed to reserve archive name for {0}")]
    NoFreeName(String),

    /// Failed to move the original into the archive.
    #[error("failed to move original: {0}")]
    MoveFailed(io::Error),
}

/// What happened to the original after a conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArchiveOutcome {
    /// Moved to this path.
    Archived(PathBuf),
    /// Left at its source path.
    NotArchived,
    /// Moving failed. The converted output still counts as a success.
    Failed(String),
}

impl ArchiveOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, ArchiveOutcome::Failed(_))
    }
}

/// Archive `original` after a conversion.
///
/// Nothing moves unless `succeeded` is set and `keep_original` is not. Errors
/// are folded into [`ArchiveOutcome::Failed`].
pub fn archive(original: &Path, succeeded: bool, keep_original: bool, archive_dir: &Path) -> ArchiveOutcome {
    if !succeeded || keep_original {
        return ArchiveOutcome::NotArchived;
    }

    match move_to_archive(original, archive_dir) {
        Ok(dest) => {
            info!(file = %original.display(), archived = %dest.display(), "original archived");
            ArchiveOutcome::Archived(dest)
        }
        Err(e) => {
            warn!(file = %original.display(), error = %e, "failed to archive original");
            ArchiveOutcome::Failed(e.to_string())
        }
    }
}

/// Candidate name for the `n`th collision: `<stem>_<n>.<ext>`, or the plain
/// file name for `n == 0`.
pub fn archive_name(original: &Path, n: u32) -> String {
    let file_name = original
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "original".to_string());
    if n == 0 {
        return file_name;
    }

    let stem = original
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.clone());
    match original.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    }
}

/// Move `original` into `archive_dir` and return its new path.
///
/// The destination is reserved with an exclusive create before the move, so
/// two workers archiving the same file name never pick the same slot.
pub fn move_to_archive(original: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    // Fail before reserving anything when there is nothing to move
    fs::metadata(original).map_err(ArchiveError::MoveFailed)?;
    fs::create_dir_all(archive_dir).map_err(ArchiveError::CreateDir)?;

    let dest = reserve(original, archive_dir)?;

    // Rename over the reservation; copy+remove across filesystems
    if fs::rename(original, &dest).is_err() {
        if let Err(e) = fs::copy(original, &dest) {
            let _ = fs::remove_file(&dest);
            return Err(ArchiveError::MoveFailed(e));
        }
        if let Err(e) = fs::remove_file(original) {
            // Leave the original where it was rather than holding two copies
            let _ = fs::remove_file(&dest);
            return Err(ArchiveError::MoveFailed(e));
        }
    }

    Ok(dest)
}

fn candidates<'a>(original: &'a Path, archive_dir: &'a Path) -> impl Iterator<Item = PathBuf> + 'a {
    (0..=MAX_SUFFIX).map(move |n| archive_dir.join(archive_name(original, n)))
}

fn reserve(original: &Path, archive_dir: &Path) -> Result<PathBuf, ArchiveError> {
    claim_first_free(candidates(original, archive_dir))
        .map_err(ArchiveError::MoveFailed)?
        .ok_or_else(|| ArchiveError::NoFreeName(original.display().to_string()))
}

/// Where [`move_to_archive`] would put `original` right now, without moving or
/// reserving anything.
pub fn archive_destination(original: &Path, archive_dir: &Path) -> PathBuf {
    first_free(candidates(original, archive_dir))
        .unwrap_or_else(|| archive_dir.join(archive_name(original, 0)))
}
