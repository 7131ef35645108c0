//! Scoped files in shared work areas.
//!
//! Several pipelines write into the same scratch and destination directories,
//! so every name carries a per-file uuid token. A [`ScratchFile`] deletes its
//! file when dropped unless it has been persisted.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Build a collision-free file name derived from `input`'s stem.
///
/// `<stem>.<uuid>.<tag>.<ext>`, prefixed with a dot when `hidden` is set.
pub fn unique_name(input: &Path, tag: &str, ext: &str, hidden: bool) -> String {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let token = Uuid::new_v4().simple();
    let prefix = if hidden { "." } else { "" };
    format!("{}{}.{}.{}.{}", prefix, stem, token, tag, ext)
}

/// Claim the first path in `candidates` that does not exist yet.
///
/// Each claim is an exclusive create, so concurrent callers never get the same
/// path and nothing existing is touched. The claimed path holds an empty
/// placeholder for the caller to rename over. `None` when every name is taken.
pub fn claim_first_free(
    candidates: impl IntoIterator<Item = PathBuf>,
) -> io::Result<Option<PathBuf>> {
    for candidate in candidates {
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(Some(candidate)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// First path in `candidates` that does not exist right now. Claims nothing.
pub fn first_free(candidates: impl IntoIterator<Item = PathBuf>) -> Option<PathBuf> {
    candidates
        .into_iter()
        .find(|c| matches!(fs::symlink_metadata(c), Err(e) if e.kind() == io::ErrorKind::NotFound))
}

/// A file owned by the pipeline that is removed on drop.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    armed: bool,
}

impl ScratchFile {
    /// Take ownership of `path`. The file does not need to exist yet.
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the file, `None` if it does not exist.
    pub fn size(&self) -> Option<u64> {
        fs::metadata(&self.path).ok().map(|m| m.len())
    }

    /// Atomically rename into `dest` and stop owning the file.
    ///
    /// On failure the guard stays armed and the file is still cleaned up on drop.
    pub fn persist(mut self, dest: &Path) -> io::Result<()> {
        fs::rename(&self.path, dest)?;
        self.armed = false;
        Ok(())
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if self.armed {
            match fs::remove_file(&self.path) {
                Ok(()) => tracing::debug!(path = %self.path.display(), "removed scratch file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "failed to remove scratch file"
                ),
            }
        }
    }
}
