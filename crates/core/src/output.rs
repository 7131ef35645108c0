//! Final output naming.
//!
//! A converted file goes to `<dir>/<stem>.mkv`, where `dir` is the configured
//! output directory or the input's own. If that path is the input itself the
//! first choice becomes `<stem>_converted.mkv`. Taken names fall through to
//! `<stem>_<ext>.mkv` and then `<stem>_1.mkv`, `<stem>_2.mkv`, ... The name is
//! claimed with an exclusive create only once an encode has verified, so an
//! existing file is never replaced and two inputs never share an output.

use crate::scratch::{claim_first_free, first_free};
use std::io;
use std::path::{Path, PathBuf};

/// Highest numeric suffix tried before giving up on a name.
const MAX_SUFFIX: u32 = 10_000;

/// Where the converted file for one input may go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    input: PathBuf,
    dir: PathBuf,
    stem: String,
    ext: Option<String>,
}

impl OutputTarget {
    pub fn for_input(input: &Path, output_dir: Option<&Path>) -> Self {
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let ext = input
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        Self {
            input: input.to_path_buf(),
            dir,
            stem,
            ext,
        }
    }

    /// Directory the output and its temporary files live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The `n`th name in order of preference.
    pub fn candidate(&self, n: u32) -> PathBuf {
        let name = match (n, &self.ext) {
            (0, _) => {
                let plain = self.dir.join(format!("{}.mkv", self.stem));
                if same_file(&plain, &self.input) {
                    return self.dir.join(format!("{}_converted.mkv", self.stem));
                }
                return plain;
            }
            (1, Some(ext)) => format!("{}_{}.mkv", self.stem, ext),
            (n, Some(_)) => format!("{}_{}.mkv", self.stem, n - 1),
            (n, None) => format!("{}_{}.mkv", self.stem, n),
        };
        self.dir.join(name)
    }

    /// The most preferred name. Temporary files are named after it.
    pub fn preferred(&self) -> PathBuf {
        self.candidate(0)
    }

    fn candidates(&self) -> impl Iterator<Item = PathBuf> + '_ {
        (0..=MAX_SUFFIX)
            .map(move |n| self.candidate(n))
            .filter(move |c| !same_file(c, &self.input))
    }

    /// Claim the first free name. The returned path holds an empty placeholder
    /// until the verified output is renamed over it.
    pub fn claim(&self) -> io::Result<PathBuf> {
        claim_first_free(self.candidates())?.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("no free output name for {}", self.input.display()),
            )
        })
    }

    /// The name [`OutputTarget::claim`] would pick right now. Claims nothing.
    pub fn preview(&self) -> PathBuf {
        first_free(self.candidates()).unwrap_or_else(|| self.preferred())
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
