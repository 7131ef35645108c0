//! Repair module for fixing legacy streams before they are encoded.
//!
//! Each [`SourceFormat`] maps to at most one [`RepairProcedure`]. A procedure
//! reads the original file and writes a repaired copy into the scratch area;
//! the original is never opened for writing. All procedures are stream copies
//! with bit-exact muxing, so repeating a repair yields the same bytes.

use crate::classify::SourceFormat;
use crate::config::Config;
use crate::process::{run_tool, ToolExit};
use crate::scratch::{unique_name, ScratchFile};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Error type for repair operations
#[derive(Debug, Error)]
pub enum RepairError {
    /// Could not prepare the scratch directory
    #[error("failed to create scratch directory: {0}")]
    ScratchDir(std::io::Error),

    /// ffmpeg could not be launched
    #[error("failed to launch ffmpeg: {0}")]
    Launch(std::io::Error),

    /// ffmpeg reported failure
    #[error("{procedure} failed with {exit}: {diagnostic}")]
    ToolFailed {
        procedure: RepairProcedure,
        exit: ToolExit,
        diagnostic: String,
    },

    /// ffmpeg exited cleanly but produced nothing usable
    #[error("{procedure} produced an empty file")]
    EmptyOutput { procedure: RepairProcedure },
}

/// Result of the repair stage.
#[derive(Debug)]
pub enum RepairOutcome {
    /// No procedure exists for this classification.
    Skipped,
    /// Repaired copy in the scratch area, deleted when dropped.
    Repaired(ScratchFile),
    /// The procedure failed; the file must not be encoded.
    Failed(String),
}

/// Repair procedures, one per repairable classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairProcedure {
    /// Regenerate timestamps and GOP boundaries of MPEG-1 streams.
    Mpeg1Timing,
    /// Same timing rewrite for MPEG-2 streams.
    Mpeg2Timing,
    /// Resynchronise ASF packets, dropping corrupt leading/trailing data.
    WmvResync,
    /// Unpack packed B-frames into standard frame order.
    XvidUnpack,
    /// Remux H.264 out of AVI.
    AviRemux,
}

impl std::fmt::Display for RepairProcedure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RepairProcedure::Mpeg1Timing => write!(f, "mpeg1 timing repair"),
            RepairProcedure::Mpeg2Timing => write!(f, "mpeg2 timing repair"),
            RepairProcedure::WmvResync => write!(f, "wmv packet resync"),
            RepairProcedure::XvidUnpack => write!(f, "xvid b-frame unpack"),
            RepairProcedure::AviRemux => write!(f, "avi remux"),
        }
    }
}

impl RepairProcedure {
    /// Extension (and muxer) of the repaired intermediate.
    pub fn output_extension(&self) -> &'static str {
        match self {
            RepairProcedure::XvidUnpack => "avi",
            _ => "mkv",
        }
    }

    fn muxer(&self) -> &'static str {
        match self {
            RepairProcedure::XvidUnpack => "avi",
            _ => "matroska",
        }
    }
}

/// Selects the repair procedure for a classification, if any.
pub fn select_procedure(format: SourceFormat) -> Option<RepairProcedure> {
    match format {
        SourceFormat::Mpeg1 => Some(RepairProcedure::Mpeg1Timing),
        SourceFormat::Mpeg2 => Some(RepairProcedure::Mpeg2Timing),
        SourceFormat::Wmv3 => Some(RepairProcedure::WmvResync),
        SourceFormat::Xvid => Some(RepairProcedure::XvidUnpack),
        SourceFormat::H264Avi => Some(RepairProcedure::AviRemux),
        SourceFormat::H264 | SourceFormat::Unknown => None,
    }
}

/// Build the ffmpeg command for a repair procedure.
///
/// The output path is always the last argument.
pub fn build_repair_command(
    ffmpeg: &Path,
    procedure: RepairProcedure,
    input: &Path,
    output: &Path,
) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-nostdin", "-y"]);

    // Demuxer options go before the input
    match procedure {
        RepairProcedure::Mpeg1Timing | RepairProcedure::Mpeg2Timing => {
            cmd.args(["-fflags", "+genpts", "-err_detect", "ignore_err"]);
        }
        RepairProcedure::WmvResync => {
            cmd.args(["-fflags", "+genpts+discardcorrupt", "-err_detect", "ignore_err"]);
        }
        RepairProcedure::AviRemux => {
            cmd.args(["-fflags", "+genpts"]);
        }
        RepairProcedure::XvidUnpack => {}
    }

    cmd.arg("-i").arg(input);

    match procedure {
        RepairProcedure::XvidUnpack => {
            cmd.args(["-c", "copy", "-bsf:v", "mpeg4_unpack_bframes"]);
        }
        _ => {
            cmd.args(["-c:v", "copy", "-c:a", "copy"]);
        }
    }

    cmd.args(["-fflags", "+bitexact", "-f", procedure.muxer()]);
    cmd.arg(output);
    cmd
}

/// Runs repair procedures into a scratch directory.
#[derive(Debug, Clone)]
pub struct Repairer {
    ffmpeg: PathBuf,
    scratch_dir: PathBuf,
}

impl Repairer {
    pub fn new(ffmpeg: PathBuf, scratch_dir: PathBuf) -> Self {
        Self {
            ffmpeg,
            scratch_dir,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.tools.ffmpeg.clone(), cfg.paths.scratch_dir.clone())
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Repairs `input` according to its classification.
    pub fn repair(&self, input: &Path, format: SourceFormat) -> RepairOutcome {
        let Some(procedure) = select_procedure(format) else {
            debug!(file = %input.display(), classification = %format, "no repair needed");
            return RepairOutcome::Skipped;
        };

        info!(file = %input.display(), %procedure, "repairing");
        match self.run_procedure(procedure, input) {
            Ok(scratch) => {
                info!(
                    file = %input.display(),
                    scratch = %scratch.path().display(),
                    "repair complete"
                );
                RepairOutcome::Repaired(scratch)
            }
            Err(e) => {
                warn!(file = %input.display(), error = %e, "repair failed");
                RepairOutcome::Failed(e.to_string())
            }
        }
    }

    /// Scratch path and command the repair of `input` would use, for dry runs.
    /// Creates nothing.
    pub fn planned_command(&self, input: &Path, procedure: RepairProcedure) -> (PathBuf, Command) {
        let scratch = self.scratch_path(input, procedure);
        let cmd = build_repair_command(&self.ffmpeg, procedure, input, &scratch);
        (scratch, cmd)
    }

    fn scratch_path(&self, input: &Path, procedure: RepairProcedure) -> PathBuf {
        self.scratch_dir
            .join(unique_name(input, "fixed", procedure.output_extension(), false))
    }

    fn run_procedure(
        &self,
        procedure: RepairProcedure,
        input: &Path,
    ) -> Result<ScratchFile, RepairError> {
        fs::create_dir_all(&self.scratch_dir).map_err(RepairError::ScratchDir)?;

        // Guard first, so a partial file is removed on every failure path
        let scratch = ScratchFile::new(self.scratch_path(input, procedure));

        let mut cmd = build_repair_command(&self.ffmpeg, procedure, input, scratch.path());
        let run = run_tool(&mut cmd).map_err(RepairError::Launch)?;

        if !run.exit.is_success() {
            return Err(RepairError::ToolFailed {
                procedure,
                exit: run.exit,
                diagnostic: run.stderr_tail,
            });
        }

        match scratch.size() {
            Some(len) if len > 0 => Ok(scratch),
            _ => Err(RepairError::EmptyOutput { procedure }),
        }
    }
}
