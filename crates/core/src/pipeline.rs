//! Per-file conversion pipeline.
//!
//! Probe, classify, repair, scale, encode and archive one input. Every stage
//! failure becomes a [`PipelineResult::Failure`] for that file only; nothing
//! here returns an error to the batch. A dry run stops after scaling and
//! reports what the remaining stages would do.

use crate::archive::{archive, archive_destination, ArchiveOutcome};
use crate::classify::{classify, SourceFormat};
use crate::config::{Config, SmartModeConfig};
use crate::encode::{AttemptRecord, EncodeError, EncodeOrchestrator, EncodeSource};
use crate::output::OutputTarget;
use crate::probe::probe_file;
use crate::process::command_line;
use crate::repair::{select_procedure, RepairOutcome, RepairProcedure, Repairer};
use crate::scheduler::FileProcessor;
use crate::smart_mode::scale;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pipeline stage, used for progress and failure attribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Probe,
    Repair,
    Encode,
    Archive,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStage::Probe => "probe",
            PipelineStage::Repair => "repair",
            PipelineStage::Encode => "encode",
            PipelineStage::Archive => "archive",
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final outcome for one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineResult {
    Success {
        output: PathBuf,
        archive: ArchiveOutcome,
        /// Whether the encode read a repaired intermediate.
        repaired: bool,
        attempts: Vec<AttemptRecord>,
    },
    /// Dry run. Nothing was written or moved.
    Planned {
        /// Name the output would get right now.
        output: PathBuf,
        repair: Option<RepairProcedure>,
        video_kbps: u32,
        /// Archive destination, `None` when the original would be kept.
        archive: Option<PathBuf>,
    },
    Failure {
        stage: PipelineStage,
        reason: String,
    },
    Cancelled,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    fn failure(stage: PipelineStage, reason: impl Into<String>) -> Self {
        PipelineResult::Failure {
            stage,
            reason: reason.into(),
        }
    }
}

/// The full conversion of one file, built once per batch from [`Config`].
#[derive(Debug, Clone)]
pub struct ConvertPipeline {
    ffprobe: PathBuf,
    repairer: Repairer,
    orchestrator: EncodeOrchestrator,
    smart_mode: SmartModeConfig,
    output_dir: Option<PathBuf>,
    archive_dir: PathBuf,
    keep_original: bool,
    dry_run: bool,
}

impl ConvertPipeline {
    pub fn new(cfg: &Config) -> Self {
        Self {
            ffprobe: cfg.tools.ffprobe.clone(),
            repairer: Repairer::from_config(cfg),
            orchestrator: EncodeOrchestrator::from_config(cfg),
            smart_mode: cfg.smart_mode.clone(),
            output_dir: cfg.paths.output_dir.clone(),
            archive_dir: cfg.paths.archive_dir.clone(),
            keep_original: cfg.archive.keep_original,
            dry_run: false,
        }
    }

    /// Plan every file instead of converting it.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Run every stage for `input`. Blocks on external processes.
    ///
    /// `on_stage` is called as each stage starts. Cancellation is checked
    /// before every stage that launches a process, and a stage that fails once
    /// the token is set reports `Cancelled`. Once an output has been renamed
    /// into place the file is finished, archive included.
    pub fn run(
        &self,
        input: &Path,
        cancel: &CancellationToken,
        on_stage: &dyn Fn(PipelineStage),
    ) -> PipelineResult {
        if cancel.is_cancelled() {
            return PipelineResult::Cancelled;
        }

        on_stage(PipelineStage::Probe);
        let descriptor = match probe_file(&self.ffprobe, input) {
            Ok(d) => d,
            Err(e) => {
                return stage_failed(cancel, input, PipelineStage::Probe, e.to_string());
            }
        };

        let classification = classify(&descriptor);
        let target = scale(&descriptor, &self.smart_mode);
        info!(
            file = %input.display(),
            %classification,
            tier = %target.tier,
            target_kbps = target.kbps,
            "probed"
        );

        if self.dry_run {
            return self.plan(input, classification, target.kbps);
        }

        if cancel.is_cancelled() {
            return PipelineResult::Cancelled;
        }

        on_stage(PipelineStage::Repair);
        let source = match self.repairer.repair(input, classification) {
            RepairOutcome::Skipped => EncodeSource::Original(input.to_path_buf()),
            RepairOutcome::Repaired(scratch) => EncodeSource::Repaired(scratch),
            RepairOutcome::Failed(reason) => {
                return stage_failed(cancel, input, PipelineStage::Repair, reason);
            }
        };
        let repaired = matches!(source, EncodeSource::Repaired(_));

        if cancel.is_cancelled() {
            return PipelineResult::Cancelled;
        }

        on_stage(PipelineStage::Encode);
        let output = OutputTarget::for_input(input, self.output_dir.as_deref());
        let report = match self.orchestrator.encode(source, &output, target.kbps, cancel) {
            Ok(report) => report,
            Err(EncodeError::Cancelled { .. }) => return PipelineResult::Cancelled,
            Err(e) => {
                return stage_failed(cancel, input, PipelineStage::Encode, e.to_string());
            }
        };

        on_stage(PipelineStage::Archive);
        let archive = archive(input, true, self.keep_original, &self.archive_dir);

        info!(file = %input.display(), output = %report.output.display(), "converted");
        PipelineResult::Success {
            output: report.output,
            archive,
            repaired,
            attempts: report.attempts,
        }
    }

    /// Log the commands and destinations of a conversion without running it.
    fn plan(&self, input: &Path, classification: SourceFormat, video_kbps: u32) -> PipelineResult {
        let repair = select_procedure(classification);
        let encode_input = match repair {
            Some(procedure) => {
                let (scratch, cmd) = self.repairer.planned_command(input, procedure);
                info!(
                    file = %input.display(),
                    %procedure,
                    command = %command_line(&cmd),
                    "dry run: would repair"
                );
                scratch
            }
            None => input.to_path_buf(),
        };

        let output = OutputTarget::for_input(input, self.output_dir.as_deref());
        let cmd = self.orchestrator.planned_command(&encode_input, &output, video_kbps);
        info!(file = %input.display(), command = %command_line(&cmd), "dry run: would encode");

        let output = output.preview();
        let archive = if self.keep_original {
            None
        } else {
            Some(archive_destination(input, &self.archive_dir))
        };
        match &archive {
            Some(dest) => info!(
                file = %input.display(),
                output = %output.display(),
                archive = %dest.display(),
                "dry run: would write output and archive original"
            ),
            None => info!(
                file = %input.display(),
                output = %output.display(),
                "dry run: would write output, original kept"
            ),
        }

        PipelineResult::Planned {
            output,
            repair,
            video_kbps,
            archive,
        }
    }
}

/// A stage error, or `Cancelled` when the token was set while it ran (an
/// interrupted tool fails on its way out).
fn stage_failed(
    cancel: &CancellationToken,
    input: &Path,
    stage: PipelineStage,
    reason: String,
) -> PipelineResult {
    if cancel.is_cancelled() {
        info!(file = %input.display(), %stage, %reason, "stage ended after cancellation");
        return PipelineResult::Cancelled;
    }
    warn!(file = %input.display(), %stage, error = %reason, "stage failed");
    PipelineResult::failure(stage, reason)
}

impl FileProcessor for ConvertPipeline {
    fn process(
        &self,
        input: &Path,
        cancel: &CancellationToken,
        on_stage: &dyn Fn(PipelineStage),
    ) -> PipelineResult {
        self.run(input, cancel, on_stage)
    }
}
