//! Two-tier encode orchestration.
//!
//! Every file goes through `Pending -> HardwareAttempt -> {Success | SoftwareAttempt}`
//! and from `SoftwareAttempt` to `{Success | Failed}`. Each attempt writes to a
//! hidden temporary file next to the final output, and only a verified output
//! is renamed into place, over a name claimed at that moment. The encode source (a repaired scratch file, if any) is
//! owned by the orchestrator and removed when it returns.

use super::ffmpeg::{build_encode_command, EncodeTarget, EncoderTier};
use crate::config::{Config, EncoderConfig, SmartModeConfig};
use crate::output::OutputTarget;
use crate::process::{run_tool, ToolExit};
use crate::scratch::{unique_name, ScratchFile};
use crate::smart_mode::fallback_kbps;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Error type for encode operations
#[derive(Debug, Error)]
pub enum EncodeError {
    /// Cancellation was requested before the encode could finish
    #[error("encode cancelled")]
    Cancelled { attempts: Vec<AttemptRecord> },

    /// Both tiers were tried (or hardware skipped) and neither produced output
    #[error("all encoder tiers failed: {reason}")]
    Exhausted {
        reason: String,
        attempts: Vec<AttemptRecord>,
    },

    /// The destination directory could not be created
    #[error("failed to prepare output directory: {0}")]
    OutputDir(std::io::Error),

    /// A verified output could not be renamed into place
    #[error("failed to move output into place: {0}")]
    Persist(std::io::Error),
}

/// What the encoder reads from.
#[derive(Debug)]
pub enum EncodeSource {
    /// The original input, read-only.
    Original(PathBuf),
    /// A repaired intermediate, deleted once encoding is over.
    Repaired(ScratchFile),
}

impl EncodeSource {
    pub fn path(&self) -> &Path {
        match self {
            EncodeSource::Original(path) => path,
            EncodeSource::Repaired(scratch) => scratch.path(),
        }
    }
}

/// Result of one encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Exit 0 with a verified output.
    Succeeded,
    /// Tier disabled in configuration, never launched.
    Skipped,
    /// The encoder process could not be started.
    LaunchFailed(String),
    /// Killed by a signal.
    Crashed,
    /// Non-zero exit code.
    ExitFailed(i32),
    /// Exit 0 but the output was missing or below the size threshold.
    OutputRejected { size: Option<u64> },
}

impl AttemptOutcome {
    /// Whether the failure points at the encode parameters rather than the tier
    /// being unusable, which warrants a more conservative retry bitrate.
    pub fn suggests_parameter_issue(&self) -> bool {
        matches!(
            self,
            AttemptOutcome::ExitFailed(_) | AttemptOutcome::OutputRejected { .. }
        )
    }
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptOutcome::Succeeded => write!(f, "succeeded"),
            AttemptOutcome::Skipped => write!(f, "skipped"),
            AttemptOutcome::LaunchFailed(e) => write!(f, "launch failed: {}", e),
            AttemptOutcome::Crashed => write!(f, "terminated by signal"),
            AttemptOutcome::ExitFailed(code) => write!(f, "exit code {}", code),
            AttemptOutcome::OutputRejected { size: None } => write!(f, "no output produced"),
            AttemptOutcome::OutputRejected { size: Some(n) } => {
                write!(f, "output too small ({} bytes)", n)
            }
        }
    }
}

/// Log entry for one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub tier: EncoderTier,
    pub video_kbps: u32,
    pub outcome: AttemptOutcome,
}

/// Successful encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeReport {
    pub output: PathBuf,
    pub tier: EncoderTier,
    pub attempts: Vec<AttemptRecord>,
}

/// Encode states. Terminal states carry what the caller needs.
#[derive(Debug)]
pub enum EncodeState {
    Pending,
    HardwareAttempt,
    SoftwareAttempt { video_kbps: u32 },
    Success { tier: EncoderTier, temp: ScratchFile },
    Failed(String),
}

/// Runs the hardware/software encode sequence for one file.
#[derive(Debug, Clone)]
pub struct EncodeOrchestrator {
    ffmpeg: PathBuf,
    encoder: EncoderConfig,
    smart_mode: SmartModeConfig,
}

impl EncodeOrchestrator {
    pub fn new(ffmpeg: PathBuf, encoder: EncoderConfig, smart_mode: SmartModeConfig) -> Self {
        Self {
            ffmpeg,
            encoder,
            smart_mode,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.tools.ffmpeg.clone(),
            cfg.encoder.clone(),
            cfg.smart_mode.clone(),
        )
    }

    /// Encode `source` into a free name of `output` at `video_kbps`.
    ///
    /// `source` is consumed; a repaired scratch source is deleted on every path.
    /// The token is checked before each attempt. A running encoder is allowed to
    /// finish, and its output is kept if it verifies. A failed attempt after
    /// cancellation ends the encode as cancelled.
    pub fn encode(
        &self,
        source: EncodeSource,
        output: &OutputTarget,
        video_kbps: u32,
        cancel: &CancellationToken,
    ) -> Result<EncodeReport, EncodeError> {
        fs::create_dir_all(output.dir()).map_err(EncodeError::OutputDir)?;

        let preferred = output.preferred();
        let target = EncodeTarget::new(preferred.clone(), video_kbps, EncoderTier::Hardware);
        let mut attempts: Vec<AttemptRecord> = Vec::new();
        let mut state = EncodeState::Pending;

        loop {
            state = match state {
                EncodeState::Pending => {
                    if self.encoder.hardware_enabled {
                        EncodeState::HardwareAttempt
                    } else {
                        debug!(output = %preferred.display(), "hardware tier disabled");
                        attempts.push(AttemptRecord {
                            tier: EncoderTier::Hardware,
                            video_kbps,
                            outcome: AttemptOutcome::Skipped,
                        });
                        EncodeState::SoftwareAttempt { video_kbps }
                    }
                }

                EncodeState::HardwareAttempt => {
                    if cancel.is_cancelled() {
                        return Err(EncodeError::Cancelled { attempts });
                    }
                    let (record, temp) = self.attempt(source.path(), &target);
                    let next = match temp {
                        Some(temp) => EncodeState::Success {
                            tier: EncoderTier::Hardware,
                            temp,
                        },
                        None => {
                            let retry_kbps = if record.outcome.suggests_parameter_issue() {
                                fallback_kbps(video_kbps, &self.smart_mode)
                            } else {
                                video_kbps
                            };
                            warn!(
                                output = %preferred.display(),
                                outcome = %record.outcome,
                                retry_kbps,
                                "hardware encode failed, falling back to software"
                            );
                            EncodeState::SoftwareAttempt {
                                video_kbps: retry_kbps,
                            }
                        }
                    };
                    attempts.push(record);
                    next
                }

                EncodeState::SoftwareAttempt { video_kbps } => {
                    if cancel.is_cancelled() {
                        return Err(EncodeError::Cancelled { attempts });
                    }
                    let software = target.retarget(EncoderTier::Software, video_kbps);
                    let (record, temp) = self.attempt(source.path(), &software);
                    let next = match temp {
                        Some(temp) => EncodeState::Success {
                            tier: EncoderTier::Software,
                            temp,
                        },
                        None if cancel.is_cancelled() => {
                            debug!(outcome = %record.outcome, "software attempt ended after cancellation");
                            attempts.push(record);
                            return Err(EncodeError::Cancelled { attempts });
                        }
                        None => EncodeState::Failed(summarize(&attempts, &record)),
                    };
                    attempts.push(record);
                    next
                }

                EncodeState::Success { tier, temp } => {
                    let final_path = output.claim().map_err(EncodeError::Persist)?;
                    if let Err(e) = temp.persist(&final_path) {
                        // Release the placeholder so the name stays free
                        let _ = fs::remove_file(&final_path);
                        return Err(EncodeError::Persist(e));
                    }
                    info!(output = %final_path.display(), %tier, "encode complete");
                    return Ok(EncodeReport {
                        output: final_path,
                        tier,
                        attempts,
                    });
                }

                EncodeState::Failed(reason) => {
                    warn!(output = %preferred.display(), %reason, "encode failed on every tier");
                    return Err(EncodeError::Exhausted { reason, attempts });
                }
            };
        }
    }

    /// The command the first attempt would run, for dry runs. Creates nothing.
    pub fn planned_command(&self, input: &Path, output: &OutputTarget, video_kbps: u32) -> Command {
        let tier = if self.encoder.hardware_enabled {
            EncoderTier::Hardware
        } else {
            EncoderTier::Software
        };
        let target = EncodeTarget::new(output.preferred(), video_kbps, tier);
        build_encode_command(&self.ffmpeg, input, &temp_path(&target), &target, &self.encoder)
    }

    /// Run one attempt. Returns the verified temporary output on success.
    fn attempt(&self, input: &Path, target: &EncodeTarget) -> (AttemptRecord, Option<ScratchFile>) {
        let temp = ScratchFile::new(temp_path(target));

        info!(
            input = %input.display(),
            tier = %target.tier,
            codec = target.video_codec(&self.encoder),
            target_kbps = target.video_kbps,
            "encoding"
        );

        let mut cmd = build_encode_command(&self.ffmpeg, input, temp.path(), target, &self.encoder);
        let outcome = match run_tool(&mut cmd) {
            Err(e) => AttemptOutcome::LaunchFailed(e.to_string()),
            Ok(run) => {
                if !run.stderr_tail.is_empty() {
                    debug!(tier = %target.tier, stderr = %run.stderr_tail, "ffmpeg diagnostics");
                }
                match run.exit {
                    ToolExit::Success => match temp.size() {
                        Some(n) if n > self.encoder.min_output_bytes => AttemptOutcome::Succeeded,
                        size => AttemptOutcome::OutputRejected { size },
                    },
                    ToolExit::Failed(code) => AttemptOutcome::ExitFailed(code),
                    ToolExit::Terminated => AttemptOutcome::Crashed,
                }
            }
        };

        let record = AttemptRecord {
            tier: target.tier,
            video_kbps: target.video_kbps,
            outcome,
        };
        if record.outcome == AttemptOutcome::Succeeded {
            (record, Some(temp))
        } else {
            (record, None)
        }
    }
}

fn temp_path(target: &EncodeTarget) -> PathBuf {
    let out_dir = target.output.parent().unwrap_or_else(|| Path::new("."));
    out_dir.join(unique_name(&target.output, "partial", "mkv", true))
}

fn summarize(previous: &[AttemptRecord], last: &AttemptRecord) -> String {
    previous
        .iter()
        .chain(std::iter::once(last))
        .map(|a| format!("{}: {}", a.tier, a.outcome))
        .collect::<Vec<_>>()
        .join("; ")
}
