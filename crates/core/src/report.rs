//! End-of-batch report.

use crate::archive::ArchiveOutcome;
use crate::config::PathsConfig;
use crate::encode::EncoderTier;
use crate::pipeline::PipelineResult;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use sysinfo::Disks;

/// Outcome of one input file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub result: PipelineResult,
}

/// Per-file outcomes in completion order. Append-only.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn push(&mut self, outcome: FileOutcome) {
        self.outcomes.push(outcome);
    }

    pub fn outcomes(&self) -> &[FileOutcome] {
        &self.outcomes
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|r| matches!(r, PipelineResult::Success { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|r| matches!(r, PipelineResult::Failure { .. }))
    }

    /// Files a dry run planned.
    pub fn planned(&self) -> usize {
        self.count(|r| matches!(r, PipelineResult::Planned { .. }))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|r| matches!(r, PipelineResult::Cancelled))
    }

    pub fn repaired(&self) -> usize {
        self.count(|r| matches!(r, PipelineResult::Success { repaired: true, .. }))
    }

    /// Successes whose original could not be archived.
    pub fn archive_warnings(&self) -> usize {
        self.count(|r| matches!(r, PipelineResult::Success { archive, .. } if archive.is_failure()))
    }

    /// Successes that needed the software tier.
    pub fn software_fallbacks(&self) -> usize {
        self.count(|r| match r {
            PipelineResult::Success { attempts, .. } => attempts
                .iter()
                .any(|a| a.tier == EncoderTier::Software),
            _ => false,
        })
    }

    /// True when every file converted.
    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0 && self.cancelled() == 0
    }

    fn count(&self, pred: impl Fn(&PipelineResult) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.result)).count()
    }

    /// Human-readable summary for the end of a run. `free_bytes` is the space
    /// left on the output volume, when it could be read.
    pub fn render_summary(&self, paths: &PathsConfig, free_bytes: Option<u64>) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Conversion summary");
        let _ = writeln!(out, "  files:       {}", self.total());
        if self.planned() > 0 {
            let _ = writeln!(out, "  planned:     {}", self.planned());
        }
        let _ = writeln!(out, "  succeeded:   {}", self.succeeded());
        let _ = writeln!(out, "  failed:      {}", self.failed());
        if self.cancelled() > 0 {
            let _ = writeln!(out, "  cancelled:   {}", self.cancelled());
        }
        let _ = writeln!(out, "  repaired:    {}", self.repaired());
        let _ = writeln!(out, "  software:    {}", self.software_fallbacks());
        let _ = writeln!(out, "  warnings:    {}", self.archive_warnings());

        let failures: Vec<&FileOutcome> = self
            .outcomes
            .iter()
            .filter(|o| matches!(o.result, PipelineResult::Failure { .. }))
            .collect();
        if !failures.is_empty() {
            let _ = writeln!(out, "\nFailed:");
            for outcome in failures {
                if let PipelineResult::Failure { stage, reason } = &outcome.result {
                    let _ = writeln!(out, "  {} [{}] {}", outcome.input.display(), stage, reason);
                }
            }
        }

        let warnings: Vec<(&FileOutcome, &str)> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.result {
                PipelineResult::Success {
                    archive: ArchiveOutcome::Failed(reason),
                    ..
                } => Some((o, reason.as_str())),
                _ => None,
            })
            .collect();
        if !warnings.is_empty() {
            let _ = writeln!(out, "\nConverted, original not archived:");
            for (outcome, reason) in warnings {
                let _ = writeln!(out, "  {} {}", outcome.input.display(), reason);
            }
        }

        let plans: Vec<(&FileOutcome, &Path, Option<&PathBuf>)> = self
            .outcomes
            .iter()
            .filter_map(|o| match &o.result {
                PipelineResult::Planned { output, archive, .. } => {
                    Some((o, output.as_path(), archive.as_ref()))
                }
                _ => None,
            })
            .collect();
        if !plans.is_empty() {
            let _ = writeln!(out, "\nDry run, nothing written:");
            for (outcome, output, archive) in plans {
                let _ = write!(out, "  {} -> {}", outcome.input.display(), output.display());
                match archive {
                    Some(dest) => {
                        let _ = writeln!(out, " (original to {})", dest.display());
                    }
                    None => {
                        let _ = writeln!(out, " (original kept)");
                    }
                }
            }
        }

        let _ = writeln!(out, "\nScratch: {}", paths.scratch_dir.display());
        let _ = writeln!(out, "Archive: {}", paths.archive_dir.display());
        let _ = writeln!(out, "Logs:    {}", paths.log_dir.display());
        match free_bytes {
            Some(bytes) => {
                let _ = write!(out, "Free disk space: {:.2} GB", bytes as f64 / 1e9);
            }
            None => {
                let _ = write!(out, "Free disk space: (unavailable)");
            }
        }
        out
    }
}

/// Available bytes on the volume holding `path`, from the disk whose mount
/// point is the longest prefix of it.
pub fn free_space(path: &Path) -> Option<u64> {
    let path = path.canonicalize().ok()?;
    let disks = Disks::new_with_refreshed_list();
    disks
        .list()
        .iter()
        .filter(|disk| path.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode::{AttemptOutcome, AttemptRecord};
    use crate::pipeline::PipelineStage;

    fn success(name: &str, repaired: bool, archive: ArchiveOutcome, software: bool) -> FileOutcome {
        let mut attempts = vec![AttemptRecord {
            tier: EncoderTier::Hardware,
            video_kbps: 1_500,
            outcome: if software {
                AttemptOutcome::ExitFailed(1)
            } else {
                AttemptOutcome::Succeeded
            },
        }];
        if software {
            attempts.push(AttemptRecord {
                tier: EncoderTier::Software,
                video_kbps: 1_125,
                outcome: AttemptOutcome::Succeeded,
            });
        }
        FileOutcome {
            input: PathBuf::from(name),
            result: PipelineResult::Success {
                output: PathBuf::from(name).with_extension("mkv"),
                archive,
                repaired,
                attempts,
            },
        }
    }

    fn sample() -> BatchReport {
        let mut report = BatchReport::default();
        report.push(success("/m/a.mpg", true, ArchiveOutcome::Archived(PathBuf::from("/o/a.mpg")), false));
        report.push(success("/m/b.mp4", false, ArchiveOutcome::Failed("permission denied".into()), true));
        report.push(FileOutcome {
            input: PathBuf::from("/m/c.avi"),
            result: PipelineResult::Failure {
                stage: PipelineStage::Probe,
                reason: "ffprobe failed with exit code 1".into(),
            },
        });
        report
    }

    #[test]
    fn test_counters() {
        let report = sample();
        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.cancelled(), 0);
        assert_eq!(report.repaired(), 1);
        assert_eq!(report.archive_warnings(), 1);
        assert_eq!(report.software_fallbacks(), 1);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_archive_failure_still_counts_as_success() {
        let mut report = BatchReport::default();
        report.push(success("/m/b.mp4", false, ArchiveOutcome::Failed("busy".into()), false));
        assert!(report.all_succeeded());
    }

    #[test]
    fn test_cancelled_is_not_success() {
        let mut report = BatchReport::default();
        report.push(FileOutcome {
            input: PathBuf::from("/m/x.wmv"),
            result: PipelineResult::Cancelled,
        });
        assert!(!report.all_succeeded());
        assert_eq!(report.cancelled(), 1);
    }

    #[test]
    fn test_summary_lists_stage_qualified_failures() {
        let summary = sample().render_summary(&PathsConfig::default(), Some(12_340_000_000));
        assert!(summary.contains("succeeded:   2"));
        assert!(summary.contains("/m/c.avi [probe] ffprobe failed with exit code 1"));
        assert!(summary.contains("/m/b.mp4 permission denied"));
        assert!(summary.contains("Archive: originals"));
        assert!(summary.ends_with("Free disk space: 12.34 GB"));
        assert!(!summary.contains("cancelled"));
        assert!(!summary.contains("planned"));
    }

    #[test]
    fn test_summary_without_free_space() {
        let summary = sample().render_summary(&PathsConfig::default(), None);
        assert!(summary.ends_with("Free disk space: (unavailable)"));
    }

    #[test]
    fn test_dry_run_summary_lists_plans() {
        let mut report = BatchReport::default();
        report.push(FileOutcome {
            input: PathBuf::from("/m/a.mpg"),
            result: PipelineResult::Planned {
                output: PathBuf::from("/out/a.mkv"),
                repair: None,
                video_kbps: 1_200,
                archive: Some(PathBuf::from("/o/a.mpg")),
            },
        });
        report.push(FileOutcome {
            input: PathBuf::from("/m/b.wmv"),
            result: PipelineResult::Planned {
                output: PathBuf::from("/out/b.mkv"),
                repair: None,
                video_kbps: 900,
                archive: None,
            },
        });

        assert_eq!(report.planned(), 2);
        assert!(report.all_succeeded());
        let summary = report.render_summary(&PathsConfig::default(), None);
        assert!(summary.contains("planned:     2"));
        assert!(summary.contains("/m/a.mpg -> /out/a.mkv (original to /o/a.mpg)"));
        assert!(summary.contains("/m/b.wmv -> /out/b.mkv (original kept)"));
    }

    #[test]
    fn test_free_space_of_missing_path() {
        assert_eq!(free_space(Path::new("/definitely/not/here/vidfix")), None);
    }
}
