//! Terminal progress bar driven by the scheduler's progress channel.

use crate::logging::ConsoleWriter;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use vidfix::ProgressSnapshot;

const TEMPLATE: &str = "{spinner:.green} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";

/// Renders [`ProgressSnapshot`]s until the batch is done.
pub struct ProgressReporter {
    bar: ProgressBar,
    task: JoinHandle<()>,
    console: ConsoleWriter,
}

impl ProgressReporter {
    /// Start rendering. Console logging is drawn above the bar until
    /// [`ProgressReporter::finish`].
    pub fn spawn(mut rx: watch::Receiver<ProgressSnapshot>, console: ConsoleWriter) -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(TEMPLATE)
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=>-"),
        );

        console.attach(bar.clone());

        let task_bar = bar.clone();
        let task = tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                render(&task_bar, &snapshot);
            }
        });

        Self { bar, task, console }
    }

    /// Stop listening and leave the bar at the final state.
    pub fn finish(self, last: &ProgressSnapshot) {
        self.task.abort();
        render(&self.bar, last);
        self.bar.finish();
        self.console.detach();
    }
}

fn render(bar: &ProgressBar, snapshot: &ProgressSnapshot) {
    bar.set_length(snapshot.total as u64);
    bar.set_position(snapshot.completed as u64);
    bar.set_message(describe(snapshot));
}

/// One-line status: counters, then what each busy slot is doing.
pub fn describe(snapshot: &ProgressSnapshot) -> String {
    let mut parts = vec![format!("ok {} failed {}", snapshot.succeeded, snapshot.failed)];
    if snapshot.cancelled > 0 {
        parts.push(format!("cancelled {}", snapshot.cancelled));
    }

    let active: Vec<String> = snapshot
        .slots
        .iter()
        .filter_map(|slot| {
            let name = slot.file.as_ref()?.file_name()?.to_string_lossy().into_owned();
            Some(match slot.stage {
                Some(stage) => format!("{} ({})", name, stage),
                None => name,
            })
        })
        .collect();
    if !active.is_empty() {
        parts.push(active.join(", "));
    }
    parts.join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vidfix::{PipelineStage, SlotStatus};

    #[test]
    fn test_describe_lists_active_slots() {
        let snapshot = ProgressSnapshot {
            total: 5,
            completed: 2,
            succeeded: 1,
            failed: 1,
            cancelled: 0,
            slots: vec![
                SlotStatus {
                    file: Some(PathBuf::from("/media/a.mpg")),
                    stage: Some(PipelineStage::Repair),
                },
                SlotStatus::default(),
                SlotStatus {
                    file: Some(PathBuf::from("/media/b.wmv")),
                    stage: None,
                },
            ],
        };
        assert_eq!(describe(&snapshot), "ok 1 failed 1 | a.mpg (repair), b.wmv");
    }

    #[test]
    fn test_describe_idle() {
        let snapshot = ProgressSnapshot {
            total: 3,
            completed: 3,
            succeeded: 2,
            failed: 0,
            cancelled: 1,
            slots: vec![SlotStatus::default()],
        };
        assert_eq!(describe(&snapshot), "ok 2 failed 0 | cancelled 1");
    }
}
