//! Bounded parallel scheduler for batch conversion.
//!
//! A fixed number of worker tasks pull input paths from a shared queue and run
//! the per-file pipeline on the blocking thread pool. Results flow back over a
//! channel in completion order. Progress is published through a `watch`
//! channel and every update goes through `send_modify`.

use crate::config::ConcurrencyConfig;
use crate::pipeline::{PipelineResult, PipelineStage};
use crate::report::{BatchReport, FileOutcome};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Upper bound for the derived worker count.
const DEFAULT_MAX_WORKERS: usize = 4;

/// Something that converts one file. Blocking; called from the blocking pool.
pub trait FileProcessor: Send + Sync + 'static {
    /// Process `input`, calling `on_stage` as each stage starts.
    fn process(
        &self,
        input: &Path,
        cancel: &CancellationToken,
        on_stage: &dyn Fn(PipelineStage),
    ) -> PipelineResult;
}

/// Number of concurrent pipelines.
///
/// Uses `max_workers` when set, otherwise the logical core count capped at 4.
pub fn worker_count(cfg: &ConcurrencyConfig) -> usize {
    derive_workers(cfg.max_workers, num_cpus::get())
}

fn derive_workers(configured: u32, cores: usize) -> usize {
    if configured > 0 {
        configured as usize
    } else {
        cores.clamp(1, DEFAULT_MAX_WORKERS)
    }
}

/// What one worker slot is doing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotStatus {
    pub file: Option<PathBuf>,
    pub stage: Option<PipelineStage>,
}

impl SlotStatus {
    pub fn is_idle(&self) -> bool {
        self.file.is_none()
    }
}

/// Batch progress as seen by observers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub slots: Vec<SlotStatus>,
}

impl ProgressSnapshot {
    fn new(total: usize, slots: usize) -> Self {
        Self {
            total,
            slots: vec![SlotStatus::default(); slots],
            ..Self::default()
        }
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_idle()).count()
    }

    pub fn is_done(&self) -> bool {
        self.completed == self.total
    }

    fn record(&mut self, result: &PipelineResult) {
        self.completed += 1;
        match result {
            PipelineResult::Success { .. } | PipelineResult::Planned { .. } => self.succeeded += 1,
            PipelineResult::Failure { .. } => self.failed += 1,
            PipelineResult::Cancelled => self.cancelled += 1,
        }
    }
}

/// Runs a [`FileProcessor`] over a list of inputs with at most `workers` at once.
pub struct Scheduler<P: FileProcessor> {
    processor: Arc<P>,
    workers: usize,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
    cancel: CancellationToken,
}

impl<P: FileProcessor> Scheduler<P> {
    pub fn new(processor: P, workers: usize) -> Self {
        let (progress, _) = watch::channel(ProgressSnapshot::default());
        Self {
            processor: Arc::new(processor),
            workers: workers.max(1),
            progress: Arc::new(progress),
            cancel: CancellationToken::new(),
        }
    }

    /// Use an externally owned cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Progress receiver. Valid across runs.
    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.progress.subscribe()
    }

    /// Run every input and return one outcome per input, in completion order.
    pub async fn run(&self, inputs: Vec<PathBuf>) -> BatchReport {
        let total = inputs.len();
        self.progress
            .send_replace(ProgressSnapshot::new(total, self.workers));
        info!(files = total, workers = self.workers, "starting batch");

        // Everything is queued up front; workers drain until the queue is empty
        let (job_tx, job_rx) = mpsc::channel::<PathBuf>(total.max(1));
        for input in inputs {
            if job_tx.send(input).await.is_err() {
                break;
            }
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<FileOutcome>();
        let mut handles = Vec::with_capacity(self.workers);
        for slot in 0..self.workers {
            handles.push(tokio::spawn(worker(
                slot,
                self.processor.clone(),
                job_rx.clone(),
                result_tx.clone(),
                self.progress.clone(),
                self.cancel.clone(),
            )));
        }
        drop(result_tx);

        let mut report = BatchReport::default();
        while let Some(outcome) = result_rx.recv().await {
            report.push(outcome);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "worker task failed");
            }
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            cancelled = report.cancelled(),
            "batch finished"
        );
        report
    }
}

async fn worker<P: FileProcessor>(
    slot: usize,
    processor: Arc<P>,
    jobs: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    results: mpsc::UnboundedSender<FileOutcome>,
    progress: Arc<watch::Sender<ProgressSnapshot>>,
    cancel: CancellationToken,
) {
    loop {
        let next = {
            let mut rx = jobs.lock().await;
            rx.recv().await
        };
        let Some(input) = next else {
            break;
        };

        let result = if cancel.is_cancelled() {
            debug!(file = %input.display(), "skipping, batch cancelled");
            PipelineResult::Cancelled
        } else {
            run_one(slot, &processor, &input, &progress, &cancel).await
        };

        progress.send_modify(|p| {
            p.slots[slot] = SlotStatus::default();
            p.record(&result);
        });

        if results.send(FileOutcome { input, result }).is_err() {
            break;
        }
    }
}

async fn run_one<P: FileProcessor>(
    slot: usize,
    processor: &Arc<P>,
    input: &Path,
    progress: &Arc<watch::Sender<ProgressSnapshot>>,
    cancel: &CancellationToken,
) -> PipelineResult {
    progress.send_modify(|p| {
        p.slots[slot] = SlotStatus {
            file: Some(input.to_path_buf()),
            stage: None,
        };
    });

    let processor = processor.clone();
    let tx = progress.clone();
    let token = cancel.clone();
    let path = input.to_path_buf();
    let joined = tokio::task::spawn_blocking(move || {
        processor.process(&path, &token, &|stage| {
            tx.send_modify(|p| p.slots[slot].stage = Some(stage));
        })
    })
    .await;

    match joined {
        Ok(result) => result,
        Err(e) => {
            // Attribute the panic to whatever stage the slot last reported
            let stage = progress.borrow().slots[slot]
                .stage
                .unwrap_or(PipelineStage::Probe);
            error!(file = %input.display(), %stage, error = %e, "pipeline panicked");
            PipelineResult::Failure {
                stage,
                reason: format!("pipeline task failed: {}", e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveOutcome;
    use proptest::prelude::*;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// In-process stand-in for the conversion pipeline.
    #[derive(Default)]
    struct FakeProcessor {
        active: AtomicUsize,
        max_active: AtomicUsize,
        started: std::sync::Mutex<Vec<PathBuf>>,
        delay_ms: u64,
        /// Inputs whose name contains this fail at the encode stage.
        fail_marker: Option<&'static str>,
        /// Cancel the batch while processing an input containing this.
        cancel_marker: Option<&'static str>,
        panic_marker: Option<&'static str>,
    }

    impl FakeProcessor {
        fn with_delay(delay_ms: u64) -> Self {
            Self {
                delay_ms,
                ..Self::default()
            }
        }
    }

    impl FileProcessor for FakeProcessor {
        fn process(
            &self,
            input: &Path,
            cancel: &CancellationToken,
            on_stage: &dyn Fn(PipelineStage),
        ) -> PipelineResult {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            self.started.lock().unwrap().push(input.to_path_buf());

            let name = input.to_string_lossy().into_owned();
            on_stage(PipelineStage::Probe);
            std::thread::sleep(Duration::from_millis(self.delay_ms));
            on_stage(PipelineStage::Encode);

            if self.cancel_marker.map_or(false, |m| name.contains(m)) {
                cancel.cancel();
            }

            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.panic_marker.map_or(false, |m| name.contains(m)) {
                panic!("simulated crash");
            }
            if self.fail_marker.map_or(false, |m| name.contains(m)) {
                return PipelineResult::Failure {
                    stage: PipelineStage::Encode,
                    reason: "both tiers failed".to_string(),
                };
            }
            PipelineResult::Success {
                output: input.with_extension("mkv"),
                archive: ArchiveOutcome::NotArchived,
                repaired: false,
                attempts: Vec::new(),
            }
        }
    }

    fn inputs(k: usize) -> Vec<PathBuf> {
        (0..k).map(|i| PathBuf::from(format!("/media/file_{:03}.avi", i))).collect()
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_worker_derivation(configured in 0u32..64, cores in 1usize..256) {
            let workers = derive_workers(configured, cores);
            if configured > 0 {
                prop_assert_eq!(workers, configured as usize);
            } else {
                prop_assert!(workers >= 1 && workers <= DEFAULT_MAX_WORKERS);
                prop_assert_eq!(workers, cores.min(DEFAULT_MAX_WORKERS));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(20))]

        #[test]
        fn prop_one_result_per_input_and_bounded_activity(k in 1usize..24, n in 1usize..6) {
            let rt = runtime();
            let scheduler = Scheduler::new(FakeProcessor::with_delay(2), n);
            let report = rt.block_on(scheduler.run(inputs(k)));

            prop_assert_eq!(report.outcomes().len(), k);
            let seen: HashSet<&PathBuf> = report.outcomes().iter().map(|o| &o.input).collect();
            prop_assert_eq!(seen.len(), k);
            prop_assert!(scheduler.processor.max_active.load(Ordering::SeqCst) <= n);
        }
    }

    #[test]
    fn test_worker_count_zero_derives_from_cores() {
        assert_eq!(derive_workers(0, 16), 4);
        assert_eq!(derive_workers(0, 2), 2);
        assert_eq!(derive_workers(0, 0), 1);
        assert_eq!(derive_workers(6, 2), 6);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_parallelism_reaches_bound() {
        let scheduler = Scheduler::new(FakeProcessor::with_delay(50), 3);
        let report = scheduler.run(inputs(9)).await;

        assert_eq!(report.succeeded(), 9);
        let max = scheduler.processor.max_active.load(Ordering::SeqCst);
        assert!(max <= 3);
        assert!(max >= 2, "workers should overlap, max active was {}", max);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let processor = FakeProcessor {
            fail_marker: Some("file_002"),
            ..FakeProcessor::default()
        };
        let scheduler = Scheduler::new(processor, 2);
        let report = scheduler.run(inputs(6)).await;

        assert_eq!(report.outcomes().len(), 6);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.succeeded(), 5);
        let failed = report
            .outcomes()
            .iter()
            .find(|o| !o.result.is_success())
            .unwrap();
        assert_eq!(failed.input, PathBuf::from("/media/file_002.avi"));
    }

    #[tokio::test]
    async fn test_single_worker_preserves_order() {
        let scheduler = Scheduler::new(FakeProcessor::default(), 1);
        let files = inputs(7);
        let report = scheduler.run(files.clone()).await;

        let completed: Vec<PathBuf> = report.outcomes().iter().map(|o| o.input.clone()).collect();
        assert_eq!(completed, files);
        assert_eq!(*scheduler.processor.started.lock().unwrap(), files);
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_work() {
        let processor = FakeProcessor {
            cancel_marker: Some("file_001"),
            ..FakeProcessor::default()
        };
        let scheduler = Scheduler::new(processor, 1);
        let report = scheduler.run(inputs(5)).await;

        assert_eq!(report.outcomes().len(), 5);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.cancelled(), 3);
        // queued files never reached the processor
        assert_eq!(scheduler.processor.started.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_external_token_cancels_everything_queued() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let scheduler = Scheduler::new(FakeProcessor::default(), 2).with_cancellation(cancel);
        let report = scheduler.run(inputs(4)).await;

        assert_eq!(report.cancelled(), 4);
        assert!(scheduler.processor.started.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let processor = FakeProcessor {
            panic_marker: Some("file_000"),
            ..FakeProcessor::default()
        };
        let scheduler = Scheduler::new(processor, 2);
        let report = scheduler.run(inputs(3)).await;

        assert_eq!(report.outcomes().len(), 3);
        assert_eq!(report.failed(), 1);
        let failed = report
            .outcomes()
            .iter()
            .find(|o| o.input == PathBuf::from("/media/file_000.avi"))
            .unwrap();
        assert!(matches!(
            failed.result,
            PipelineResult::Failure { stage: PipelineStage::Encode, .. }
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_progress_is_incremental() {
        let processor = FakeProcessor {
            delay_ms: 10,
            fail_marker: Some("file_003"),
            ..FakeProcessor::default()
        };
        let scheduler = Scheduler::new(processor, 2);
        let mut rx = scheduler.subscribe();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            let mut max_active = 0;
            while rx.changed().await.is_ok() {
                let snapshot = rx.borrow_and_update().clone();
                max_active = max_active.max(snapshot.active());
                seen.push(snapshot.completed);
                if snapshot.total > 0 && snapshot.is_done() {
                    break;
                }
            }
            (seen, max_active)
        });

        let report = scheduler.run(inputs(6)).await;
        let (seen, max_active) = watcher.await.unwrap();

        assert_eq!(report.outcomes().len(), 6);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]), "completed must never go backwards");
        assert_eq!(seen.last().copied(), Some(6));
        assert!(max_active <= 2);

        let last = scheduler.subscribe().borrow().clone();
        assert_eq!(last.total, 6);
        assert_eq!(last.succeeded, 5);
        assert_eq!(last.failed, 1);
        assert_eq!(last.active(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let scheduler = Scheduler::new(FakeProcessor::default(), 3);
        let report = scheduler.run(Vec::new()).await;
        assert!(report.outcomes().is_empty());
        assert!(scheduler.subscribe().borrow().is_done());
    }
}
