//! vidfix
//!
//! Batch repair and re-encode of legacy video. Each file is probed, classified,
//! repaired when its format needs it, and encoded to H.264/AAC Matroska with a
//! hardware-then-software fallback. A bounded scheduler runs many files at once.

pub mod archive;
pub mod classify;
pub mod encode;
pub mod output;
pub mod pipeline;
pub mod probe;
pub mod process;
pub mod repair;
pub mod report;
pub mod scan;
pub mod scheduler;
pub mod scratch;
pub mod smart_mode;
pub mod startup;

#[cfg(all(test, unix))]
mod test_support;

pub use vidfix_config as config;
pub use vidfix_config::Config;

pub use archive::{archive, archive_destination, move_to_archive, ArchiveError, ArchiveOutcome};
pub use classify::{classify, SourceFormat};
pub use encode::{
    build_encode_command, AttemptOutcome, AttemptRecord, EncodeError, EncodeOrchestrator,
    EncodeReport, EncodeSource, EncodeTarget, EncoderTier,
};
pub use output::OutputTarget;
pub use pipeline::{ConvertPipeline, PipelineResult, PipelineStage};
pub use probe::{probe_file, MediaDescriptor, ProbeError};
pub use process::command_line;
pub use repair::{select_procedure, RepairError, RepairOutcome, RepairProcedure, Repairer};
pub use report::{free_space, BatchReport, FileOutcome};
pub use scan::{scan_inputs, validate_input, Exclusions, ScanError};
pub use scheduler::{worker_count, FileProcessor, ProgressSnapshot, Scheduler, SlotStatus};
pub use smart_mode::{scale, ResolutionTier, TargetBitrate};
pub use startup::{parse_ffmpeg_version, run_startup_checks, StartupError};
