//! Encoding: ffmpeg command construction and the hardware/software fallback.

pub mod ffmpeg;
pub mod orchestrator;

pub use ffmpeg::{build_encode_command, EncodeTarget, EncoderTier};
pub use orchestrator::{
    AttemptOutcome, AttemptRecord, EncodeError, EncodeOrchestrator, EncodeReport, EncodeSource,
    EncodeState,
};
