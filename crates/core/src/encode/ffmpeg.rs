//! ffmpeg encoder command construction.
//!
//! Output is always H.264 video with the configured audio codec in Matroska.
//! The two tiers differ only in the video encoder and its options.

use crate::config::EncoderConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Encoder tier of an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncoderTier {
    Hardware,
    Software,
}

impl std::fmt::Display for EncoderTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EncoderTier::Hardware => write!(f, "hardware"),
            EncoderTier::Software => write!(f, "software"),
        }
    }
}

/// Parameters of a single encode attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeTarget {
    /// Final container path. Attempts write elsewhere and are renamed here.
    pub output: PathBuf,
    pub video_kbps: u32,
    pub tier: EncoderTier,
}

impl EncodeTarget {
    pub fn new(output: PathBuf, video_kbps: u32, tier: EncoderTier) -> Self {
        Self {
            output,
            video_kbps,
            tier,
        }
    }

    /// Same target on another tier and bitrate.
    pub fn retarget(&self, tier: EncoderTier, video_kbps: u32) -> Self {
        Self {
            output: self.output.clone(),
            video_kbps,
            tier,
        }
    }

    pub fn video_codec<'a>(&self, cfg: &'a EncoderConfig) -> &'a str {
        match self.tier {
            EncoderTier::Hardware => &cfg.hardware_codec,
            EncoderTier::Software => &cfg.software_codec,
        }
    }
}

/// Build an ffmpeg encode command writing to `temp_output`.
///
/// The output path is always the last argument.
pub fn build_encode_command(
    ffmpeg: &Path,
    input: &Path,
    temp_output: &Path,
    target: &EncodeTarget,
    cfg: &EncoderConfig,
) -> Command {
    let mut cmd = Command::new(ffmpeg);
    cmd.args(["-hide_banner", "-nostdin", "-y"]);
    cmd.arg("-i").arg(input);

    // First video stream plus any audio, nothing else
    cmd.args(["-map", "0:v:0", "-map", "0:a?"]);

    cmd.arg("-c:v").arg(target.video_codec(cfg));
    if target.tier == EncoderTier::Software {
        cmd.arg("-preset").arg(&cfg.software_preset);
    }
    cmd.arg("-b:v").arg(format!("{}k", target.video_kbps));
    cmd.args(["-pix_fmt", "yuv420p"]);

    cmd.arg("-c:a").arg(&cfg.audio_codec);
    cmd.arg("-b:a").arg(format!("{}k", cfg.audio_bitrate_kbps));

    cmd.args(["-f", "matroska"]);
    cmd.arg(temp_output);
    cmd
}
