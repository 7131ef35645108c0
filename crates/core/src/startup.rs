//! Startup checks run before a batch touches any file.
//!
//! Verifies that ffprobe and ffmpeg can be executed and that ffmpeg reports a
//! version we can read.

use crate::config::Config;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::info;

/// Error types for startup checks
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("ffprobe not available: {0}")]
    FfprobeUnavailable(String),

    #[error("ffmpeg not available: {0}")]
    FfmpegUnavailable(String),

    #[error("could not determine ffmpeg version: {0}")]
    FfmpegVersion(String),
}

/// Parse the major version from `ffmpeg -version` output.
///
/// Handles release builds ("ffmpeg version 6.1.1 ...") and git builds tagged
/// with an `n` prefix ("ffmpeg version n7.0-12-g...").
pub fn parse_ffmpeg_version(version_output: &str) -> Option<u32> {
    let version_line = version_output
        .lines()
        .find(|line| line.to_lowercase().contains("ffmpeg version"))?;

    let lower = version_line.to_lowercase();
    let version_part = lower
        .split("ffmpeg version")
        .nth(1)?
        .split_whitespace()
        .next()?;

    let version_str = version_part.trim_start_matches('n');
    version_str
        .split(|c| c == '.' || c == '-')
        .next()?
        .parse()
        .ok()
}

fn run_version(tool: &Path, flag: &str) -> Result<String, String> {
    let output = Command::new(tool)
        .arg(flag)
        .output()
        .map_err(|e| format!("{} {} failed: {}", tool.display(), flag, e))?;
    if !output.status.success() {
        return Err(format!("{} {} exited with {}", tool.display(), flag, output.status));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Check that ffprobe runs.
pub fn check_ffprobe_available(ffprobe: &Path) -> Result<(), StartupError> {
    run_version(ffprobe, "-version").map_err(StartupError::FfprobeUnavailable)?;
    Ok(())
}

/// Check that ffmpeg runs and return its major version.
pub fn check_ffmpeg_version(ffmpeg: &Path) -> Result<u32, StartupError> {
    let output = run_version(ffmpeg, "-version").map_err(StartupError::FfmpegUnavailable)?;
    parse_ffmpeg_version(&output).ok_or_else(|| {
        StartupError::FfmpegVersion(
            output.lines().next().unwrap_or("(empty output)").to_string(),
        )
    })
}

/// Run all startup checks in order: ffprobe, then ffmpeg.
pub fn run_startup_checks(cfg: &Config) -> Result<(), StartupError> {
    check_ffprobe_available(&cfg.tools.ffprobe)?;
    let major = check_ffmpeg_version(&cfg.tools.ffmpeg)?;
    info!(ffmpeg_major = major, "external tools available");
    Ok(())
}
