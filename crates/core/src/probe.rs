//! Probe module for reading container and stream metadata.
//!
//! Runs ffprobe on a file and turns its JSON output into a validated
//! [`MediaDescriptor`]. Only the JSON on stdout is parsed; anything ffprobe
//! prints on stderr is kept for logs and never interpreted.

use crate::process::{run_tool, ToolExit};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

/// Error type for probe operations.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// ffprobe could not be launched.
    #[error("failed to launch ffprobe: {0}")]
    Launch(#[from] std::io::Error),

    /// ffprobe ran but signalled failure. Its stdout is ignored in that case.
    #[error("ffprobe failed with {exit}: {diagnostic}")]
    ToolFailed { exit: ToolExit, diagnostic: String },

    /// ffprobe output did not match the expected schema.
    #[error("failed to parse ffprobe output: {0}")]
    Parse(String),

    /// The file has no video stream to convert.
    #[error("no video stream found")]
    NoVideoStream,
}

/// Typed description of one input file, produced once and read-only afterwards.
///
/// Fields the tool did not report are `None`; a reported zero stays `Some(0)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MediaDescriptor {
    /// Container format name as reported (e.g. "avi", "asf", "mov,mp4,m4a,3gp,3g2,mj2").
    pub container: String,
    /// Codec of the first video stream (e.g. "mpeg1video", "wmv3", "mpeg4", "h264").
    pub video_codec: Option<String>,
    /// Four-character code of the first video stream (e.g. "XVID", "WMV3").
    pub video_codec_tag: Option<String>,
    /// Codec of the first audio stream.
    pub audio_codec: Option<String>,
    /// Duration in seconds.
    pub duration_secs: Option<f64>,
    /// Bitrate in bits per second, video stream first, container second.
    pub bitrate_bps: Option<u64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Number of video frames.
    pub frame_count: Option<u64>,
    /// Pixel format of the first video stream (e.g. "yuv420p").
    pub pixel_format: Option<String>,
}

impl MediaDescriptor {
    /// Pixel count when both dimensions are known and non-zero.
    pub fn pixel_count(&self) -> Option<u64> {
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some(w as u64 * h as u64),
            _ => None,
        }
    }

    /// Bitrate in kbps when reported and positive.
    pub fn known_bitrate_kbps(&self) -> Option<u32> {
        match self.bitrate_bps {
            Some(bps) if bps > 0 => Some((bps / 1000).clamp(1, u32::MAX as u64) as u32),
            _ => None,
        }
    }
}

/// Raw ffprobe JSON structures for parsing.
mod ffprobe_json {
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct FfprobeOutput {
        pub streams: Option<Vec<Stream>>,
        pub format: Option<Format>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Stream {
        pub codec_type: Option<String>,
        pub codec_name: Option<String>,
        pub codec_tag_string: Option<String>,
        pub width: Option<u32>,
        pub height: Option<u32>,
        pub bit_rate: Option<String>,
        pub nb_frames: Option<String>,
        pub pix_fmt: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    pub struct Format {
        pub format_name: Option<String>,
        pub duration: Option<String>,
        pub bit_rate: Option<String>,
    }
}

/// Build the ffprobe invocation for a file.
pub fn build_probe_command(ffprobe: &Path, path: &Path) -> Command {
    let mut cmd = Command::new(ffprobe);
    cmd.args([
        "-v",
        "error",
        "-print_format",
        "json",
        "-show_streams",
        "-show_format",
    ]);
    cmd.arg(path);
    cmd
}

/// Probes a file with ffprobe and returns its descriptor.
///
/// A non-zero exit is a failure even if stdout happens to contain valid JSON.
pub fn probe_file(ffprobe: &Path, path: &Path) -> Result<MediaDescriptor, ProbeError> {
    let run = run_tool(&mut build_probe_command(ffprobe, path))?;

    if !run.exit.is_success() {
        debug!(file = %path.display(), stderr = %run.stderr_tail, "ffprobe failed");
        return Err(ProbeError::ToolFailed {
            exit: run.exit,
            diagnostic: run.stderr_tail,
        });
    }

    let stdout = String::from_utf8_lossy(&run.stdout);
    parse_probe_output(&stdout)
}

/// Parses ffprobe JSON output into a MediaDescriptor.
pub fn parse_probe_output(json_str: &str) -> Result<MediaDescriptor, ProbeError> {
    let ffprobe: ffprobe_json::FfprobeOutput =
        serde_json::from_str(json_str).map_err(|e| ProbeError::Parse(e.to_string()))?;

    let format = ffprobe.format.ok_or_else(|| {
        ProbeError::Parse("missing format section in ffprobe output".to_string())
    })?;
    let container = format
        .format_name
        .filter(|name| !name.trim().is_empty())
        .ok_or_else(|| ProbeError::Parse("missing format_name in ffprobe output".to_string()))?;

    let streams = ffprobe.streams.unwrap_or_default();
    let video = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or(ProbeError::NoVideoStream)?;
    let audio = streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));

    let bitrate_bps = parse_number::<u64>(video.bit_rate.as_deref())
        .or_else(|| parse_number::<u64>(format.bit_rate.as_deref()));

    let duration_secs = parse_number::<f64>(format.duration.as_deref())
        .filter(|d| d.is_finite() && *d >= 0.0);

    Ok(MediaDescriptor {
        container,
        video_codec: video.codec_name.clone().filter(|c| !c.is_empty()),
        video_codec_tag: video.codec_tag_string.as_deref().and_then(normalize_tag),
        audio_codec: audio
            .and_then(|a| a.codec_name.clone())
            .filter(|c| !c.is_empty()),
        duration_secs,
        bitrate_bps,
        width: video.width,
        height: video.height,
        frame_count: parse_number::<u64>(video.nb_frames.as_deref()),
        pixel_format: video.pix_fmt.clone().filter(|p| !p.is_empty()),
    })
}

/// ffprobe reports numbers as strings, and "N/A" when unknown.
fn parse_number<T: std::str::FromStr>(raw: Option<&str>) -> Option<T> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty() && *s != "N/A")
        .and_then(|s| s.parse::<T>().ok())
}

/// Drop placeholder tags such as "[0][0][0][0]".
fn normalize_tag(tag: &str) -> Option<String> {
    let tag = tag.trim();
    if tag.is_empty() || tag.starts_with('[') {
        None
    } else {
        Some(tag.to_uppercase())
    }
}
