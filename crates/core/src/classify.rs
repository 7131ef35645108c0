//! Classifier module for identifying the legacy format of a source file.
//!
//! The decision table is ordered: signatures most likely to need repair are
//! checked first, the already-compliant H.264 case next, and anything else is
//! [`SourceFormat::Unknown`]. A video-codec match always wins over a
//! container-only hint.

use crate::probe::MediaDescriptor;
use serde::{Deserialize, Serialize};

/// Closed set of source formats the pipeline distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceFormat {
    /// MPEG-1 video, usually in an MPEG systems stream.
    Mpeg1,
    /// MPEG-2 video.
    Mpeg2,
    /// Windows Media Video 9 (WMV3) in ASF.
    Wmv3,
    /// MPEG-4 Part 2 (XviD/DivX), possibly with packed B-frames.
    Xvid,
    /// H.264 stored in an AVI container.
    H264Avi,
    /// H.264 in a modern container, no repair needed.
    H264,
    /// Anything else. Still encodable, just never repaired.
    Unknown,
}

impl Default for SourceFormat {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceFormat::Mpeg1 => write!(f, "mpeg1"),
            SourceFormat::Mpeg2 => write!(f, "mpeg2"),
            SourceFormat::Wmv3 => write!(f, "wmv3"),
            SourceFormat::Xvid => write!(f, "xvid"),
            SourceFormat::H264Avi => write!(f, "h264_avi"),
            SourceFormat::H264 => write!(f, "h264"),
            SourceFormat::Unknown => write!(f, "unknown"),
        }
    }
}

/// Four-character codes of MPEG-4 Part 2 encoders that produce packed B-frames.
const PACKED_B_TAGS: &[&str] = &["XVID", "DIVX", "DX50", "DX40", "FMP4", "MP4V"];

/// Classifies a probed file. Pure and total: every descriptor maps to exactly one format.
pub fn classify(descriptor: &MediaDescriptor) -> SourceFormat {
    let codec = descriptor
        .video_codec
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();
    let tag = descriptor.video_codec_tag.as_deref().unwrap_or("");
    let containers: Vec<String> = descriptor
        .container
        .split(',')
        .map(|c| c.trim().to_lowercase())
        .collect();
    let in_container = |name: &str| containers.iter().any(|c| c == name);

    // Video-codec signatures, most repair-prone first
    if codec == "mpeg1video" {
        return SourceFormat::Mpeg1;
    }
    if codec == "wmv3" || tag.eq_ignore_ascii_case("WMV3") {
        return SourceFormat::Wmv3;
    }
    if codec == "mpeg4" || PACKED_B_TAGS.iter().any(|t| tag.eq_ignore_ascii_case(t)) {
        return SourceFormat::Xvid;
    }
    if codec == "mpeg2video" {
        return SourceFormat::Mpeg2;
    }
    if codec == "h264" {
        if in_container("avi") {
            return SourceFormat::H264Avi;
        }
        return SourceFormat::H264;
    }

    // Container-only hints apply only when the codec told us nothing
    if codec.is_empty() {
        if in_container("asf") {
            return SourceFormat::Wmv3;
        }
        if in_container("mpeg") || in_container("mpegvideo") {
            return SourceFormat::Mpeg1;
        }
    }

    SourceFormat::Unknown
}
