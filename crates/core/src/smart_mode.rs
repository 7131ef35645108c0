//! Smart Mode bitrate scaling.
//!
//! Picks the output video bitrate from the source resolution tier, never
//! exceeding what the source itself carried, clamped to the configured limits.

use crate::config::SmartModeConfig;
use crate::probe::MediaDescriptor;
use serde::{Deserialize, Serialize};

/// Resolution tier of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionTier {
    Sd,
    Hd,
    Uhd,
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolutionTier::Sd => write!(f, "sd"),
            ResolutionTier::Hd => write!(f, "hd"),
            ResolutionTier::Uhd => write!(f, "uhd"),
        }
    }
}

/// Target video bitrate chosen for an encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetBitrate {
    pub kbps: u32,
    pub tier: ResolutionTier,
}

/// Tier by pixel count. Unknown dimensions fall into SD.
pub fn resolution_tier(descriptor: &MediaDescriptor, cfg: &SmartModeConfig) -> ResolutionTier {
    match descriptor.pixel_count() {
        Some(px) if px >= cfg.uhd_min_pixels => ResolutionTier::Uhd,
        Some(px) if px >= cfg.hd_min_pixels => ResolutionTier::Hd,
        _ => ResolutionTier::Sd,
    }
}

fn tier_base_kbps(tier: ResolutionTier, cfg: &SmartModeConfig) -> u32 {
    match tier {
        ResolutionTier::Sd => cfg.sd_base_kbps,
        ResolutionTier::Hd => cfg.hd_base_kbps,
        ResolutionTier::Uhd => cfg.uhd_base_kbps,
    }
}

/// Computes the target bitrate for a source. Deterministic, no I/O.
///
/// When the source reports a positive bitrate lower than the tier base, the
/// source bitrate is used instead. The floor wins over the source bitrate when
/// the source is below it, so the result may exceed a very low source bitrate
/// only by being lifted to the floor.
pub fn scale(descriptor: &MediaDescriptor, cfg: &SmartModeConfig) -> TargetBitrate {
    let tier = resolution_tier(descriptor, cfg);
    let base = tier_base_kbps(tier, cfg);

    let preferred = match descriptor.known_bitrate_kbps() {
        Some(source) if source < base => source,
        _ => base,
    };

    TargetBitrate {
        kbps: clamp_kbps(preferred, cfg),
        tier,
    }
}

/// Conservative bitrate for a software retry after a parameter-type failure.
pub fn fallback_kbps(target: u32, cfg: &SmartModeConfig) -> u32 {
    let reduced = (target as f64 * cfg.software_fallback_ratio as f64).floor() as u32;
    clamp_kbps(reduced, cfg)
}

fn clamp_kbps(kbps: u32, cfg: &SmartModeConfig) -> u32 {
    // `max` then `min` so a misconfigured floor > ceiling still honours the ceiling
    kbps.max(cfg.floor_kbps).min(cfg.ceiling_kbps)
}
