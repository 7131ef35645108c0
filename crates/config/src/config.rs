//! Core configuration structures and loading logic

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Error type for configuration operations
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file
    Io(std::io::Error),
    /// TOML parsing error
    Parse(toml::de::Error),
    /// Values parsed but are inconsistent
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "Failed to read config file: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse config: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Parse(e)
    }
}

/// Worker pool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent pipelines (0 = auto-derive from core count)
    #[serde(default)]
    pub max_workers: u32,
}

/// Smart Mode bitrate scaling limits and resolution tiers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SmartModeConfig {
    /// Lowest target bitrate ever produced
    #[serde(default = "default_floor_kbps")]
    pub floor_kbps: u32,
    /// Highest target bitrate ever produced
    #[serde(default = "default_ceiling_kbps")]
    pub ceiling_kbps: u32,
    /// Pixel count (width * height) at which a source counts as HD
    #[serde(default = "default_hd_min_pixels")]
    pub hd_min_pixels: u64,
    /// Pixel count at which a source counts as UHD
    #[serde(default = "default_uhd_min_pixels")]
    pub uhd_min_pixels: u64,
    #[serde(default = "default_sd_base_kbps")]
    pub sd_base_kbps: u32,
    #[serde(default = "default_hd_base_kbps")]
    pub hd_base_kbps: u32,
    #[serde(default = "default_uhd_base_kbps")]
    pub uhd_base_kbps: u32,
    /// Multiplier applied to the target for the conservative software retry (0, 1]
    #[serde(default = "default_software_fallback_ratio")]
    pub software_fallback_ratio: f32,
}

fn default_floor_kbps() -> u32 {
    500
}

fn default_ceiling_kbps() -> u32 {
    20_000
}

fn default_hd_min_pixels() -> u64 {
    1280 * 720
}

fn default_uhd_min_pixels() -> u64 {
    3840 * 2160
}

fn default_sd_base_kbps() -> u32 {
    1_500
}

fn default_hd_base_kbps() -> u32 {
    5_000
}

fn default_uhd_base_kbps() -> u32 {
    16_000
}

fn default_software_fallback_ratio() -> f32 {
    0.75
}

impl Default for SmartModeConfig {
    fn default() -> Self {
        Self {
            floor_kbps: default_floor_kbps(),
            ceiling_kbps: default_ceiling_kbps(),
            hd_min_pixels: default_hd_min_pixels(),
            uhd_min_pixels: default_uhd_min_pixels(),
            sd_base_kbps: default_sd_base_kbps(),
            hd_base_kbps: default_hd_base_kbps(),
            uhd_base_kbps: default_uhd_base_kbps(),
            software_fallback_ratio: default_software_fallback_ratio(),
        }
    }
}

/// Encoder selection and output verification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncoderConfig {
    /// Try the hardware tier before software (default true)
    #[serde(default = "default_true")]
    pub hardware_enabled: bool,
    #[serde(default = "default_hardware_codec")]
    pub hardware_codec: String,
    #[serde(default = "default_software_codec")]
    pub software_codec: String,
    #[serde(default = "default_software_preset")]
    pub software_preset: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,
    /// An output must be strictly larger than this to be accepted
    #[serde(default = "default_min_output_bytes")]
    pub min_output_bytes: u64,
}

fn default_true() -> bool {
    true
}

fn default_hardware_codec() -> String {
    "h264_videotoolbox".to_string()
}

fn default_software_codec() -> String {
    "libx264".to_string()
}

fn default_software_preset() -> String {
    "veryfast".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_audio_bitrate_kbps() -> u32 {
    192
}

fn default_min_output_bytes() -> u64 {
    1024
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            hardware_enabled: true,
            hardware_codec: default_hardware_codec(),
            software_codec: default_software_codec(),
            software_preset: default_software_preset(),
            audio_codec: default_audio_codec(),
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            min_output_bytes: default_min_output_bytes(),
        }
    }
}

/// Filesystem areas the pipeline writes into
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Repaired intermediates
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    /// Originals are moved here after a successful conversion
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Final outputs (None = next to each input)
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Human-readable log files
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("tmp_fix")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("originals")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            archive_dir: default_archive_dir(),
            output_dir: None,
            log_dir: default_log_dir(),
        }
    }
}

/// What happens to originals after a successful conversion
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ArchiveConfig {
    /// Leave the original where it is instead of moving it to the archive
    #[serde(default)]
    pub keep_original: bool,
}

/// External tool locations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolsConfig {
    #[serde(default = "default_ffprobe")]
    pub ffprobe: PathBuf,
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: PathBuf,
}

fn default_ffprobe() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_ffmpeg() -> PathBuf {
    PathBuf::from("ffmpeg")
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffprobe: default_ffprobe(),
            ffmpeg: default_ffmpeg(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
    #[serde(default)]
    pub smart_mode: SmartModeConfig,
    #[serde(default)]
    pub encoder: EncoderConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Parses the config file and handles missing optional fields with defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Parse configuration from a TOML string
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Apply environment variable overrides to the configuration
    ///
    /// Overrides the following values if environment variables are set:
    /// - VIDFIX_MAX_WORKERS -> concurrency.max_workers
    /// - VIDFIX_KEEP_ORIGINAL -> archive.keep_original
    /// - VIDFIX_HARDWARE_ENABLED -> encoder.hardware_enabled
    /// - VIDFIX_FFMPEG -> tools.ffmpeg
    /// - VIDFIX_FFPROBE -> tools.ffprobe
    /// - VIDFIX_OUTPUT_DIR -> paths.output_dir
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = env::var("VIDFIX_MAX_WORKERS") {
            if let Ok(workers) = val.parse::<u32>() {
                self.concurrency.max_workers = workers;
            }
        }

        if let Ok(val) = env::var("VIDFIX_KEEP_ORIGINAL") {
            if let Some(keep) = parse_bool(&val) {
                self.archive.keep_original = keep;
            }
        }

        if let Ok(val) = env::var("VIDFIX_HARDWARE_ENABLED") {
            if let Some(enabled) = parse_bool(&val) {
                self.encoder.hardware_enabled = enabled;
            }
        }

        if let Ok(val) = env::var("VIDFIX_FFMPEG") {
            if !val.is_empty() {
                self.tools.ffmpeg = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("VIDFIX_FFPROBE") {
            if !val.is_empty() {
                self.tools.ffprobe = PathBuf::from(val);
            }
        }

        if let Ok(val) = env::var("VIDFIX_OUTPUT_DIR") {
            if !val.is_empty() {
                self.paths.output_dir = Some(PathBuf::from(val));
            }
        }
    }

    /// Check that the values are usable together
    pub fn validate(&self) -> Result<(), ConfigError> {
        let sm = &self.smart_mode;
        if sm.floor_kbps == 0 {
            return Err(ConfigError::Invalid(
                "smart_mode.floor_kbps must be greater than 0".to_string(),
            ));
        }
        if sm.floor_kbps > sm.ceiling_kbps {
            return Err(ConfigError::Invalid(format!(
                "smart_mode.floor_kbps ({}) exceeds ceiling_kbps ({})",
                sm.floor_kbps, sm.ceiling_kbps
            )));
        }
        if sm.hd_min_pixels >= sm.uhd_min_pixels {
            return Err(ConfigError::Invalid(format!(
                "smart_mode.hd_min_pixels ({}) must be below uhd_min_pixels ({})",
                sm.hd_min_pixels, sm.uhd_min_pixels
            )));
        }
        if !(sm.software_fallback_ratio > 0.0 && sm.software_fallback_ratio <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "smart_mode.software_fallback_ratio ({}) must be in (0, 1]",
                sm.software_fallback_ratio
            )));
        }
        if self.paths.scratch_dir == self.paths.archive_dir {
            return Err(ConfigError::Invalid(
                "paths.scratch_dir and paths.archive_dir must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from file, apply environment overrides and validate
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = match Self::load_from_file(path) {
            Ok(config) => config,
            Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(e),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}

/// Accept "true", "1", "yes" as true; "false", "0", "no" as false
fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
