//! Centralized configuration management with TOML support.
//!
//! Provides structured configs for quantization, video rate control, and the
//! runtime model registry with load/save capabilities. The registry is passed
//! in at runtime and never written back by the core.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{KipepeoError, Result};

/// Block sizes the quantization configuration accepts (0 means auto-select).
pub const SUPPORTED_BLOCK_SIZES: [u32; 3] = [64, 128, 256];

/// Quantization defaults applied when a caller does not pass an explicit config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantizationSettings {
    /// Block size for group quantization. 0 = auto-select from hardware.
    pub block_size: u32,
    /// Ternary threshold. 0.0 = use the hardware-recommended default.
    pub ternary_threshold: f32,
    /// Derive the ternary threshold from the weight distribution.
    pub adaptive_thresholds: bool,
    /// Allow NEON paths when the target supports them.
    pub use_neon: bool,
}

impl Default for QuantizationSettings {
    fn default() -> Self {
        Self {
            block_size: 0,
            ternary_threshold: 0.0,
            adaptive_thresholds: true,
            use_neon: true,
        }
    }
}

impl QuantizationSettings {
    /// Validate configuration values.
    ///
    /// Block sizes outside the supported set are rejected here, not in the
    /// encoders; the encoders accept any positive power of two.
    pub fn validate(&self) -> Result<()> {
        if self.block_size != 0 && !SUPPORTED_BLOCK_SIZES.contains(&self.block_size) {
            return Err(KipepeoError::InvalidConfig(format!(
                "block_size must be one of {:?} (or 0 for auto), got {}",
                SUPPORTED_BLOCK_SIZES, self.block_size
            )));
        }
        if self.ternary_threshold != 0.0
            && !(0.25..=0.40).contains(&self.ternary_threshold)
        {
            return Err(KipepeoError::InvalidConfig(format!(
                "ternary_threshold must be in [0.25, 0.40], got {}",
                self.ternary_threshold
            )));
        }
        Ok(())
    }
}

/// Video rate-control settings shared by the encoder wrapper and kip-mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoSettings {
    /// Target bitrate in kbps.
    pub target_bitrate_kbps: u32,
    /// Hard lower bound for the per-frame bitrate target.
    pub min_bitrate_kbps: u32,
    /// Hard upper bound for the per-frame bitrate target.
    pub max_bitrate_kbps: u32,
    /// Quality boost for skin regions (1.0-2.0).
    pub skin_tone_boost: f32,
    /// Enable skin tone preservation.
    pub enable_skin_protection: bool,
    /// Enable talking-head detection.
    pub enable_talking_head_detection: bool,
    /// Minimum QP for skin regions.
    pub min_qp_skin: f32,
    /// Maximum QP for background regions.
    pub max_qp_background: f32,
}

impl Default for VideoSettings {
    fn default() -> Self {
        Self {
            target_bitrate_kbps: 500,
            min_bitrate_kbps: 100,
            max_bitrate_kbps: 2000,
            skin_tone_boost: 1.5,
            enable_skin_protection: true,
            enable_talking_head_detection: true,
            min_qp_skin: 10.0,
            max_qp_background: 50.0,
        }
    }
}

impl VideoSettings {
    /// Validate rate-control bounds.
    pub fn validate(&self) -> Result<()> {
        if self.min_bitrate_kbps > self.max_bitrate_kbps {
            return Err(KipepeoError::InvalidConfig(
                "min_bitrate_kbps must be <= max_bitrate_kbps".into(),
            ));
        }
        if !(1.0..=2.0).contains(&self.skin_tone_boost) {
            return Err(KipepeoError::InvalidConfig(format!(
                "skin_tone_boost must be in [1.0, 2.0], got {}",
                self.skin_tone_boost
            )));
        }
        if self.min_qp_skin > self.max_qp_background {
            return Err(KipepeoError::InvalidConfig(
                "min_qp_skin must be <= max_qp_background".into(),
            ));
        }
        Ok(())
    }
}

/// One entry of the runtime model registry: size-class label to model file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRegistryEntry {
    /// Size-class label ("7B", "13B", "34B", "70B").
    pub size: String,
    /// Path to the quantized model file.
    pub path: String,
    /// Minimum RAM required to load, in MB.
    pub required_ram_mb: u64,
    /// RAM for comfortable operation, in MB.
    pub optimal_ram_mb: u64,
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Quantization defaults.
    pub quantization: QuantizationSettings,
    /// Video and rate-control settings.
    pub video: VideoSettings,
    /// Model registry (input only, never persisted by the core).
    #[serde(default)]
    pub models: Vec<ModelRegistryEntry>,
    /// Logging level (debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            quantization: QuantizationSettings::default(),
            video: VideoSettings::default(),
            models: Vec::new(),
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}

impl AppConfig {
    /// Load configuration from TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            KipepeoError::Other(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = toml::to_string_pretty(self)
            .map_err(|e| KipepeoError::Other(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    /// Validate all sub-configs.
    pub fn validate(&self) -> Result<()> {
        self.quantization.validate()?;
        self.video.validate()?;
        for entry in &self.models {
            if entry.required_ram_mb == 0 {
                return Err(KipepeoError::InvalidConfig(format!(
                    "model {} has required_ram_mb = 0",
                    entry.size
                )));
            }
        }
        Ok(())
    }
}
