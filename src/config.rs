//! Configuration System using Figment
//!
//! Strongly-typed configuration for the `rust_afl` binary. Configuration is
//! layered from:
//! 1. Built-in defaults ([`AflConfig::default`])
//! 2. A TOML file (`config/afl.toml` unless another path is given)
//! 3. Environment variables prefixed with `RUST_AFL_`, nested keys split on `__`
//!
//! # Example
//! ```no_run
//! use rust_afl::config::AflConfig;
//!
//! let config = AflConfig::load()?;
//! println!("Application: {}", config.application.name);
//! # Ok::<(), rust_afl::config::ConfigError>(())
//! ```

use crate::controller::Controller;
use afl_core::{
    AflResult, Algorithm, BrightnessComponent, ControllerType, Limit, Mode, Rect,
    RoiCombination, RoiPreset, SharpnessAlgorithm, WeightedRoi,
};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/afl.toml";

/// Accepted values for `application.log_level`.
pub const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Accepted values for `application.log_format`.
pub const LOG_FORMATS: [&str; 3] = ["pretty", "compact", "json"];

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A provider failed or the merged document did not match the schema.
    #[error("Configuration load error: {0}")]
    Load(#[from] Box<figment::Error>),

    /// The configuration parsed but holds an unusable value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load(Box::new(err))
    }
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AflConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Simulated camera settings
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Controllers to create, one per type
    #[serde(default = "default_controllers")]
    pub controllers: Vec<ControllerPreset>,
}

impl Default for AflConfig {
    fn default() -> Self {
        Self {
            application: ApplicationConfig::default(),
            simulation: SimulationConfig::default(),
            controllers: default_controllers(),
        }
    }
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    #[serde(default = "default_name")]
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

/// Simulated camera and acquisition loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Frame width in pixels
    #[serde(default = "default_width")]
    pub width: u32,
    /// Frame height in pixels
    #[serde(default = "default_height")]
    pub height: u32,
    /// Produce RGB frames instead of mono
    #[serde(default = "default_color")]
    pub color: bool,
    /// Number of frames to capture
    #[serde(default = "default_frames")]
    pub frames: u64,
    /// Delay between captured frames in milliseconds
    #[serde(default)]
    pub frame_interval_ms: u64,
    /// Focus position with the sharpest image
    #[serde(default = "default_best_focus")]
    pub best_focus: i32,
    /// Uniform noise amplitude in grey levels
    #[serde(default = "default_noise")]
    pub noise: f64,
    /// Noise generator seed
    #[serde(default)]
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            color: default_color(),
            frames: default_frames(),
            frame_interval_ms: 0,
            best_focus: default_best_focus(),
            noise: default_noise(),
            seed: 0,
        }
    }
}

/// Initial settings for one controller.
///
/// Every field except `kind` is optional; present fields go through the
/// regular controller setters, so range and capability checks apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerPreset {
    /// Controller type
    pub kind: ControllerType,
    /// Global mode, applied after every other field
    #[serde(default)]
    pub mode: Option<Mode>,
    /// Exposure component mode (brightness only)
    #[serde(default)]
    pub exposure_mode: Option<Mode>,
    /// Gain component mode (brightness only)
    #[serde(default)]
    pub gain_mode: Option<Mode>,
    /// Frames between evaluations
    #[serde(default)]
    pub skip_frames: Option<u32>,
    /// Measurement rectangle
    #[serde(default)]
    pub roi: Option<Rect>,
    /// Named measurement rectangle
    #[serde(default)]
    pub roi_preset: Option<RoiPreset>,
    /// Weighted regions (autofocus only)
    #[serde(default)]
    pub weighted_rois: Vec<WeightedRoi>,
    /// Overlap policy for weighted regions
    #[serde(default)]
    pub roi_combination: Option<RoiCombination>,
    /// Target brightness
    #[serde(default)]
    pub auto_target: Option<u32>,
    /// Accepted deviation from the target
    #[serde(default)]
    pub auto_tolerance: Option<u32>,
    /// Share of darkest pixels measured
    #[serde(default)]
    pub auto_percentile: Option<f64>,
    /// Focus search strategy
    #[serde(default)]
    pub algorithm: Option<Algorithm>,
    /// Focus sharpness metric
    #[serde(default)]
    pub sharpness_algorithm: Option<SharpnessAlgorithm>,
    /// Focus search bounds
    #[serde(default)]
    pub limit: Option<Limit>,
    /// Sharpness drop in percent that restarts a continuous search
    #[serde(default)]
    pub hysteresis: Option<u8>,
}

impl ControllerPreset {
    /// Preset with no fields set.
    pub fn new(kind: ControllerType) -> Self {
        Self {
            kind,
            mode: None,
            exposure_mode: None,
            gain_mode: None,
            skip_frames: None,
            roi: None,
            roi_preset: None,
            weighted_rois: Vec::new(),
            roi_combination: None,
            auto_target: None,
            auto_tolerance: None,
            auto_percentile: None,
            algorithm: None,
            sharpness_algorithm: None,
            limit: None,
            hysteresis: None,
        }
    }

    /// Preset that only sets the mode.
    pub fn with_mode(kind: ControllerType, mode: Mode) -> Self {
        Self {
            mode: Some(mode),
            ..Self::new(kind)
        }
    }

    /// Push every present field into `controller`.
    pub fn apply(&self, controller: &Controller) -> AflResult<()> {
        if let Some(value) = self.skip_frames {
            controller.set_skip_frames(value)?;
        }
        if let Some(roi) = self.roi {
            controller.set_roi(roi)?;
        }
        if let Some(preset) = self.roi_preset {
            controller.set_roi_preset(preset)?;
        }
        if !self.weighted_rois.is_empty() {
            controller.set_weighted_rois(&self.weighted_rois)?;
        }
        if let Some(combination) = self.roi_combination {
            controller.set_roi_combination(combination)?;
        }
        if let Some(value) = self.auto_target {
            controller.set_auto_target(value)?;
        }
        if let Some(value) = self.auto_tolerance {
            controller.set_auto_tolerance(value)?;
        }
        if let Some(value) = self.auto_percentile {
            controller.set_auto_percentile(value)?;
        }
        if let Some(algorithm) = self.algorithm {
            controller.set_algorithm(algorithm)?;
        }
        if let Some(algorithm) = self.sharpness_algorithm {
            controller.set_sharpness_algorithm(algorithm)?;
        }
        if let Some(limit) = self.limit {
            controller.set_limit(limit)?;
        }
        if let Some(value) = self.hysteresis {
            controller.set_hysteresis(value)?;
        }
        if let Some(mode) = self.exposure_mode {
            controller.set_brightness_component_mode(BrightnessComponent::Exposure, mode)?;
        }
        if let Some(mode) = self.gain_mode {
            controller.set_brightness_component_mode(BrightnessComponent::Gain, mode)?;
        }
        if let Some(mode) = self.mode {
            controller.set_mode(mode)?;
        }
        Ok(())
    }
}

// Default value functions
fn default_name() -> String {
    "Rust AFL".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_width() -> u32 {
    320
}

fn default_height() -> u32 {
    240
}

fn default_color() -> bool {
    true
}

fn default_frames() -> u64 {
    200
}

fn default_best_focus() -> i32 {
    600
}

fn default_noise() -> f64 {
    1.0
}

fn default_controllers() -> Vec<ControllerPreset> {
    ControllerType::ALL
        .iter()
        .map(|&kind| ControllerPreset::with_mode(kind, Mode::Once))
        .collect()
}

impl AflConfig {
    /// Load configuration from `config/afl.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `RUST_AFL_`.
    /// Example: `RUST_AFL_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file leaves the defaults in place.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: Self = Figment::from(Serialized::defaults(AflConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("RUST_AFL_").split("__"))
            .extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        let level = self.application.log_level.to_lowercase();
        if !LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                LOG_LEVELS.join(", ")
            )));
        }

        let format = self.application.log_format.to_lowercase();
        if !LOG_FORMATS.contains(&format.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                LOG_FORMATS.join(", ")
            )));
        }

        if self.simulation.width == 0 || self.simulation.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "Invalid frame size {}x{}. Both dimensions must be non-zero",
                self.simulation.width, self.simulation.height
            )));
        }

        // At most one controller per type, the same rule a manager enforces
        let mut kinds = HashSet::new();
        for preset in &self.controllers {
            if !kinds.insert(preset.kind) {
                return Err(ConfigError::Invalid(format!(
                    "Duplicate controller kind: {}",
                    preset.kind
                )));
            }
        }

        Ok(())
    }

    /// Controller types listed in the configuration, in order.
    pub fn controller_kinds(&self) -> Vec<ControllerType> {
        self.controllers.iter().map(|preset| preset.kind).collect()
    }
}
