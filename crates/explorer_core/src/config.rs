//! Explorer configuration file.
//!
//! Every tunable lives in a resource with a `Default`; [`ExplorerConfig`]
//! gathers them so a whole setup can be saved to and loaded from JSON.
//! Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::audio::JumpSoundConfig;
use crate::character_controller::CharacterControllerConfig;
use crate::day_night::DayNightConfig;
use crate::sky_lighting::LightingConfig;
use crate::spawn::SpawnConfig;
use crate::terrain_loader::TerrainSource;

/// Errors that can occur while reading or writing a config file.
#[derive(Debug)]
pub enum ConfigError {
    /// File system error
    Io(std::io::Error),
    /// JSON (de)serialization error
    Json(serde_json::Error),
    /// Parsed fine but holds a value the simulation can't run with
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Json(e) => write!(f, "JSON error: {}", e),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io(e) => Some(e),
            ConfigError::Json(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Json(e)
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Complete explorer setup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplorerConfig {
    /// Window title
    pub title: String,
    /// Window resolution
    pub resolution: (u32, u32),
    /// Terrain loaded at startup
    pub terrain: TerrainSource,
    pub controller: CharacterControllerConfig,
    pub spawn: SpawnConfig,
    pub day_night: DayNightConfig,
    pub lighting: LightingConfig,
    pub jump_sound: JumpSoundConfig,
    /// Show the clock overlay
    pub show_hud: bool,
}

impl Default for ExplorerConfig {
    fn default() -> Self {
        Self {
            title: "Terrain Explorer".to_string(),
            resolution: (1280, 720),
            terrain: TerrainSource::default(),
            controller: CharacterControllerConfig::default(),
            spawn: SpawnConfig::default(),
            day_night: DayNightConfig::default(),
            lighting: LightingConfig::default(),
            jump_sound: JumpSoundConfig::default(),
            show_hud: true,
        }
    }
}

impl ExplorerConfig {
    /// Reject values that would break the controller or the clock.
    pub fn validate(&self) -> ConfigResult<()> {
        let controller = &self.controller;
        require_positive("controller.max_delta", controller.max_delta)?;
        require_non_negative("controller.max_pitch", controller.max_pitch)?;
        require_positive("controller.capsule_radius", controller.capsule_radius)?;
        require_positive("controller.player_height", controller.player_height)?;
        require_positive("day_night.day_length", self.day_night.day_length)?;
        Ok(())
    }
}

fn require_positive(name: &str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!("{} must be positive, got {}", name, value)))
    }
}

fn require_non_negative(name: &str, value: f32) -> ConfigResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{} must be zero or more, got {}",
            name, value
        )))
    }
}

/// Read a config from a JSON file and check its values.
pub fn load_config(path: impl AsRef<Path>) -> ConfigResult<ExplorerConfig> {
    let file = File::open(path)?;
    let config: ExplorerConfig = serde_json::from_reader(BufReader::new(file))?;
    config.validate()?;
    Ok(config)
}

/// Write a config as pretty-printed JSON.
pub fn save_config(path: impl AsRef<Path>, config: &ExplorerConfig) -> ConfigResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, config)?;
    writer.flush()?;
    Ok(())
}
