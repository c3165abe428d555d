//! Application configuration: one TOML file covering every subsystem.
//!
//! Missing file or missing sections degrade to defaults so the robot
//! always starts; only values that are present and invalid abort startup.

use color_eyre::eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::adapters::{GamepadSettings, VoiceSettings, WebBridgeSettings};
use crate::core::{DistanceSettings, EngineSettings, LedSettings, MotionSettings};

const CONFIG_DIR: &str = "rovercore";
const CONFIG_FILE: &str = "config.toml";

/// Development switches that never belong on the real robot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DevelopmentSettings {
    /// Use mock drivers even when real hardware would initialize.
    pub force_mock: bool,
    /// Distance reported by the mock sensor, in meters.
    pub mock_distance_m: Option<f32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub movement: MotionSettings,
    #[serde(default)]
    pub ticks: EngineSettings,
    #[serde(default)]
    pub leds: LedSettings,
    #[serde(default)]
    pub distance: DistanceSettings,
    #[serde(default)]
    pub gamepad: GamepadSettings,
    #[serde(default)]
    pub web: WebBridgeSettings,
    #[serde(default)]
    pub voice: VoiceSettings,
    #[serde(default)]
    pub development: DevelopmentSettings,
}

impl Config {
    /// `~/.config/rovercore/config.toml`, falling back to the working
    /// directory when no config dir can be determined.
    pub fn path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the config file, writing a default one on first run.
    pub async fn load() -> Result<Self> {
        let path = Self::path();

        if !tokio::fs::try_exists(&path)
            .await
            .map_err(|e| eyre!("Failed to check config file: {}", e))?
        {
            warn!("No config file at {}, writing defaults", path.display());
            let config = Self::default();
            config.save().await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| eyre!("Failed to read config file: {}", e))?;
        let config: Self =
            toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;

        config.validate()?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let path = Self::path();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| eyre!("Failed to serialize config: {}", e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| eyre!("Failed to write config file: {}", e))?;

        info!("Configuration saved to {}", path.display());
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.movement
            .validate()
            .map_err(|e| eyre!("movement: {}", e))?;
        self.ticks.validate().map_err(|e| eyre!("ticks: {}", e))?;
        self.leds.validate().map_err(|e| eyre!("leds: {}", e))?;
        self.distance
            .validate()
            .map_err(|e| eyre!("distance: {}", e))?;
        self.web.validate().map_err(|e| eyre!("web: {}", e))?;
        Ok(())
    }
}
