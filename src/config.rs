// src/config.rs
//! Configuration management: JSON file under the user's config directory

use crate::error::{Result, TimerError};
use crate::gps::filter::GpsFilterTuning;
use crate::gps::pipeline::DEFAULT_LINE_MAX;
use crate::race::RaceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Receiver link settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsCfg {
    pub port: Option<String>,
    pub baud: u32,
    pub rate_hz: u8,
    pub line_max: usize,
}

impl Default for GpsCfg {
    fn default() -> Self {
        Self {
            port: None,
            baud: 115200,
            rate_hz: 20,
            line_max: DEFAULT_LINE_MAX,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub gps: GpsCfg,
    pub filter: GpsFilterTuning,
    pub race: RaceConfig,
}

impl AppConfig {
    /// Load from the default location, falling back to defaults if absent
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    /// Load and validate a config file; a missing file yields defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::info!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| TimerError::Other(format!("Failed to read config file: {}", e)))?;

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| TimerError::Other(format!("Failed to parse config file: {}", e)))?;

        config.validate()?;
        log::info!("Config loaded from {}", path.display());
        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        self.validate()?;

        // Create config directory if it doesn't exist
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| TimerError::Other(format!("Failed to create config directory: {}", e)))?;
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)
            .map_err(|e| TimerError::Other(format!("Failed to write config file: {}", e)))?;

        log::info!("Config saved to {}", path.display());
        Ok(())
    }

    /// Get config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let home = std::env::var("HOME")
            .map_err(|_| TimerError::Other("HOME environment variable not set".to_string()))?;

        Ok(PathBuf::from(home)
            .join(".config")
            .join("gps-dragtimer")
            .join("config.json"))
    }

    /// Reject orderings the filter and race engine cannot make sense of
    pub fn validate(&self) -> Result<()> {
        self.filter.validate().map_err(TimerError::Config)?;
        self.race.validate().map_err(TimerError::Config)?;
        if self.gps.baud == 0 {
            return Err(TimerError::Config("baud must be non-zero".to_string()));
        }
        if self.gps.rate_hz == 0 {
            return Err(TimerError::Config("rate_hz must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Update serial port settings
    pub fn update_serial(&mut self, port: String, baud: u32) {
        self.gps.port = Some(port);
        self.gps.baud = baud;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("gps-dragtimer-test-{}", std::process::id()))
            .join(name)
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.gps.baud, 115200);
        assert_eq!(config.gps.rate_hz, 20);
        assert_eq!(config.race.traps.len(), 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_update_serial() {
        let mut config = AppConfig::default();
        config.update_serial("/dev/ttyUSB0".to_string(), 9600);
        assert_eq!(config.gps.port, Some("/dev/ttyUSB0".to_string()));
        assert_eq!(config.gps.baud, 9600);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = AppConfig::load_from(&temp_path("does-not-exist.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip.json");
        let mut config = AppConfig::default();
        config.race.trigger_speed_kph = 8.0;
        config.filter.max_hdop_m = 2.0;
        config.save_to(&path).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let path = temp_path("partial.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, r#"{"gps": {"port": "/dev/ttyS1"}}"#).unwrap();

        let loaded = AppConfig::load_from(&path).unwrap();
        assert_eq!(loaded.gps.port.as_deref(), Some("/dev/ttyS1"));
        assert_eq!(loaded.gps.baud, 115200);
        assert_eq!(loaded.race, RaceConfig::default());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_inverted_arm_trigger_rejected_at_load() {
        let path = temp_path("inverted.json");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"race": {"arm_speed_kph": 10.0, "trigger_speed_kph": 5.0}}"#,
        )
        .unwrap();

        let err = AppConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, TimerError::Config(_)));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_bad_alpha_order_rejected() {
        let mut config = AppConfig::default();
        config.filter.ema_alpha_min = 0.9;
        config.filter.ema_alpha_max = 0.1;
        assert!(matches!(config.validate(), Err(TimerError::Config(_))));
    }
}
