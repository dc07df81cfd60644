//! Focus configuration
//!
//! Read from `<config>/daedalos/focus/config.json`. A missing file means
//! defaults, and every field falls back to its default on its own.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::machine::EngineTimings;
use crate::sensor::SensorBackend;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FocusConfig {
    /// Countdown refresh period (milliseconds)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Motion is ignored this long after every (re)start (milliseconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Acceleration magnitude that counts as moving the device
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Length of the first session when none is given and none is remembered
    #[serde(default = "default_duration_minutes")]
    pub default_duration_minutes: u64,

    /// Accelerometer polling period (milliseconds)
    #[serde(default = "default_sensor_poll_ms")]
    pub sensor_poll_ms: u64,

    /// "auto", "none", or an IIO device directory
    #[serde(default = "default_sensor")]
    pub sensor: String,
}

fn default_tick_interval_ms() -> u64 {
    50
}

fn default_grace_period_ms() -> u64 {
    1500
}

fn default_sensitivity() -> f64 {
    5.0
}

fn default_duration_minutes() -> u64 {
    25
}

fn default_sensor_poll_ms() -> u64 {
    100
}

fn default_sensor() -> String {
    "auto".to_string()
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            grace_period_ms: default_grace_period_ms(),
            sensitivity: default_sensitivity(),
            default_duration_minutes: default_duration_minutes(),
            sensor_poll_ms: default_sensor_poll_ms(),
            sensor: default_sensor(),
        }
    }
}

impl FocusConfig {
    /// Load config from file
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Engine parameters. `remembered` overrides the configured default
    /// length for the first start.
    pub fn timings(&self, remembered: Option<Duration>) -> EngineTimings {
        let fallback = remembered
            .filter(|d| !d.is_zero())
            .unwrap_or(Duration::from_secs(self.default_duration_minutes * 60));

        EngineTimings {
            tick_interval: Duration::from_millis(self.tick_interval_ms.max(1)),
            grace_period: Duration::from_millis(self.grace_period_ms),
            sensitivity: self.sensitivity,
            fallback_duration: fallback,
        }
    }

    pub fn sensor_backend(&self) -> SensorBackend {
        SensorBackend::from_setting(&self.sensor)
    }

    pub fn sensor_poll(&self) -> Duration {
        Duration::from_millis(self.sensor_poll_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = FocusConfig::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, FocusConfig::default());
        assert_eq!(config.timings(None), EngineTimings::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"sensitivity": 2.5, "sensor": "none"}"#).unwrap();

        let config = FocusConfig::load(&path).unwrap();
        assert_eq!(config.sensitivity, 2.5);
        assert_eq!(config.grace_period_ms, 1500);
        assert_eq!(config.sensor_backend(), SensorBackend::Absent);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("focus").join("config.json");
        let config = FocusConfig {
            default_duration_minutes: 50,
            ..FocusConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(FocusConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ nope").unwrap();
        assert!(FocusConfig::load(&path).is_err());
    }

    #[test]
    fn test_remembered_duration_wins() {
        let config = FocusConfig::default();
        let timings = config.timings(Some(Duration::from_secs(40 * 60)));
        assert_eq!(timings.fallback_duration, Duration::from_secs(40 * 60));

        let timings = config.timings(Some(Duration::ZERO));
        assert_eq!(timings.fallback_duration, Duration::from_secs(25 * 60));
    }
}
