//! Engine configuration.
//!
//! Stored as JSON in the platform config directory. Every field has a
//! default, so a partial file (or none at all) is valid.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{Error, Result};

/// File name of the configuration inside the config directory.
const CONFIG_FILE_NAME: &str = "engine.json";

/// Playback engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Application name reported to audio servers that show one.
    pub app_name: String,
    /// Renderer backend (`cpal` or `null`).
    pub backend: String,
    /// Output device name; the host default when unset.
    pub device: Option<String>,
    /// Seconds of PCM a renderer stages ahead of the device.
    pub buffer_secs: f64,
    /// The playback loop sleeps for buffered duration divided by this.
    pub pacing_divisor: f64,
    /// Lower bound of the pacing sleep, keeps an idle loop off the CPU.
    pub min_pacing_sleep_ms: u64,
    /// Upper bound of the pacing sleep, bounds transport latency.
    pub max_pacing_sleep_ms: u64,
    /// Volume applied to the renderer at startup (0 to 100).
    pub initial_volume: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "Cadence".to_string(),
            backend: "cpal".to_string(),
            device: None,
            buffer_secs: 1.0,
            pacing_divisor: 3.0,
            min_pacing_sleep_ms: 2,
            max_pacing_sleep_ms: 250,
            initial_volume: 100,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading engine config from {}", path.display());
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Load the configuration from [`Self::default_path`], falling back to
    /// defaults when it is missing or invalid.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        Self::load(&path).unwrap_or_else(|e| {
            warn!("Ignoring invalid config {}: {e}", path.display());
            Self::default()
        })
    }

    /// Location of the configuration file in the platform config directory.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "cadence").map(|d| d.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Write the configuration as pretty JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend.trim().is_empty() {
            return Err(Error::Config("backend must not be empty".to_string()));
        }
        if !(self.buffer_secs.is_finite() && self.buffer_secs > 0.0) {
            return Err(Error::Config(format!(
                "buffer_secs must be positive, got {}",
                self.buffer_secs
            )));
        }
        if !(self.pacing_divisor.is_finite() && self.pacing_divisor >= 1.0) {
            return Err(Error::Config(format!(
                "pacing_divisor must be at least 1, got {}",
                self.pacing_divisor
            )));
        }
        if self.min_pacing_sleep_ms > self.max_pacing_sleep_ms {
            return Err(Error::Config(format!(
                "min_pacing_sleep_ms ({}) exceeds max_pacing_sleep_ms ({})",
                self.min_pacing_sleep_ms, self.max_pacing_sleep_ms
            )));
        }
        if self.initial_volume > 100 {
            return Err(Error::Config(format!(
                "initial_volume must be within 0..=100, got {}",
                self.initial_volume
            )));
        }
        Ok(())
    }

    /// How long the playback loop waits given `buffered_secs` of queued audio.
    pub fn pacing_sleep(&self, buffered_secs: f64) -> Duration {
        let ms = if buffered_secs.is_finite() && buffered_secs > 0.0 {
            buffered_secs * 1000.0 / self.pacing_divisor
        } else {
            0.0
        };
        let ms = (ms as u64).clamp(self.min_pacing_sleep_ms, self.max_pacing_sleep_ms);
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.backend, "cpal");
        assert_eq!(config.initial_volume, 100);
    }

    #[test]
    fn test_partial_json() {
        let config = EngineConfig::from_json(r#"{ "backend": "null", "device": "hw:0" }"#).unwrap();
        assert_eq!(config.backend, "null");
        assert_eq!(config.device.as_deref(), Some("hw:0"));
        assert!((config.pacing_divisor - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(EngineConfig::from_json(r#"{ "buffer_secs": 0 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "pacing_divisor": 0.5 }"#).is_err());
        assert!(EngineConfig::from_json(r#"{ "initial_volume": 101 }"#).is_err());
        assert!(EngineConfig::from_json(
            r#"{ "min_pacing_sleep_ms": 10, "max_pacing_sleep_ms": 5 }"#
        )
        .is_err());
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn test_pacing_sleep() {
        let config = EngineConfig::default();
        assert_eq!(config.pacing_sleep(0.375), Duration::from_millis(125));
        assert_eq!(config.pacing_sleep(0.0), Duration::from_millis(2));
        assert_eq!(config.pacing_sleep(10.0), Duration::from_millis(250));
        assert_eq!(config.pacing_sleep(f64::NAN), Duration::from_millis(2));
    }

    #[test]
    fn test_save_and_load() {
        let dir = std::env::temp_dir().join(format!("cadence-config-{}", std::process::id()));
        let path = dir.join(CONFIG_FILE_NAME);
        let config = EngineConfig {
            backend: "null".to_string(),
            initial_volume: 40,
            ..EngineConfig::default()
        };

        config.save(&path).unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap(), config);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
