//! Scan configuration
//!
//! Cadence, camera preference and zoom fallback for the scan loop. Every field
//! has a default, so partial JSON documents deserialize cleanly.

use crate::capture::{CapturePreferences, FacingMode, ZoomRange};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid scan configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Delay between polling ticks in milliseconds (default 300ms)
    pub tick_interval_ms: u64,
    /// Preferred camera
    pub facing_mode: FacingMode,
    /// Range offered for visual zoom when the camera has no optical zoom
    pub default_zoom: ZoomRange,
    /// Offer visual (preview-only) zoom on cameras without optical zoom
    pub visual_zoom_fallback: bool,
    /// Give up after this long without a match; unset scans indefinitely
    pub max_scan_duration_ms: Option<u64>,
    /// Ask the host to close the app after a message is sent
    pub close_after_send: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 300,
            facing_mode: FacingMode::Environment,
            default_zoom: ZoomRange::default(),
            visual_zoom_fallback: false,
            max_scan_duration_ms: None,
            close_after_send: true,
        }
    }
}

impl ScanConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "tick_interval_ms must be > 0".to_string(),
            ));
        }
        if !self.default_zoom.is_valid() {
            return Err(ConfigError::InvalidConfig(format!(
                "default_zoom must satisfy min <= max and step > 0 (got {:?})",
                self.default_zoom
            )));
        }
        // preview scale is level / min
        if self.default_zoom.min <= 0.0 {
            return Err(ConfigError::InvalidConfig(format!(
                "default_zoom.min must be > 0 (got {})",
                self.default_zoom.min
            )));
        }
        if self.max_scan_duration_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "max_scan_duration_ms must be > 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_tick_interval(mut self, interval_ms: u64) -> Result<Self, ConfigError> {
        self.tick_interval_ms = interval_ms;
        self.validate()?;
        Ok(self)
    }

    pub fn with_max_scan_duration(mut self, duration_ms: u64) -> Result<Self, ConfigError> {
        self.max_scan_duration_ms = Some(duration_ms);
        self.validate()?;
        Ok(self)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn max_scan_duration(&self) -> Option<Duration> {
        self.max_scan_duration_ms.map(Duration::from_millis)
    }

    pub fn preferences(&self) -> CapturePreferences {
        CapturePreferences {
            facing_mode: self.facing_mode,
        }
    }

    /// Visual zoom range, if the fallback is enabled
    pub fn visual_zoom(&self) -> Option<ZoomRange> {
        self.visual_zoom_fallback.then_some(self.default_zoom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.tick_interval(), Duration::from_millis(300));
        assert_eq!(config.facing_mode, FacingMode::Environment);
        assert!(config.max_scan_duration().is_none());
        assert!(config.close_after_send);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(ScanConfig::default().with_tick_interval(0).is_err());
        assert!(ScanConfig::default().with_tick_interval(16).is_ok());
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert!(ScanConfig::default().with_max_scan_duration(0).is_err());
        let config = ScanConfig::default().with_max_scan_duration(5_000).unwrap();
        assert_eq!(config.max_scan_duration(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_invalid_zoom_range_rejected() {
        let config = ScanConfig {
            default_zoom: ZoomRange {
                min: 3.0,
                max: 1.0,
                step: 0.1,
            },
            ..ScanConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_zoom_minimum_rejected() {
        for min in [0.0, -1.0, f64::NAN] {
            let config = ScanConfig {
                default_zoom: ZoomRange {
                    min,
                    max: 3.0,
                    step: 0.1,
                },
                ..ScanConfig::default()
            };
            assert!(config.validate().is_err(), "min {} accepted", min);
        }
    }

    #[test]
    fn test_visual_zoom_only_when_enabled() {
        let mut config = ScanConfig::default();
        assert!(config.visual_zoom().is_none());
        config.visual_zoom_fallback = true;
        assert_eq!(config.visual_zoom(), Some(ZoomRange::default()));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: ScanConfig =
            serde_json::from_str(r#"{"tick_interval_ms": 100, "facing_mode": "user"}"#).unwrap();
        assert_eq!(config.tick_interval_ms, 100);
        assert_eq!(config.facing_mode, FacingMode::User);
        assert!(config.close_after_send);
    }
}
