// Configuration management for the attendscan CLI
//
// Cross-platform config stored in:
// - macOS: ~/Library/Application Support/attendscan/config.json
// - Linux: ~/.config/attendscan/config.json
// - Windows: %APPDATA%\attendscan\config.json

use anyhow::{Context, Result};
use attendscan_core::{FacingMode, HostIdentity, HostUser, ScanConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scan loop settings
    pub scan: ScanConfig,

    /// Simulated host identity for `simulate` and `message`
    pub host: HostConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Signed launch string to forward as `init_data`
    pub init_data: Option<String>,

    pub user_id: Option<i64>,

    pub username: Option<String>,
}

impl HostConfig {
    /// Identity the simulated host reports, `None` if nothing is configured
    pub fn identity(&self) -> Option<HostIdentity> {
        HostIdentity {
            init_data: self.init_data.clone().unwrap_or_default(),
            user: self.user_id.map(|id| HostUser {
                id,
                first_name: None,
                username: self.username.clone(),
            }),
        }
        .non_empty()
    }
}

fn optional(value: &str) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

impl Config {
    /// Get the config directory path (cross-platform)
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to determine config directory")?
            .join("attendscan");

        std::fs::create_dir_all(&config_dir).context("Failed to create config directory")?;

        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_file() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    /// Load config from the default location, creating it if missing
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
            let config: Config =
                serde_json::from_str(&contents).context("Failed to parse config file")?;
            config
                .scan
                .validate()
                .context("Config file holds invalid scan settings")?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, contents).context("Failed to write config file")?;
        Ok(())
    }

    /// Set a config value. The caller persists the result.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut scan = self.scan.clone();
        match key {
            "tick_interval_ms" => {
                scan.tick_interval_ms = value.parse().context("Invalid number")?;
            }
            "facing_mode" => {
                scan.facing_mode = value
                    .parse::<FacingMode>()
                    .map_err(anyhow::Error::msg)
                    .context("Invalid facing mode")?;
            }
            "zoom_min" => {
                scan.default_zoom.min = value.parse().context("Invalid number")?;
            }
            "zoom_max" => {
                scan.default_zoom.max = value.parse().context("Invalid number")?;
            }
            "zoom_step" => {
                scan.default_zoom.step = value.parse().context("Invalid number")?;
            }
            "visual_zoom_fallback" => {
                scan.visual_zoom_fallback = value.parse().context("Invalid boolean value")?;
            }
            "max_scan_duration_ms" => {
                scan.max_scan_duration_ms = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().context("Invalid number")?)
                };
            }
            "close_after_send" => {
                scan.close_after_send = value.parse().context("Invalid boolean value")?;
            }
            "init_data" => self.host.init_data = optional(value),
            "user_id" => {
                self.host.user_id = if value.is_empty() {
                    None
                } else {
                    Some(value.parse().context("Invalid user id")?)
                };
            }
            "username" => self.host.username = optional(value.trim_start_matches('@')),
            _ => anyhow::bail!("Unknown config key: {}", key),
        }
        scan.validate()?;
        self.scan = scan;
        Ok(())
    }

    /// Get a config value
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "tick_interval_ms" => Some(self.scan.tick_interval_ms.to_string()),
            "facing_mode" => Some(self.scan.facing_mode.to_string()),
            "zoom_min" => Some(self.scan.default_zoom.min.to_string()),
            "zoom_max" => Some(self.scan.default_zoom.max.to_string()),
            "zoom_step" => Some(self.scan.default_zoom.step.to_string()),
            "visual_zoom_fallback" => Some(self.scan.visual_zoom_fallback.to_string()),
            "max_scan_duration_ms" => self.scan.max_scan_duration_ms.map(|ms| ms.to_string()),
            "close_after_send" => Some(self.scan.close_after_send.to_string()),
            "init_data" => self.host.init_data.clone(),
            "user_id" => self.host.user_id.map(|id| id.to_string()),
            "username" => self.host.username.clone(),
            _ => None,
        }
    }

    /// List all config values
    pub fn list(&self) -> Vec<(String, String)> {
        [
            "tick_interval_ms",
            "facing_mode",
            "zoom_min",
            "zoom_max",
            "zoom_step",
            "visual_zoom_fallback",
            "max_scan_duration_ms",
            "close_after_send",
            "init_data",
            "user_id",
            "username",
        ]
        .iter()
        .map(|key| {
            let value = self.get(key).unwrap_or_else(|| "(unset)".to_string());
            (key.to_string(), value)
        })
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.scan.tick_interval_ms, 300);
        assert!(config.host.identity().is_none());
        assert_eq!(config.get("max_scan_duration_ms"), None);
    }

    #[test]
    fn test_set_and_get() {
        let mut config = Config::default();
        config.set("tick_interval_ms", "120").unwrap();
        config.set("facing_mode", "front").unwrap();
        config.set("max_scan_duration_ms", "5000").unwrap();
        config.set("username", "@ada").unwrap();

        assert_eq!(config.get("tick_interval_ms").as_deref(), Some("120"));
        assert_eq!(config.get("facing_mode").as_deref(), Some("user"));
        assert_eq!(config.get("max_scan_duration_ms").as_deref(), Some("5000"));
        assert_eq!(config.get("username").as_deref(), Some("ada"));

        config.set("max_scan_duration_ms", "").unwrap();
        assert_eq!(config.get("max_scan_duration_ms"), None);
    }

    #[test]
    fn test_invalid_values_leave_config_unchanged() {
        let mut config = Config::default();
        assert!(config.set("tick_interval_ms", "0").is_err());
        assert!(config.set("zoom_min", "9").is_err());
        assert!(config.set("zoom_min", "0").is_err());
        assert!(config.set("facing_mode", "sideways").is_err());
        assert!(config.set("listen_port", "80").is_err());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_identity_from_host_settings() {
        let mut config = Config::default();
        config.set("init_data", "hash=1").unwrap();
        config.set("user_id", "42").unwrap();

        let identity = config.host.identity().unwrap();
        assert_eq!(identity.init_data, "hash=1");
        assert_eq!(identity.user.unwrap().id, 42);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, Config::default());

        let mut config = created;
        config.set("close_after_send", "false").unwrap();
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"scan": {"tick_interval_ms": 50}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.scan.tick_interval_ms, 50);
        assert!(config.scan.close_after_send);
    }
}
