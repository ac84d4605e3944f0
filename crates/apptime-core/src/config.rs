//! Configuration file loading and saving.
//!
//! Loading is tolerant of a missing file (returns defaults) but a present,
//! malformed file is reported as an error rather than silently ignored —
//! the caller decides what "fatal" means, this module just reports it
//! accurately.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

const CONFIG_DIR_NAME: &str = "apptime";
const CONFIG_FILE_NAME: &str = "config.json";
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);
const MIN_POLL_GRACE: u32 = 1;
const DEFAULT_POLL_GRACE: u32 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakatimeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub cli_path: Option<String>,
    #[serde(default)]
    pub global_project: Option<String>,
}

impl Default for WakatimeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            cli_path: None,
            global_project: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WakapiConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub global_project: Option<String>,
}

impl Default for WakapiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: None,
            api_key: None,
            global_project: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub wakatime: WakatimeConfig,
    #[serde(default)]
    pub wakapi: WakapiConfig,
    #[serde(default = "default_poll_interval_str")]
    pub poll_interval: String,
    #[serde(default = "default_poll_grace")]
    pub poll_grace: u32,
}

fn default_poll_interval_str() -> String {
    "1s".to_string()
}

fn default_poll_grace() -> u32 {
    DEFAULT_POLL_GRACE
}

impl Default for Config {
    fn default() -> Self {
        Self {
            wakatime: WakatimeConfig::default(),
            wakapi: WakapiConfig::default(),
            poll_interval: default_poll_interval_str(),
            poll_grace: default_poll_grace(),
        }
    }
}

impl Config {
    /// Parses `poll_interval`, clamping to a 1ms floor.
    pub fn poll_interval(&self) -> Duration {
        let parsed = parse_duration(&self.poll_interval).unwrap_or(Duration::from_secs(1));
        if parsed < MIN_POLL_INTERVAL {
            tracing::warn!(
                configured = %self.poll_interval,
                "poll_interval below 1ms floor, clamping"
            );
            MIN_POLL_INTERVAL
        } else {
            parsed
        }
    }

    /// The grace window: `poll_interval * poll_grace`, with the multiplier
    /// floored to 1.
    pub fn grace_window(&self) -> Duration {
        let multiplier = self.poll_grace.max(MIN_POLL_GRACE);
        self.poll_interval() * multiplier
    }

    pub fn heartbeats_enabled(&self) -> bool {
        self.wakatime.enabled || self.wakapi.enabled
    }
}

/// Parses a small duration grammar: an integer followed by `ms` or `s`
/// (e.g. `"500ms"`, `"1s"`, `"2s"`). Anything else is rejected; callers
/// fall back to a default rather than failing Start over a typo in this
/// one field.
fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Some(digits) = value.strip_suffix("ms") {
        return digits.trim().parse::<u64>().ok().map(Duration::from_millis);
    }
    if let Some(digits) = value.strip_suffix('s') {
        return digits.trim().parse::<u64>().ok().map(Duration::from_secs);
    }
    value.parse::<u64>().ok().map(Duration::from_secs)
}

pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(CONFIG_DIR_NAME));
    }
    Err(CoreError::NoConfigDir)
}

pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Loads configuration from `path`. A missing file yields [`Config::default`];
/// a present-but-unparseable file is reported as [`CoreError::ConfigMalformed`].
pub fn load_from(path: &Path) -> Result<Config> {
    let data = match fs_err::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Config::default()),
        Err(err) => {
            return Err(CoreError::ConfigMalformed {
                path: path.to_path_buf(),
                details: err.to_string(),
            })
        }
    };

    serde_json::from_str(&data).map_err(|err| CoreError::ConfigMalformed {
        path: path.to_path_buf(),
        details: err.to_string(),
    })
}

pub fn load() -> Result<Config> {
    load_from(&config_path()?)
}

pub fn save_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs_err::create_dir_all(parent).map_err(|source| CoreError::ConfigWriteFailed {
            path: path.to_path_buf(),
            source,
        })?;
    }
    let payload = serde_json::to_string_pretty(config).expect("Config always serializes");
    fs_err::write(path, payload).map_err(|source| CoreError::ConfigWriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save(config: &Config) -> Result<()> {
    save_to(&config_path()?, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nonexistent.json");
        let config = load_from(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs_err::write(&path, "{ not json").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn round_trips_through_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut config = Config::default();
        config.wakatime.enabled = true;
        config.wakatime.api_key = Some("key-123".to_string());
        config.poll_interval = "500ms".to_string();
        save_to(&path, &config).unwrap();

        let loaded = load_from(&path).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn poll_interval_floor_is_one_millisecond() {
        let mut config = Config::default();
        config.poll_interval = "0ms".to_string();
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[test]
    fn grace_window_defaults_to_triple_poll_interval() {
        let config = Config::default();
        assert_eq!(config.grace_window(), Duration::from_secs(3));
    }

    #[test]
    fn grace_multiplier_floor_is_one() {
        let mut config = Config::default();
        config.poll_grace = 0;
        assert_eq!(config.grace_window(), config.poll_interval());
    }
}
