use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Global hfjobs configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub hub: HubConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HubConfig {
    /// Base URL of the Hub (jobs and dataset APIs live under it)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Environment variable containing the access token
    #[serde(default = "default_token_env")]
    pub token_env: String,
    /// Token stored in the config file, used when the environment has none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RunConfig {
    /// Hardware flavor used when --flavor is not given
    #[serde(default = "default_flavor")]
    pub default_flavor: String,
    /// Image used by `uv run`; the python version is appended as a tag
    #[serde(default = "default_uv_image")]
    pub uv_image: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between status checks while no logs are available
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Give up following a job after this many seconds (unset: wait forever)
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

fn default_endpoint() -> String {
    std::env::var("HF_ENDPOINT").unwrap_or_else(|_| "https://huggingface.co".to_string())
}

fn default_token_env() -> String {
    "HF_TOKEN".to_string()
}

fn default_flavor() -> String {
    "cpu-basic".to_string()
}

fn default_uv_image() -> String {
    "ghcr.io/astral-sh/uv".to_string()
}

fn default_poll_interval_secs() -> u64 {
    1
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            token_env: default_token_env(),
            token: None,
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            default_flavor: default_flavor(),
            uv_image: default_uv_image(),
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            max_wait_secs: None,
        }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_secs.map(Duration::from_secs)
    }
}

/// Returns the hfjobs config directory (~/.config/hfjobs/)
pub fn config_dir() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("Could not determine config directory")?
        .join("hfjobs");
    Ok(config_dir)
}

/// Returns the config file path (~/.config/hfjobs/config.toml)
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Returns the directory holding the last-repository pointer (~/.hfjobs/)
pub fn state_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".hfjobs"))
}

/// Loads the config from `path` (or the default location), falling back to defaults
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => config_file()?,
    };

    if config_path.exists() {
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        let config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse config file")?;
        Ok(config)
    } else {
        Ok(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert_eq!(config.hub.token_env, "HF_TOKEN");
        assert_eq!(config.run.default_flavor, "cpu-basic");
        assert_eq!(config.monitor.poll_interval(), Duration::from_secs(1));
        assert!(config.monitor.max_wait().is_none());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let serialized = toml::to_string_pretty(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(deserialized.run.uv_image, config.run.uv_image);
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str("[monitor]\nmax_wait_secs = 600\n").unwrap();
        assert_eq!(config.monitor.max_wait(), Some(Duration::from_secs(600)));
        assert_eq!(config.monitor.poll_interval_secs, 1);
        assert_eq!(config.run.default_flavor, "cpu-basic");
    }

    #[test]
    fn test_load_config_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[run]\ndefault_flavor = \"t4-small\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.run.default_flavor, "t4-small");

        let missing = load_config(Some(&dir.path().join("nope.toml"))).unwrap();
        assert_eq!(missing.run.default_flavor, "cpu-basic");
    }
}
