//! Application configuration management.
//!
//! Configuration is stored at `~/.config/ecometrics/config.json` and can be
//! overridden with `ECOMETRICS_*` environment variables (a `.env` file is
//! honored by the CLI).

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::client::{DEFAULT_API_BASE_URL, DEFAULT_REQUEST_TIMEOUT_SECS};
use crate::bootstrap::SeedSource;

/// Application name used for config/data directory paths
const APP_NAME: &str = "ecometrics";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Seed dataset consulted on first run when none is configured
pub const DEFAULT_SEED_PATH: &str = "data/ecoMetrics.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Offline-first, backed by the local cache
    #[default]
    Local,
    /// Every operation goes to the backend
    Remote,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Mode::Local),
            "remote" | "api" => Ok(Mode::Remote),
            other => Err(anyhow::anyhow!("Unknown mode '{}', expected local or remote", other)),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Local => f.write_str("local"),
            Mode::Remote => f.write_str("remote"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mode: Mode,
    pub api_base_url: String,
    /// URL or file path of the first-run dataset
    pub seed: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub request_timeout_secs: u64,
    /// Directory for rolling log files; stderr only when unset
    pub log_dir: Option<PathBuf>,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Local,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            seed: None,
            data_dir: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            log_dir: None,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Apply `ECOMETRICS_MODE`, `ECOMETRICS_API_URL`, `ECOMETRICS_DATA_DIR`
    /// and `ECOMETRICS_SEED` from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(mode) = lookup("ECOMETRICS_MODE") {
            self.mode = mode.parse()?;
        }
        if let Some(url) = lookup("ECOMETRICS_API_URL") {
            self.api_base_url = url;
        }
        if let Some(dir) = lookup("ECOMETRICS_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(seed) = lookup("ECOMETRICS_SEED") {
            self.seed = Some(seed);
        }
        Ok(())
    }

    /// Directory holding the cache keys and the session file.
    pub fn data_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.data_dir {
            return Ok(dir.clone());
        }
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn seed_source(&self) -> Result<SeedSource> {
        let seed = self.seed.as_deref().unwrap_or(DEFAULT_SEED_PATH);
        if seed.starts_with("http://") || seed.starts_with("https://") {
            SeedSource::http(seed).context("Failed to create seed HTTP client")
        } else {
            Ok(SeedSource::file(seed))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_from(&dir.path().join("config.json")).expect("defaults");
        assert_eq!(config.mode, Mode::Local);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("config.json");
        std::fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        std::fs::write(&path, r#"{"mode":"remote","api_base_url":"https://metrics.test/api"}"#)
            .expect("write");

        let mut config = Config::load_from(&path).expect("parse");
        assert_eq!(config.mode, Mode::Remote);
        assert_eq!(config.api_base_url, "https://metrics.test/api");
        assert_eq!(config.seed, None);

        config.last_username = Some("admin".to_string());
        config.save_to(&path).expect("save");
        let reloaded = Config::load_from(&path).expect("reload");
        assert_eq!(reloaded.last_username.as_deref(), Some("admin"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("ECOMETRICS_MODE", "Remote"),
            ("ECOMETRICS_API_URL", "https://override.test/api"),
            ("ECOMETRICS_DATA_DIR", "/tmp/eco"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| vars.get(key).map(|v| v.to_string()))
            .expect("valid overrides");
        assert_eq!(config.mode, Mode::Remote);
        assert_eq!(config.api_base_url, "https://override.test/api");
        assert_eq!(config.data_dir().expect("dir"), PathBuf::from("/tmp/eco"));

        let mut bad = Config::default();
        assert!(bad
            .apply_overrides(|key| (key == "ECOMETRICS_MODE").then(|| "sideways".to_string()))
            .is_err());
    }

    #[test]
    fn test_seed_source_selection() {
        let mut config = Config::default();
        assert!(matches!(config.seed_source().expect("seed"), SeedSource::File(_)));

        config.seed = Some("https://static.test/data/ecoMetrics.json".to_string());
        assert!(matches!(config.seed_source().expect("seed"), SeedSource::Http { .. }));
    }
}
