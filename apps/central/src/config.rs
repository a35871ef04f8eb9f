use std::{env, fs, io, path, time::Duration};

use checkup::DEFAULT_RPC_TIMEOUT;
use logger::LogConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to write {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: io::Error },
    #[error("failed to parse {path}: {source}")]
    ParseFailed { path: path::PathBuf, source: toml::de::Error },
    #[error("failed to serialize the configuration: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("neither XDG_CONFIG_HOME nor HOME is set")]
    ConfigPathUnavailable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Agent RPC addresses as `host:port`
    pub agents: Vec<String>,
    /// Timeout of every call against an agent
    #[serde(with = "checkup::duration")]
    pub timeout: Duration,
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self { agents: Vec::new(), timeout: DEFAULT_RPC_TIMEOUT, log: LogConfig::default() }
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// $XDG_CONFIG_HOME/uppe/central.toml or $HOME/.config/...
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/central.toml"))
}

impl Config {
    /// Read the config, writing the defaults first when the file is missing
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path = match optional_path {
            Some(path) => normalize_toml_path(path.as_ref()),
            None => default_config_path()?,
        };

        if !config_path.exists() {
            let config = Self::default();
            config.write_config(&config_path)?;
            return Ok(config);
        }

        let raw_string = fs::read_to_string(&config_path)
            .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
        toml::from_str(&raw_string).map_err(|source| ConfigError::ParseFailed { path: config_path, source })
    }

    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        let write_failed = |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }
        fs::write(path, config_str).map_err(write_failed)
    }
}
