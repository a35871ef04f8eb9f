use std::{env, fmt, fs, io, path, time::Duration};

use checkup::{alert::AlertProvider, metrics::MetricsProvider, Check, DEFAULT_AGENT_PORT};
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
    /// Run the configured checks only, without the RPC server
    pub standalone: bool,
    pub port: u16,
    /// Port of the HTTP status endpoint, disabled when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_port: Option<u16>,
    /// Period of the export and alert loop
    #[serde(with = "checkup::duration")]
    pub interval: Duration,
    /// Stats kept per check between two exports
    pub history_limit: usize,
    pub log: LogConfig,
    pub metrics: MetricsProvider,
    pub alerts: Vec<AlertProvider>,
    pub checks: Vec<Check>,
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/uppe/agent.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("uppe/agent.toml"))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            standalone: false,
            port: DEFAULT_AGENT_PORT,
            status_port: None,
            interval: Duration::from_secs(30),
            history_limit: 1024,
            log: LogConfig::default(),
            metrics: MetricsProvider::default(),
            alerts: Vec::new(),
            checks: Vec::new(),
        }
    }
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_1 = write_indented(1);

        let status_port = match self.status_port {
            Some(port) => port.to_string(),
            None => "disabled".to_string(),
        };

        writeln!(f, "Current Agent Configuration State:")?;
        write_title_1(f, "Agent")?;
        write_1(f, "Standalone", &self.standalone)?;
        write_1(f, "RPC Port", &self.port)?;
        write_1(f, "Status Port", &status_port)?;
        write_1(f, "Export Interval", &humantime::format_duration(self.interval))?;
        write_1(f, "History Limit", &self.history_limit)?;
        write_title_1(f, "Logging")?;
        write_1(f, "Level", &self.log.level)?;
        write_1(f, "Format", &self.log.format)?;
        write_title_1(f, "Metrics")?;
        write_1(f, "Backend", &self.metrics.backend)?;
        write_1(f, "Host", &self.metrics.host)?;
        write_title_1(f, "Alerts")?;
        for alert in &self.alerts {
            write_1(f, "Service", &alert.service)?;
        }
        write_title_1(f, "Checks")?;
        for check in &self.checks {
            write_1(f, &check.id, &check.display_name())?;
        }

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/uppe/agent.toml
    ///  or the specified path, with the name agent.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str(raw_string.as_str())
                .map_err(|source| ConfigError::ParseFailed { path: config_path, source })
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str: String = toml::to_string_pretty(self)?;

        let write_failed = |source| ConfigError::WriteFailed { path: path.to_path_buf(), source };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_failed)?;
        }

        fs::write(path, config_str).map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use checkup::Component;

    use super::*;

    #[test]
    fn missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/agent");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join("nested/agent.toml").exists());

        let reread = Config::from_config(Some(dir.path().join("nested/agent.toml"))).unwrap();
        assert_eq!(reread, config);
    }

    #[test]
    fn written_checks_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");

        let config = Config {
            status_port: Some(8080),
            checks: vec![Check {
                id: "site".into(),
                name: "Site".into(),
                interval: Duration::from_secs(60),
                timeout: Duration::from_secs(5),
                input: Component::new("HTTP", "GET"),
                output: Component::new("STATUSCODE", "200"),
                target: Component::new("URL", "https://example.com"),
                payloads: vec![Component::new("HEADER", "Accept=text/html")],
                alerts: vec![],
            }],
            ..Config::default()
        };
        config.write_config(&path).unwrap();

        assert_eq!(Config::from_config(Some(&path)).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(
            &path,
            r#"
standalone = true
interval = "1m"

[[checks]]
id = "db"
interval = "10s"
timeout = "2s"
input = { type = "TCP" }
output = { type = "TIMEOUT" }
target = { type = "ADDRESS", value = "db.internal:5432" }

[[checks.alerts]]
service = "discord"
target = "https://discord.test/hook"
"#,
        )
        .unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(config.standalone);
        assert_eq!(config.port, DEFAULT_AGENT_PORT);
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.checks.len(), 1);
        assert_eq!(config.checks[0].target.value, "db.internal:5432");
        assert_eq!(config.checks[0].alerts[0].service, "discord");
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        fs::write(&path, "interval = 30").unwrap();

        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::ParseFailed { .. })));
    }
}
