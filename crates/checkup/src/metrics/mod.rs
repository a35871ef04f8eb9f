//! Metrics built from run statistics and the exporters that store them.

mod log;
mod memory;

use std::{collections::HashMap, fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{controller::RunStat, registry::Registry};

pub use self::log::LogExporter;
pub use memory::MemoryExporter;

/// One exported data point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub check_id: String,
    pub check_name: String,
    pub successful: bool,
    pub timeout: bool,
    pub start_time: DateTime<Utc>,
    #[serde(with = "crate::duration")]
    pub duration: Duration,
}

impl From<&RunStat> for Metric {
    fn from(stat: &RunStat) -> Self {
        Self {
            check_id: stat.id.clone(),
            check_name: stat.name.clone(),
            // a run that errored never counts as a successful check
            successful: stat.successful && !stat.is_err(),
            timeout: stat.timeout,
            start_time: stat.start_time,
            duration: stat.duration,
        }
    }
}

/// Flatten pulled stats into metrics
pub fn from_stats(stats: &HashMap<String, Vec<RunStat>>) -> Vec<Metric> {
    let mut metrics: Vec<Metric> = stats.values().flatten().map(Metric::from).collect();
    metrics.sort_by(|a, b| a.start_time.cmp(&b.start_time));
    metrics
}

/// Sort every check's metrics newest first
pub(crate) fn sort_newest_first(metrics: &mut HashMap<String, Vec<Metric>>) {
    for list in metrics.values_mut() {
        list.sort_by(|a, b| b.start_time.cmp(&a.start_time));
    }
}

/// Storage backend for metrics
#[async_trait]
pub trait Exporter: Send + Sync {
    async fn export(&self, metrics: &[Metric]) -> anyhow::Result<()>;

    /// Metrics of the last `duration` keyed by check id and sorted by start
    /// time descending, all checks when `check_ids` is empty
    async fn get_metrics(
        &self,
        duration: Duration,
        check_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<Metric>>>;

    /// Drop whatever is kept for a removed check
    async fn forget(&self, _check_id: &str) {}
}

/// Connection settings of the metrics backend
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MetricsProvider {
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub db_name: String,
    pub username: String,
    pub password: String,
    pub ssl_mode: String,
}

impl Default for MetricsProvider {
    fn default() -> Self {
        Self {
            backend: LogExporter::NAME.to_string(),
            host: "localhost".to_string(),
            port: 0,
            db_name: String::new(),
            username: String::new(),
            password: String::new(),
            ssl_mode: String::new(),
        }
    }
}

impl fmt::Debug for MetricsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsProvider")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("db_name", &self.db_name)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

pub type ExporterFactory =
    Arc<dyn Fn(&MetricsProvider) -> anyhow::Result<Arc<dyn Exporter>> + Send + Sync>;

pub type ExporterRegistry = Registry<ExporterFactory>;

impl Registry<ExporterFactory> {
    pub fn exporters() -> Self {
        Registry::new("exporter")
    }

    pub fn builtin() -> Result<Self, crate::RegistryError> {
        let mut registry = Self::exporters();
        registry.register(
            LogExporter::NAME,
            Arc::new(|_: &MetricsProvider| Ok(Arc::new(LogExporter) as Arc<dyn Exporter>))
                as ExporterFactory,
        )?;
        registry.register(
            MemoryExporter::NAME,
            Arc::new(|_: &MetricsProvider| {
                Ok(Arc::new(MemoryExporter::default()) as Arc<dyn Exporter>)
            }) as ExporterFactory,
        )?;
        Ok(registry)
    }

    /// Build the exporter named by `provider.backend`
    pub fn initialize(&self, provider: &MetricsProvider) -> anyhow::Result<Arc<dyn Exporter>> {
        let factory = self
            .get(&provider.backend)
            .ok_or_else(|| anyhow::anyhow!("metrics backend not registered: {}", provider.backend))?;
        factory(provider)
    }
}
