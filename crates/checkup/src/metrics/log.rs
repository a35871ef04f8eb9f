use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use tracing::info;

use super::{Exporter, Metric};

/// Writes every metric as a log line, keeps nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct LogExporter;

impl LogExporter {
    pub const NAME: &'static str = "log";
}

#[async_trait]
impl Exporter for LogExporter {
    async fn export(&self, metrics: &[Metric]) -> anyhow::Result<()> {
        for metric in metrics {
            info!(
                check_id = %metric.check_id,
                check_name = %metric.check_name,
                successful = metric.successful,
                timeout = metric.timeout,
                start_time = %metric.start_time,
                duration_ms = metric.duration.as_millis() as u64,
                "check metric"
            );
        }
        Ok(())
    }

    async fn get_metrics(
        &self,
        _duration: Duration,
        _check_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<Metric>>> {
        anyhow::bail!("the log exporter does not store metrics")
    }
}
