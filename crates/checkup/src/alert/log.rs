use std::collections::HashMap;

use async_trait::async_trait;
use tracing::warn;

use super::{alert_message, AlertTarget, Alerter};
use crate::metrics::Metric;

/// Logs state changes instead of notifying anyone
#[derive(Debug, Clone, Copy, Default)]
pub struct LogAlerter;

impl LogAlerter {
    pub const NAME: &'static str = "log";
}

#[async_trait]
impl Alerter for LogAlerter {
    async fn alert(
        &self,
        metrics: &[Metric],
        _targets: &HashMap<String, AlertTarget>,
    ) -> anyhow::Result<()> {
        for metric in metrics {
            warn!(check_id = %metric.check_id, successful = metric.successful, "{}", alert_message(metric));
        }
        Ok(())
    }
}
