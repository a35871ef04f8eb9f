//! Chat webhooks (Discord and Slack).

use std::{collections::HashMap, time::Duration};

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{alert_message, AlertTarget, Alerter};
use crate::metrics::Metric;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookKind {
    Discord,
    Slack,
}

impl WebhookKind {
    pub fn name(self) -> &'static str {
        match self {
            Self::Discord => "discord",
            Self::Slack => "slack",
        }
    }

    fn payload(self, message: String) -> Value {
        match self {
            Self::Discord => json!({ "content": message }),
            Self::Slack => json!({ "text": message }),
        }
    }
}

/// Posts one JSON message per state change to the check's webhook URL
#[derive(Debug, Clone)]
pub struct WebhookAlerter {
    kind: WebhookKind,
    client: Client,
}

impl WebhookAlerter {
    pub fn new(kind: WebhookKind) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("cannot build webhook client")?;
        Ok(Self { kind, client })
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn alert(
        &self,
        metrics: &[Metric],
        targets: &HashMap<String, AlertTarget>,
    ) -> anyhow::Result<()> {
        let mut failed = 0;
        for metric in metrics {
            let Some(target) = targets.get(&metric.check_id) else {
                debug!(check_id = %metric.check_id, service = self.kind.name(), "no alert target");
                continue;
            };

            let payload = self.kind.payload(alert_message(metric));
            let sent = self
                .client
                .post(&target.target)
                .json(&payload)
                .send()
                .await
                .and_then(|response| response.error_for_status());
            if let Err(err) = sent {
                warn!(check_id = %metric.check_id, service = self.kind.name(), "webhook failed: {err}");
                failed += 1;
            }
        }

        if failed > 0 {
            anyhow::bail!("{failed} {} alert(s) could not be delivered", self.kind.name());
        }
        Ok(())
    }
}
