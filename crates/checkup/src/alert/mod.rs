//! Alerting on check state changes.
//!
//! The agent keeps an [`AlertState`] and passes every exported batch through
//! it, so alerters only ever see checks that went down or came back up.

mod log;
mod webhook;

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{metrics::Metric, registry::Registry, RegistryError};

pub use self::log::LogAlerter;
pub use webhook::{WebhookAlerter, WebhookKind};

/// Where one check's alerts go on a given service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTarget {
    pub service: String,
    /// Service specific destination, a webhook URL for discord and slack
    #[serde(default)]
    pub target: String,
}

/// Credentials of one alerting service
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertProvider {
    pub service: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    pub secret: String,
}

impl fmt::Debug for AlertProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertProvider")
            .field("service", &self.service)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait Alerter: Send + Sync {
    /// Send one alert per metric, `targets` is keyed by check id
    async fn alert(
        &self,
        metrics: &[Metric],
        targets: &HashMap<String, AlertTarget>,
    ) -> anyhow::Result<()>;
}

pub type AlerterFactory =
    Arc<dyn Fn(&AlertProvider) -> anyhow::Result<Arc<dyn Alerter>> + Send + Sync>;

pub type AlerterRegistry = Registry<AlerterFactory>;

impl Registry<AlerterFactory> {
    pub fn alerters() -> Self {
        Registry::new("alerter")
    }

    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::alerters();
        registry.register(
            LogAlerter::NAME,
            Arc::new(|_: &AlertProvider| Ok(Arc::new(LogAlerter) as Arc<dyn Alerter>))
                as AlerterFactory,
        )?;
        for kind in [WebhookKind::Discord, WebhookKind::Slack] {
            registry.register(
                kind.name(),
                Arc::new(move |_: &AlertProvider| {
                    Ok(Arc::new(WebhookAlerter::new(kind)?) as Arc<dyn Alerter>)
                }) as AlerterFactory,
            )?;
        }
        Ok(registry)
    }

    /// Build the alerter for `provider.service`
    pub fn initialize(&self, provider: &AlertProvider) -> anyhow::Result<Arc<dyn Alerter>> {
        let factory = self
            .get(&provider.service)
            .ok_or_else(|| anyhow::anyhow!("alert service not registered: {}", provider.service))?;
        factory(provider)
    }
}

/// Text sent for a state change
pub fn alert_message(metric: &Metric) -> String {
    let name = if metric.check_name.is_empty() { &metric.check_id } else { &metric.check_name };
    if metric.successful {
        format!("{name} is back up")
    } else if metric.timeout {
        format!("{name}: timeout")
    } else {
        format!("{name} is down")
    }
}

/// Last known success state of every check
#[derive(Debug, Default)]
pub struct AlertState {
    last: HashMap<String, bool>,
}

impl AlertState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Newest metric of every check whose state changed since the previous
    /// call. A check seen for the first time only counts when failing.
    pub fn changed(&mut self, metrics: &[Metric]) -> Vec<Metric> {
        let mut newest: HashMap<&str, &Metric> = HashMap::new();
        for metric in metrics {
            let entry = newest.entry(metric.check_id.as_str()).or_insert(metric);
            if metric.start_time > entry.start_time {
                *entry = metric;
            }
        }

        let mut changed: Vec<Metric> = newest
            .into_values()
            .filter(|metric| {
                let previous = self.last.insert(metric.check_id.clone(), metric.successful);
                match previous {
                    Some(previous) => previous != metric.successful,
                    None => !metric.successful,
                }
            })
            .cloned()
            .collect();
        changed.sort_by(|a, b| a.check_id.cmp(&b.check_id));
        changed
    }

    /// Drop the state of a removed check
    pub fn forget(&mut self, check_id: &str) {
        self.last.remove(check_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;

    use super::*;

    fn metric(id: &str, successful: bool, seconds_ago: i64) -> Metric {
        Metric {
            check_id: id.into(),
            check_name: format!("{id}-name"),
            successful,
            timeout: false,
            start_time: Utc::now() - chrono::Duration::seconds(seconds_ago),
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn messages() {
        let mut down = metric("api", false, 0);
        assert_eq!(alert_message(&down), "api-name is down");
        down.timeout = true;
        assert_eq!(alert_message(&down), "api-name: timeout");
        assert_eq!(alert_message(&metric("api", true, 0)), "api-name is back up");
    }

    #[test]
    fn first_sight_alerts_only_failures() {
        let mut state = AlertState::new();
        let changed = state.changed(&[metric("up", true, 0), metric("down", false, 0)]);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].check_id, "down");
    }

    #[test]
    fn only_transitions_are_reported() {
        let mut state = AlertState::new();
        state.changed(&[metric("api", true, 0)]);

        assert!(state.changed(&[metric("api", true, 0)]).is_empty());

        let down = state.changed(&[metric("api", false, 0)]);
        assert_eq!(down.len(), 1);
        assert!(state.changed(&[metric("api", false, 0)]).is_empty());

        let up = state.changed(&[metric("api", true, 0)]);
        assert!(up[0].successful);
    }

    #[test]
    fn newest_metric_decides() {
        let mut state = AlertState::new();
        state.changed(&[metric("api", true, 0)]);

        // failed a minute ago, recovered since
        let changed = state.changed(&[metric("api", true, 1), metric("api", false, 60)]);
        assert!(changed.is_empty());
    }

    #[test]
    fn forgotten_checks_start_over() {
        let mut state = AlertState::new();
        state.changed(&[metric("api", false, 0)]);
        state.forget("api");
        assert_eq!(state.changed(&[metric("api", false, 0)]).len(), 1);
    }

    #[test]
    fn builtin_services() {
        let registry = AlerterRegistry::builtin().unwrap();
        assert_eq!(registry.names(), vec!["discord", "log", "slack"]);

        let unknown = AlertProvider { service: "pager".into(), ..Default::default() };
        assert!(registry.initialize(&unknown).is_err());
    }
}
