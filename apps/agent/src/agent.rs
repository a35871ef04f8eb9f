use std::{collections::HashMap, sync::Arc, time::Duration};

use checkup::{
    alert::{AlertState, AlertTarget, Alerter, AlerterRegistry},
    metrics::{self, Exporter, ExporterRegistry, Metric},
    new_controller_opts, Check, CheckerRegistry, Manager,
};
use tokio::{
    sync::{Mutex, RwLock},
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, instrument, warn};

use crate::{config::Config, error::AgentError};

/// Alert targets of one service keyed by check id
type Targets = HashMap<String, AlertTarget>;

/// The checks of one agent and everything their results flow into
pub struct Agent {
    manager: Manager,
    checkers: CheckerRegistry,
    exporter: Arc<dyn Exporter>,
    alerters: HashMap<String, Arc<dyn Alerter>>,
    targets: RwLock<HashMap<String, Targets>>,
    state: Mutex<AlertState>,
    interval: Duration,
    history_limit: usize,
}

impl Agent {
    /// Build the agent from its configuration, without scheduling any check
    pub fn new(config: &Config) -> Result<Self, AgentError> {
        if config.interval.is_zero() {
            return Err(AgentError::InvalidConfig("interval should be > 0"));
        }
        if config.history_limit == 0 {
            return Err(AgentError::InvalidConfig("history_limit should be > 0"));
        }

        let exporter = ExporterRegistry::builtin()?
            .initialize(&config.metrics)
            .map_err(AgentError::Exporter)?;

        let registry = AlerterRegistry::builtin()?;
        let mut alerters = HashMap::new();
        let mut targets = HashMap::new();
        for provider in &config.alerts {
            if alerters.contains_key(&provider.service) {
                return Err(AgentError::DuplicateAlertService(provider.service.clone()));
            }
            let alerter = registry.initialize(provider).map_err(|source| AgentError::Alerter {
                service: provider.service.clone(),
                source,
            })?;
            alerters.insert(provider.service.clone(), alerter);
            targets.insert(provider.service.clone(), Targets::new());
        }

        info!(
            backend = %config.metrics.backend,
            alerters = alerters.len(),
            "agent initialized"
        );

        Ok(Self {
            manager: Manager::new(),
            checkers: CheckerRegistry::builtin()?,
            exporter,
            alerters,
            targets: RwLock::new(targets),
            state: Mutex::new(AlertState::new()),
            interval: config.interval,
            history_limit: config.history_limit,
        })
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn exporter(&self) -> &Arc<dyn Exporter> {
        &self.exporter
    }

    /// Add every configured check, the first failure aborts with its index
    pub async fn add_config_checks(&self, checks: &[Check]) -> Result<(), AgentError> {
        for (index, check) in checks.iter().enumerate() {
            self.add_check(check)
                .await
                .map_err(|source| AgentError::ConfigCheck { index, source: Box::new(source) })?;
        }
        Ok(())
    }

    /// Schedule `check`, replacing a check with the same id.
    ///
    /// Nothing changes unless the check is fully provisioned and installed.
    #[instrument(skip_all, fields(check_id = %check.id))]
    pub async fn add_check(&self, check: &Check) -> Result<(), AgentError> {
        for alert in &check.alerts {
            if !self.alerters.contains_key(&alert.service) {
                return Err(AgentError::UnknownAlertService(alert.service.clone()));
            }
        }

        let opts = new_controller_opts(&self.checkers, check)?.with_history_limit(self.history_limit);
        self.manager.update_controller(opts).await?;

        let mut targets = self.targets.write().await;
        for service_targets in targets.values_mut() {
            service_targets.remove(&check.id);
        }
        for alert in &check.alerts {
            if let Some(service_targets) = targets.get_mut(&alert.service) {
                service_targets.insert(check.id.clone(), alert.clone());
            }
        }

        info!(name = %check.display_name(), "check scheduled");
        Ok(())
    }

    /// Stop and forget a check, `false` when it was not scheduled
    pub async fn remove_check(&self, id: &str) -> bool {
        let removed = self.manager.remove_controller_and_wait(id).await;

        for service_targets in self.targets.write().await.values_mut() {
            service_targets.remove(id);
        }
        self.state.lock().await.forget(id);
        self.exporter.forget(id).await;

        if removed {
            info!(check_id = %id, "check removed");
        }
        removed
    }

    /// Export and alert every `interval` until the manager is closed
    pub async fn run(&self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = self.manager.wait() => break,
                _ = ticker.tick() => self.flush().await,
            }
        }
        debug!("export loop stopped");
    }

    /// Drain the manager once, export the metrics and alert on state changes
    pub async fn flush(&self) {
        let metrics = metrics::from_stats(&self.manager.pull_all_stats().await);
        self.publish(&metrics).await;
    }

    async fn publish(&self, metrics: &[Metric]) {
        if metrics.is_empty() {
            return;
        }

        if let Err(err) = self.exporter.export(metrics).await {
            warn!(count = metrics.len(), "metrics export failed: {err:#}");
        }

        let changed = self.state.lock().await.changed(metrics);
        if !changed.is_empty() {
            self.alert(&changed).await;
        }
    }

    async fn alert(&self, changed: &[Metric]) {
        let targets = self.targets.read().await;
        for (service, alerter) in &self.alerters {
            let Some(service_targets) = targets.get(service) else {
                continue;
            };
            let routed: Vec<Metric> = changed
                .iter()
                .filter(|metric| service_targets.contains_key(&metric.check_id))
                .cloned()
                .collect();
            if routed.is_empty() {
                continue;
            }

            if let Err(err) = alerter.alert(&routed, service_targets).await {
                warn!(%service, "alerting failed: {err:#}");
            }
        }
    }

    /// Flush what is left, stop every check, then publish the runs that
    /// finished while the checks were stopping
    pub async fn stop(&self, timeout: Duration) {
        self.flush().await;
        match self.manager.drain(timeout).await {
            Ok(stats) => self.publish(&metrics::from_stats(&stats)).await,
            Err(err) => {
                warn!("{err}, closing the manager");
                self.manager.close().await;
            }
        }
    }
}
