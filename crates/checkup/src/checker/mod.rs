//! Check execution framework.
//!
//! A [`Checker`] validates a [`Check`], provisions the prober it needs and
//! then runs one probe per call to [`Checker::execute`]. Checkers are looked
//! up by the check's input type in a [`CheckerRegistry`], which is built once
//! by the process entry point and passed to whoever creates controllers.

mod check;
pub mod components;
mod error;

pub mod dns;
pub mod http;
pub mod icmp;
pub mod tcp;
pub mod udp;
pub mod ws;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{
    controller::{runner, ControllerOpts},
    probe::{Outcome, ProbeResult},
    registry::{Registry, RegistryError},
};

pub use check::{Check, Component};
pub use error::CheckerError;

/// Result of one executed check.
///
/// An unsuccessful result means the target did not behave as expected. Errors
/// on the agent's side are reported by [`Checker::execute`] returning `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub successful: bool,
    pub timeout: bool,
    pub start_time: DateTime<Utc>,
    #[serde(with = "crate::duration")]
    pub duration: Duration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CheckResult {
    pub fn success(start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self { successful: true, timeout: false, start_time, duration, reason: None }
    }

    pub fn failure(start_time: DateTime<Utc>, duration: Duration, reason: impl Into<String>) -> Self {
        Self { successful: false, timeout: false, start_time, duration, reason: Some(reason.into()) }
    }

    pub fn timed_out(start_time: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            successful: false,
            timeout: true,
            start_time,
            duration,
            reason: Some("timed out".to_string()),
        }
    }

    /// Judge a probe result, `verdict` only sees complete responses
    pub fn from_probe<T>(
        probe: &ProbeResult<T>,
        verdict: impl FnOnce(&T) -> Result<(), String>,
    ) -> Self {
        match &probe.outcome {
            Outcome::Response(response) => match verdict(response) {
                Ok(()) => Self::success(probe.start_time, probe.duration),
                Err(reason) => Self::failure(probe.start_time, probe.duration, reason),
            },
            Outcome::Timeout => Self::timed_out(probe.start_time, probe.duration),
            Outcome::Failed(reason) => Self::failure(probe.start_time, probe.duration, reason),
        }
    }
}

/// Protocol specific check logic
#[async_trait]
pub trait Checker: Send + Sync {
    /// Inspect the check without changing the checker
    fn validate(&self, check: &Check) -> anyhow::Result<()>;

    /// Store everything `execute` needs, called once after `validate`
    fn provision(&mut self, check: &Check) -> anyhow::Result<()>;

    /// Run one probe
    async fn execute(&self, token: CancellationToken) -> anyhow::Result<CheckResult>;
}

/// Builds a fresh, unprovisioned checker
pub type CheckerFactory = Arc<dyn Fn() -> Box<dyn Checker> + Send + Sync>;

pub type CheckerRegistry = Registry<CheckerFactory>;

impl Registry<CheckerFactory> {
    pub fn checkers() -> Self {
        Registry::new("checker")
    }

    /// Registry with every protocol this crate ships
    pub fn builtin() -> Result<Self, RegistryError> {
        let mut registry = Self::checkers();
        for (name, entry) in [
            (dns::NAME, factory(dns::DnsChecker::default)),
            (http::NAME, factory(http::HttpChecker::default)),
            (icmp::NAME, factory(icmp::IcmpChecker::default)),
            (tcp::NAME, factory(tcp::TcpChecker::default)),
            (udp::NAME, factory(udp::UdpChecker::default)),
            (ws::NAME, factory(ws::WsChecker::default)),
        ] {
            registry.register(name, entry)?;
        }
        Ok(registry)
    }

    pub fn register_checker<C, F>(&mut self, name: &str, new: F) -> Result<(), RegistryError>
    where
        C: Checker + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.register(name, factory(new))
    }

    fn instance(&self, check: &Check) -> Result<(String, Box<dyn Checker>), CheckerError> {
        let name = check.input.kind.as_str();
        let factory = self.get(name).ok_or_else(|| CheckerError::Unknown(name.to_string()))?;
        Ok((name.to_string(), factory()))
    }
}

fn factory<C, F>(new: F) -> CheckerFactory
where
    C: Checker + 'static,
    F: Fn() -> C + Send + Sync + 'static,
{
    Arc::new(move || Box::new(new()) as Box<dyn Checker>)
}

/// Validate a check against its checker without provisioning it
pub fn validate(registry: &CheckerRegistry, check: &Check) -> Result<(), CheckerError> {
    let (checker, instance) = registry.instance(check)?;
    instance.validate(check).map_err(|source| CheckerError::Validation { checker, source })
}

/// Validate and provision a checker for `check` and wrap it into controller
/// options carrying the check's id, name and interval
pub fn new_controller_opts(
    registry: &CheckerRegistry,
    check: &Check,
) -> Result<ControllerOpts, CheckerError> {
    let (checker, mut instance) = registry.instance(check)?;

    if check.interval.is_zero() {
        return Err(CheckerError::Validation {
            checker,
            source: anyhow::anyhow!("interval should be > 0"),
        });
    }
    if let Err(source) = instance.validate(check) {
        return Err(CheckerError::Validation { checker, source });
    }
    if let Err(source) = instance.provision(check) {
        return Err(CheckerError::Provisioning { checker, source });
    }
    debug!(check_id = %check.id, checker = %checker, "provisioned checker");

    let instance: Arc<dyn Checker> = Arc::from(instance);
    let func = runner(move |token| {
        let instance = Arc::clone(&instance);
        async move { instance.execute(token).await }
    });

    Ok(ControllerOpts::new(check.id.clone(), check.name.clone(), check.interval, func))
}

/// Error returned by `execute` on a checker that was never provisioned
pub(crate) fn not_provisioned(name: &str) -> anyhow::Error {
    anyhow::anyhow!("{name} checker executed before provisioning")
}
