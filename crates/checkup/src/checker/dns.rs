//! DNS checker.
//!
//! Resolves a host name. A `TIMEOUT` output succeeds when at least one
//! address comes back, an `ADDRESS` (or `IP`) output when the given address
//! is among them.

use std::{fmt, net::IpAddr, sync::Arc};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    components::{self as c, is_dns_name, validate_input, validate_timing, ECHO_INPUTS},
    not_provisioned, Check, CheckResult, Checker, Component,
};
use crate::probe::dns::{DnsProber, Resolve, SystemResolver};

pub const NAME: &str = "DNS";

const TARGETS: &[&str] = &[c::HOST, c::HOSTNAME, c::DNS_NAME];

pub struct DnsChecker {
    resolver: Arc<dyn Resolve>,
    prober: Option<DnsProber>,
    /// Address that has to be resolved, any address will do when `None`
    expected: Option<IpAddr>,
}

impl DnsChecker {
    /// Checker resolving through `resolver` instead of the system resolver
    pub fn with_resolver(resolver: Arc<dyn Resolve>) -> Self {
        Self { resolver, prober: None, expected: None }
    }
}

impl Default for DnsChecker {
    fn default() -> Self {
        Self::with_resolver(Arc::new(SystemResolver))
    }
}

impl fmt::Debug for DnsChecker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsChecker")
            .field("prober", &self.prober)
            .field("expected", &self.expected)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Checker for DnsChecker {
    fn validate(&self, check: &Check) -> Result<()> {
        validate_timing(check)?;
        validate_input(&check.input, NAME, ECHO_INPUTS)?;
        expected_address(&check.output).context("output")?;

        if !TARGETS.contains(&check.target.kind.as_str()) {
            return Err(c::unsupported(&check.target)).context("target");
        }
        if !is_dns_name(&check.target.value) {
            anyhow::bail!("target: value is not a valid DNS name: {}", check.target.value);
        }
        Ok(())
    }

    fn provision(&mut self, check: &Check) -> Result<()> {
        self.expected = expected_address(&check.output)?;
        self.prober = Some(DnsProber::new(
            check.target.value.clone(),
            Arc::clone(&self.resolver),
            check.timeout,
        ));
        Ok(())
    }

    async fn execute(&self, token: CancellationToken) -> Result<CheckResult> {
        let Some(prober) = &self.prober else {
            return Err(not_provisioned(NAME));
        };

        let probe = prober.probe(&token).await?;
        Ok(CheckResult::from_probe(&probe, |response| match self.expected {
            None if response.addresses.is_empty() => Err("no address resolved".to_string()),
            None => Ok(()),
            Some(expected) if response.addresses.contains(&expected) => Ok(()),
            Some(expected) => Err(format!("{expected} not among the resolved addresses")),
        }))
    }
}

fn expected_address(output: &Component) -> Result<Option<IpAddr>> {
    match output.kind.as_str() {
        c::TIMEOUT => Ok(None),
        c::ADDRESS | c::IP => output
            .value
            .trim()
            .parse()
            .map(Some)
            .with_context(|| format!("value is not a valid IP: {}", output.value)),
        _ => Err(c::unsupported(output)),
    }
}
