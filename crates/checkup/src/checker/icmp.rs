//! ICMP checker: one echo request, successful when a reply arrives in time.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    components::{self as c, is_address, validate_input, validate_timing, ECHO_INPUTS},
    not_provisioned, Check, CheckResult, Checker,
};
use crate::probe::icmp::IcmpProber;

pub const NAME: &str = "ICMP";

#[derive(Debug, Default)]
pub struct IcmpChecker {
    prober: Option<IcmpProber>,
}

#[async_trait]
impl Checker for IcmpChecker {
    fn validate(&self, check: &Check) -> Result<()> {
        validate_timing(check)?;
        validate_input(&check.input, NAME, ECHO_INPUTS)?;

        if check.output.kind != c::TIMEOUT {
            return Err(c::unsupported(&check.output)).context("output");
        }
        if check.target.kind != c::ADDRESS {
            return Err(c::unsupported(&check.target)).context("target");
        }
        if !is_address(&check.target.value) {
            anyhow::bail!("target: value is not a valid address: {}", check.target.value);
        }
        Ok(())
    }

    fn provision(&mut self, check: &Check) -> Result<()> {
        self.prober = Some(IcmpProber::new(check.target.value.clone(), check.timeout));
        Ok(())
    }

    async fn execute(&self, token: CancellationToken) -> Result<CheckResult> {
        let Some(prober) = &self.prober else {
            return Err(not_provisioned(NAME));
        };

        let probe = prober.probe(&token).await?;
        Ok(CheckResult::from_probe(&probe, |_| Ok(())))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::checker::Component;

    fn check(target: &str, output: &str) -> Check {
        Check {
            id: "icmp-1".into(),
            name: "gateway".into(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(1),
            input: Component::new(NAME, "PING"),
            output: Component::new(output, ""),
            target: Component::new(c::ADDRESS, target),
            payloads: vec![],
            alerts: vec![],
        }
    }

    #[test]
    fn accepts_ips_and_host_names() {
        let checker = IcmpChecker::default();
        assert!(checker.validate(&check("192.168.1.1", c::TIMEOUT)).is_ok());
        assert!(checker.validate(&check("fe80::1", c::TIMEOUT)).is_ok());
        assert!(checker.validate(&check("router.lan", c::TIMEOUT)).is_ok());
    }

    #[test]
    fn only_timeout_output_is_supported() {
        let err = IcmpChecker::default().validate(&check("10.0.0.1", c::MESSAGE)).unwrap_err();
        assert_eq!(format!("{err:#}"), "output: invalid component type: MESSAGE");
    }

    #[test]
    fn rejects_malformed_addresses() {
        let err = IcmpChecker::default().validate(&check("not an address", c::TIMEOUT)).unwrap_err();
        assert_eq!(err.to_string(), "target: value is not a valid address: not an address");
    }
}
