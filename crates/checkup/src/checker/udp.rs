//! UDP checker.
//!
//! Like the TCP checker, except that each `MESSAGE` payload is one datagram
//! and at least one payload is required.

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    components::{match_messages, message_payloads},
    not_provisioned,
    tcp::{expected_replies, validate_stream_check},
    Check, CheckResult, Checker,
};
use crate::probe::udp::UdpProber;

pub const NAME: &str = "UDP";

#[derive(Debug, Default)]
pub struct UdpChecker {
    prober: Option<UdpProber>,
    expected: Option<Vec<String>>,
}

#[async_trait]
impl Checker for UdpChecker {
    fn validate(&self, check: &Check) -> Result<()> {
        validate_stream_check(check, NAME, true)
    }

    fn provision(&mut self, check: &Check) -> Result<()> {
        let messages = message_payloads(&check.payloads)?;
        self.expected = expected_replies(&check.output, messages.len())?;
        self.prober = Some(UdpProber::new(check.target.value.clone(), messages, check.timeout));
        Ok(())
    }

    async fn execute(&self, token: CancellationToken) -> Result<CheckResult> {
        let Some(prober) = &self.prober else {
            return Err(not_provisioned(NAME));
        };

        let probe = prober.probe(&token).await?;
        Ok(CheckResult::from_probe(&probe, |response| match &self.expected {
            Some(expected) => match_messages(expected, &response.messages),
            None => Ok(()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::UdpSocket;

    use super::*;
    use crate::checker::{components as c, Component};

    fn check(target: &str, output: Component, payloads: &[&str]) -> Check {
        Check {
            id: "udp-1".into(),
            name: "dns-ish".into(),
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(2),
            input: Component::new(NAME, ""),
            output,
            target: Component::new(c::ADDRESS, target),
            payloads: payloads.iter().map(|p| Component::new(c::MESSAGE, *p)).collect(),
            alerts: vec![],
        }
    }

    #[test]
    fn payloads_are_required() {
        let check = check("127.0.0.1:9", Component::new(c::TIMEOUT, ""), &[]);
        let err = UdpChecker::default().validate(&check).unwrap_err();
        assert_eq!(err.to_string(), "payload: at least one message is required");
    }

    #[test]
    fn empty_messages_are_rejected() {
        let check = check("127.0.0.1:9", Component::new(c::TIMEOUT, ""), &["hello", ""]);
        let err = UdpChecker::default().validate(&check).unwrap_err();
        assert_eq!(err.to_string(), "payload 1: message should not be empty");
    }

    #[tokio::test]
    async fn echoed_datagrams_succeed() {
        let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let address = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            loop {
                let (read, peer) = server.recv_from(&mut buf).await.unwrap();
                server.send_to(&buf[..read], peer).await.unwrap();
            }
        });

        let check = check(&address, Component::new(c::MESSAGE, "one\n---\ntwo"), &["one", "two"]);
        let mut checker = UdpChecker::default();
        checker.validate(&check).unwrap();
        checker.provision(&check).unwrap();

        let result = checker.execute(CancellationToken::new()).await.unwrap();
        assert!(result.successful, "{result:?}");
    }
}
