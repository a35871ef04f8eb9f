//! TCP checker.
//!
//! Connects to `HOST:PORT`, sends every `MESSAGE` payload in order and reads
//! one reply after each. A `MESSAGE` output lists the expected replies joined
//! by `"\n---\n"`. Without payloads only the connection is checked.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::{
    components::{
        self as c, expected_messages, match_messages, message_payloads, validate_host_port,
        validate_input, validate_timing, ECHO_INPUTS,
    },
    not_provisioned, Check, CheckResult, Checker, Component,
};
use crate::probe::tcp::TcpProber;

pub const NAME: &str = "TCP";

#[derive(Debug, Default)]
pub struct TcpChecker {
    prober: Option<TcpProber>,
    /// Expected replies, `None` when only timing out counts
    expected: Option<Vec<String>>,
}

#[async_trait]
impl Checker for TcpChecker {
    fn validate(&self, check: &Check) -> Result<()> {
        validate_stream_check(check, NAME, false)
    }

    fn provision(&mut self, check: &Check) -> Result<()> {
        let messages = message_payloads(&check.payloads)?;
        self.expected = expected_replies(&check.output, messages.len())?;
        self.prober = Some(TcpProber::new(check.target.value.clone(), messages, check.timeout));
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

/// Shared by the TCP and UDP checkers, which differ only in whether
/// payloads are mandatory
pub(crate) fn validate_stream_check(check: &Check, name: &str, needs_payload: bool) -> Result<()> {
    validate_timing(check)?;
    validate_input(&check.input, name, ECHO_INPUTS)?;

    let messages = message_payloads(&check.payloads)?;
    if needs_payload && messages.is_empty() {
        anyhow::bail!("payload: at least one message is required");
    }
    expected_replies(&check.output, messages.len()).context("output")?;

    if check.target.kind != c::ADDRESS {
        return Err(c::unsupported(&check.target)).context("target");
    }
    validate_host_port(&check.target.value).context("target")
}

pub(crate) fn expected_replies(output: &Component, payloads: usize) -> Result<Option<Vec<String>>> {
    match output.kind.as_str() {
        c::TIMEOUT => Ok(None),
        c::MESSAGE => expected_messages(output, payloads).map(Some),
        _ => Err(c::unsupported(output)),
    }
}
