//! WebSocket checker.
//!
//! Outputs are those of the HTTP checker, applied to the handshake response,
//! plus `MESSAGE` for the replies to the `MESSAGE` payloads. `HEADER`
//! payloads are sent with the handshake request.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{
    components::{
        self as c, expected_messages, match_messages, parse_header, parse_url, validate_input,
        validate_timing, Header, ECHO_INPUTS,
    },
    http::Expectation,
    not_provisioned, Check, CheckResult, Checker, Component,
};
use crate::probe::ws::WsProber;

pub const NAME: &str = "WS";

#[derive(Debug, Clone, PartialEq, Eq)]
enum WsExpectation {
    Handshake(Expectation),
    Messages(Vec<String>),
}

#[derive(Debug, Default)]
pub struct WsChecker {
    prober: Option<WsProber>,
    expectation: Option<WsExpectation>,
}

struct Parsed {
    url: Url,
    headers: Vec<Header>,
    messages: Vec<String>,
    expectation: WsExpectation,
}

fn parse(check: &Check) -> Result<Parsed> {
    validate_timing(check)?;
    validate_input(&check.input, NAME, ECHO_INPUTS)?;

    let mut headers = Vec::new();
    let mut messages = Vec::new();
    for (index, payload) in check.payloads.iter().enumerate() {
        match payload.kind.as_str() {
            c::MESSAGE if payload.value.is_empty() => {
                anyhow::bail!("payload {index}: message should not be empty")
            }
            c::MESSAGE => messages.push(payload.value.clone()),
            c::HEADER => headers.push(
                parse_header(&payload.value).with_context(|| format!("payload {index}"))?,
            ),
            _ => return Err(c::unsupported(payload)).with_context(|| format!("payload {index}")),
        }
    }

    let expectation = expectation(&check.output, messages.len()).context("output")?;
    let url = target_url(&check.target).context("target")?;
    Ok(Parsed { url, headers, messages, expectation })
}

fn expectation(output: &Component, messages: usize) -> Result<WsExpectation> {
    if output.kind == c::MESSAGE {
        return expected_messages(output, messages).map(WsExpectation::Messages);
    }
    Expectation::parse(output).map(WsExpectation::Handshake)
}

fn target_url(target: &Component) -> Result<Url> {
    if target.kind != c::URL {
        return Err(c::unsupported(target));
    }
    parse_url(&target.value, &["ws", "wss"])
}

#[async_trait]
impl Checker for WsChecker {
    fn validate(&self, check: &Check) -> Result<()> {
        parse(check).map(|_| ())
    }

    fn provision(&mut self, check: &Check) -> Result<()> {
        let Parsed { url, headers, messages, expectation } = parse(check)?;
        self.prober = Some(WsProber::new(url, headers, messages, check.timeout));
        self.expectation = Some(expectation);
        Ok(())
    }

    async fn execute(&self, token: CancellationToken) -> Result<CheckResult> {
        let (Some(prober), Some(expectation)) = (&self.prober, &self.expectation) else {
            return Err(not_provisioned(NAME));
        };

        let probe = prober.probe(&token).await?;
        Ok(CheckResult::from_probe(&probe, |response| match expectation {
            WsExpectation::Handshake(expected) => {
                expected.judge(response.status_code, &response.body, |key| {
                    response.headers.get(key).and_then(|value| value.to_str().ok()).map(str::to_string)
                })
            }
            WsExpectation::Messages(_) if response.status_code != 101 => {
                Err(format!("handshake rejected with status code {}", response.status_code))
            }
            WsExpectation::Messages(expected) => match_messages(expected, &response.messages),
        }))
    }
}
