//! HTTP checker.
//!
//! | Component | Type | Value |
//! |---|---|---|
//! | input | `HTTP` | `""`, `GET`, `POST`, `PUT`, `PATCH`, `DELETE` |
//! | output | `TIMEOUT` | not validated, success is not timing out |
//! | output | `STATUSCODE` | status code between 100 and 599 |
//! | output | `BODY` | exact response body |
//! | output | `HEADER` | `K=V`, header `K` has value `V` |
//! | target | `URL` | http(s) URL |
//! | payload | `HEADER` | `K=V` request header, valid header name and value |
//! | payload | `PARAMETER` | `K=V` where `V` is JSON, sent as query for GET, as body otherwise |

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{
    components::{
        self as c, parse_header, parse_key_value, parse_status_code, parse_url, validate_input,
        validate_timing, Header,
    },
    not_provisioned, Check, CheckResult, Checker, Component,
};
use crate::probe::http::HttpProber;

pub const NAME: &str = "HTTP";

const METHODS: &[&str] = &["", "GET", "POST", "PUT", "PATCH", "DELETE"];

/// What a response has to look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expectation {
    Timeout,
    StatusCode(u16),
    Body(String),
    Header(String, String),
}

impl Expectation {
    pub(crate) fn parse(output: &Component) -> Result<Self> {
        Ok(match output.kind.as_str() {
            c::TIMEOUT => Self::Timeout,
            c::STATUS_CODE => Self::StatusCode(parse_status_code(&output.value)?),
            c::BODY => Self::Body(output.value.clone()),
            c::HEADER => {
                let (name, value) = parse_header(&output.value)?;
                let value = value.to_str().context("header value should be visible ASCII")?;
                Self::Header(name.to_string(), value.to_string())
            }
            _ => return Err(c::unsupported(output)),
        })
    }

    pub(crate) fn judge(
        &self,
        status_code: u16,
        body: &str,
        header: impl Fn(&str) -> Option<String>,
    ) -> Result<(), String> {
        match self {
            Self::Timeout => Ok(()),
            Self::StatusCode(expected) if status_code == *expected => Ok(()),
            Self::StatusCode(expected) => {
                Err(format!("status code {status_code}, expected {expected}"))
            }
            Self::Body(expected) if body == expected => Ok(()),
            Self::Body(_) => Err("body does not match".to_string()),
            Self::Header(key, expected) => match header(key) {
                Some(value) if value == *expected => Ok(()),
                Some(value) => Err(format!("header {key} is {value:?}, expected {expected:?}")),
                None => Err(format!("header {key} missing")),
            },
        }
    }
}

#[derive(Debug, Default)]
pub struct HttpChecker {
    prober: Option<HttpProber>,
    expectation: Option<Expectation>,
}

#[async_trait]
impl Checker for HttpChecker {
    fn validate(&self, check: &Check) -> Result<()> {
        validate_timing(check)?;
        validate_input(&check.input, NAME, METHODS)?;
        Expectation::parse(&check.output).context("output")?;
        target_url(&check.target).context("target")?;
        split_payloads(&check.payloads)?;
        Ok(())
    }

    fn provision(&mut self, check: &Check) -> Result<()> {
        let method = match check.input.value.as_str() {
            "" => Method::GET,
            method => Method::from_bytes(method.as_bytes()).context("invalid method")?,
        };
        let (headers, params) = split_payloads(&check.payloads)?;

        self.prober = Some(HttpProber::new(
            method,
            target_url(&check.target)?,
            headers,
            params,
            check.timeout,
        )?);
        self.expectation = Some(Expectation::parse(&check.output)?);
        Ok(())
    }

    async fn execute(&self, token: CancellationToken) -> Result<CheckResult> {
        let (Some(prober), Some(expectation)) = (&self.prober, &self.expectation) else {
            return Err(not_provisioned(NAME));
        };

        let probe = prober.probe(&token).await?;
        Ok(CheckResult::from_probe(&probe, |response| {
            expectation.judge(response.status_code, &response.body, |key| {
                response.headers.get(key).and_then(|value| value.to_str().ok()).map(str::to_string)
            })
        }))
    }
}

fn target_url(target: &Component) -> Result<url::Url> {
    if target.kind != c::URL {
        return Err(c::unsupported(target));
    }
    parse_url(&target.value, &["http", "https"])
}

type Headers = Vec<Header>;
type Params = Vec<(String, Value)>;

fn split_payloads(payloads: &[Component]) -> Result<(Headers, Params)> {
    let mut headers = Vec::new();
    let mut params = Vec::new();
    for (index, payload) in payloads.iter().enumerate() {
        add_payload(payload, &mut headers, &mut params)
            .with_context(|| format!("payload {index}"))?;
    }
    Ok((headers, params))
}

fn add_payload(payload: &Component, headers: &mut Headers, params: &mut Params) -> Result<()> {
    match payload.kind.as_str() {
        c::HEADER => headers.push(parse_header(&payload.value)?),
        c::PARAMETER => {
            let (key, value) = parse_key_value(&payload.value)?;
            let value: Value = serde_json::from_str(&value)
                .with_context(|| format!("parameter {key} is not valid JSON"))?;
            if value.is_array() || value.is_object() {
                anyhow::bail!("parameter {key} should be a string, bool, number or null");
            }
            params.push((key, value));
        }
        _ => return Err(c::unsupported(payload)),
    }
    Ok(())
}
