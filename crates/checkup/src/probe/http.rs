//! HTTP(S) prober.

use std::{error::Error as _, time::Duration};

use anyhow::{Context, Result};
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Client, Method, RequestBuilder,
};
use serde_json::Value;
use tokio::time::timeout_at;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{Clock, ProbeResult};
use crate::checker::components::Header;

/// Response of a completed HTTP exchange
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// Sends one request per probe with keep-alive disabled
#[derive(Debug, Clone)]
pub struct HttpProber {
    client: Client,
    method: Method,
    url: Url,
    headers: Vec<Header>,
    params: Vec<(String, Value)>,
    timeout: Duration,
}

impl HttpProber {
    pub fn new(
        method: Method,
        url: Url,
        headers: Vec<Header>,
        params: Vec<(String, Value)>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(0)
            .build()
            .context("cannot build HTTP client")?;

        Ok(Self { client, method, url, headers, params, timeout })
    }

    pub async fn probe(&self, token: &CancellationToken) -> Result<ProbeResult<HttpResponse>> {
        let clock = Clock::start(self.timeout);
        let request = self.request()?;

        let exchange = async {
            let response = request.send().await?;
            let status_code = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response.text().await?;
            Ok::<_, reqwest::Error>(HttpResponse { status_code, headers, body })
        };

        tokio::select! {
            biased;
            _ = token.cancelled() => anyhow::bail!("probe cancelled"),
            exchanged = timeout_at(clock.deadline(), exchange) => Ok(match exchanged {
                Err(_elapsed) => clock.timed_out(),
                Ok(Err(err)) if err.is_timeout() => clock.timed_out(),
                Ok(Err(err)) => clock.failed(request_failure(&err)),
                Ok(Ok(response)) => clock.finish(response),
            }),
        }
    }

    /// Build the request, payload parameters go into the query string for
    /// GET and into a JSON or form body otherwise
    fn request(&self) -> Result<RequestBuilder> {
        let mut url = self.url.clone();
        if self.method == Method::GET && !self.params.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &self.params {
                query.append_pair(key, &param_text(value));
            }
        }

        let mut builder = self.client.request(self.method.clone(), url);
        for (name, value) in &self.headers {
            builder = builder.header(name.clone(), value.clone());
        }

        if self.method == Method::GET || self.params.is_empty() {
            return Ok(builder);
        }

        if self.json_body() {
            let body: serde_json::Map<String, Value> = self.params.iter().cloned().collect();
            let body = serde_json::to_vec(&body).context("cannot encode request body")?;
            return Ok(builder.body(body));
        }

        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter().map(|(key, value)| (key, param_text(value))))
            .finish();
        if self.content_type().is_none() {
            builder = builder.header(CONTENT_TYPE, "application/x-www-form-urlencoded");
        }
        Ok(builder.body(body))
    }

    fn content_type(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| *name == CONTENT_TYPE)
            .and_then(|(_, value)| value.to_str().ok())
    }

    fn json_body(&self) -> bool {
        self.content_type()
            .map(|value| value.trim().to_ascii_lowercase().starts_with("application/json"))
            .unwrap_or(false)
    }
}

/// Query and form values are sent without JSON quoting
fn param_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn request_failure(err: &reqwest::Error) -> String {
    let mut reason = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        reason.push_str(": ");
        reason.push_str(&cause.to_string());
        source = cause.source();
    }
    reason
}
