//! Component types and validation helpers shared by the checkers.

use std::{net::IpAddr, sync::LazyLock};

use anyhow::{anyhow, bail, Context, Result};
use regex::Regex;
use reqwest::header::{HeaderName, HeaderValue};
use url::Url;

use super::{Check, Component};

pub const TIMEOUT: &str = "TIMEOUT";
pub const STATUS_CODE: &str = "STATUSCODE";
pub const BODY: &str = "BODY";
pub const HEADER: &str = "HEADER";
pub const MESSAGE: &str = "MESSAGE";
pub const PARAMETER: &str = "PARAMETER";
pub const ADDRESS: &str = "ADDRESS";
pub const IP: &str = "IP";
pub const URL: &str = "URL";
pub const HOST: &str = "HOST";
pub const HOSTNAME: &str = "HOSTNAME";
pub const DNS_NAME: &str = "DNSNAME";

/// Separates expected messages in a `MESSAGE` output
pub const MESSAGE_DELIMITER: &str = "\n---\n";

/// Input values accepted by the stream and lookup checkers
pub(crate) const ECHO_INPUTS: &[&str] = &["", "PING", "ECHO"];

const ADDRESS_PATTERN: &str =
    r"^([a-zA-Z0-9_]{1}[a-zA-Z0-9_-]{0,62}){1}(\.[a-zA-Z0-9_]{1}[a-zA-Z0-9_-]{0,62})*[\._]?$";

static ADDRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(ADDRESS_PATTERN).expect("address pattern compiles"));

/// Interval and timeout must both be positive
pub(crate) fn validate_timing(check: &Check) -> Result<()> {
    if check.interval.is_zero() {
        bail!("interval should be > 0");
    }
    if check.timeout.is_zero() {
        bail!("timeout should be > 0");
    }
    Ok(())
}

/// The input selects the checker, its value is one of `allowed`
pub(crate) fn validate_input(input: &Component, name: &str, allowed: &[&str]) -> Result<()> {
    if input.kind != name {
        return Err(anyhow!("invalid component type: {}", input.kind)).context("input");
    }
    if !allowed.contains(&input.value.as_str()) {
        return Err(anyhow!("invalid value: {}", input.value)).context("input");
    }
    Ok(())
}

pub(crate) fn unsupported(component: &Component) -> anyhow::Error {
    anyhow!("invalid component type: {}", component.kind)
}

/// Split `K=V` on the first `=`
pub(crate) fn parse_key_value(value: &str) -> Result<(String, String)> {
    match value.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => bail!("value should have format K=V: {value}"),
    }
}

/// A request header given as `K=V`
pub type Header = (HeaderName, HeaderValue);

/// Parse `K=V` into a header that is valid on the wire
pub(crate) fn parse_header(value: &str) -> Result<Header> {
    let (key, value) = parse_key_value(value)?;
    let name = HeaderName::from_bytes(key.as_bytes())
        .with_context(|| format!("invalid header name: {key:?}"))?;
    let value = HeaderValue::from_str(&value)
        .with_context(|| format!("invalid value of header {key}: {value:?}"))?;
    Ok((name, value))
}

pub(crate) fn parse_status_code(value: &str) -> Result<u16> {
    let code: u16 = value
        .trim()
        .parse()
        .with_context(|| format!("status code is not a number: {value}"))?;
    if !(100..=599).contains(&code) {
        bail!("status code should be between 100 and 599: {code}");
    }
    Ok(code)
}

/// A URL with one of the given schemes
pub(crate) fn parse_url(value: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(value).with_context(|| format!("value is not a valid URL: {value}"))?;
    if !schemes.contains(&url.scheme()) {
        bail!("unsupported URL scheme: {}", url.scheme());
    }
    Ok(url)
}

/// An IP address or a host name
pub(crate) fn is_address(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok() || ADDRESS_REGEX.is_match(value)
}

/// A host name that is not an IP address
pub(crate) fn is_dns_name(value: &str) -> bool {
    value.parse::<IpAddr>().is_err() && ADDRESS_REGEX.is_match(value)
}

/// `HOST:PORT`, with IPv6 hosts in brackets
pub(crate) fn validate_host_port(value: &str) -> Result<()> {
    let (host, port) =
        value.rsplit_once(':').ok_or_else(|| anyhow!("address should be HOST:PORT: {value}"))?;

    let port: u16 = port.parse().with_context(|| format!("invalid port: {port}"))?;
    if port == 0 {
        bail!("port should be > 0");
    }

    let host = host.strip_prefix('[').and_then(|host| host.strip_suffix(']')).unwrap_or(host);
    if !is_address(host) {
        bail!("value is not a valid address: {host}");
    }
    Ok(())
}

/// Payload values in order, each checked to be a `MESSAGE`
pub(crate) fn message_payloads(payloads: &[Component]) -> Result<Vec<String>> {
    payloads
        .iter()
        .enumerate()
        .map(|(index, payload)| {
            if payload.kind != MESSAGE {
                return Err(unsupported(payload)).with_context(|| format!("payload {index}"));
            }
            if payload.value.is_empty() {
                bail!("payload {index}: message should not be empty");
            }
            Ok(payload.value.clone())
        })
        .collect()
}

/// Expected messages of a `MESSAGE` output, one per payload
pub(crate) fn expected_messages(output: &Component, payloads: usize) -> Result<Vec<String>> {
    if payloads == 0 {
        bail!("no payload for expected message output");
    }
    let messages: Vec<String> =
        output.value.split(MESSAGE_DELIMITER).map(str::to_string).collect();
    if messages.len() != payloads {
        bail!("expected {} messages, found {}", payloads, messages.len());
    }
    Ok(messages)
}

/// Compare received messages with the expected ones
pub(crate) fn match_messages(expected: &[String], received: &[String]) -> Result<(), String> {
    for (index, expected) in expected.iter().enumerate() {
        let received = received.get(index).map(String::as_str).unwrap_or_default();
        if received != expected {
            return Err(format!("message {index}: received {received:?}, expected {expected:?}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn addresses() {
        assert!(is_address("example.com"));
        assert!(is_address("localhost"));
        assert!(is_address("10.1.2.3"));
        assert!(is_address("::1"));
        assert!(!is_address("exa mple.com"));
        assert!(!is_address("-leading.example"));

        assert!(is_dns_name("example.com."));
        assert!(!is_dns_name("10.1.2.3"));
    }

    #[test]
    fn host_port() {
        assert!(validate_host_port("example.com:80").is_ok());
        assert!(validate_host_port("127.0.0.1:9009").is_ok());
        assert!(validate_host_port("[::1]:53").is_ok());
        assert!(validate_host_port("example.com").is_err());
        assert!(validate_host_port("example.com:0").is_err());
        assert!(validate_host_port("example.com:http").is_err());
    }

    #[test]
    fn status_codes_are_bounded() {
        assert_eq!(parse_status_code("204").unwrap(), 204);
        assert!(parse_status_code("99").is_err());
        assert!(parse_status_code("600").is_err());
        assert!(parse_status_code("ok").is_err());
    }

    #[test]
    fn key_values_split_on_the_first_equals() {
        assert_eq!(
            parse_key_value("Authorization=Bearer a=b").unwrap(),
            ("Authorization".to_string(), "Bearer a=b".to_string())
        );
        assert!(parse_key_value("=value").is_err());
        assert!(parse_key_value("no-separator").is_err());
    }

    #[test]
    fn headers_must_be_valid_on_the_wire() {
        let (name, value) = parse_header("X-Api-Key=secret").unwrap();
        assert_eq!(name, "x-api-key");
        assert_eq!(value, "secret");

        let err = parse_header("Bad Header=v").unwrap_err();
        assert_eq!(err.to_string(), "invalid header name: \"Bad Header\"");
        assert!(parse_header("X-Note=line\nbreak").is_err());
    }

    #[test]
    fn expected_messages_follow_payloads() {
        let output = Component::new(MESSAGE, "hello\n---\nworld");
        assert_eq!(expected_messages(&output, 2).unwrap(), vec!["hello", "world"]);
        assert!(expected_messages(&output, 1).is_err());
        assert!(expected_messages(&output, 0).is_err());

        let expected = vec!["hello".to_string(), "world".to_string()];
        assert!(match_messages(&expected, &expected).is_ok());
        assert!(match_messages(&expected, &["hello".to_string()]).is_err());
    }

    #[test]
    fn timing_must_be_positive() {
        let mut check = Check {
            id: "c".into(),
            name: String::new(),
            interval: Duration::from_secs(1),
            timeout: Duration::ZERO,
            input: Component::new("TCP", ""),
            output: Component::default(),
            target: Component::default(),
            payloads: vec![],
            alerts: vec![],
        };
        assert_eq!(validate_timing(&check).unwrap_err().to_string(), "timeout should be > 0");

        check.interval = Duration::ZERO;
        assert_eq!(validate_timing(&check).unwrap_err().to_string(), "interval should be > 0");
    }

    #[test]
    fn input_errors_name_the_component() {
        let err = validate_input(&Component::new("TCP", "SHOUT"), "TCP", ECHO_INPUTS).unwrap_err();
        assert_eq!(format!("{err:#}"), "input: invalid value: SHOUT");
    }
}
