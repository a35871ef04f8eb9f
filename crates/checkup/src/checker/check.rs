use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::alert::AlertTarget;

/// One monitoring task as configured by a user.
///
/// A check never changes once handed to a checker. Updating a check means
/// building a new one with the same `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(with = "crate::duration")]
    pub interval: Duration,
    #[serde(with = "crate::duration")]
    pub timeout: Duration,
    /// The input type selects the checker
    pub input: Component,
    #[serde(default)]
    pub output: Component,
    pub target: Component,
    #[serde(default)]
    pub payloads: Vec<Component>,
    #[serde(default)]
    pub alerts: Vec<AlertTarget>,
}

impl Check {
    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { &self.id } else { &self.name }
    }
}

/// A typed value, interpreted by each checker in its own way
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub value: String,
}

impl Component {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self { kind: kind.into(), value: value.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checks_deserialize_with_human_durations() {
        let check: Check = parse(
            r#"{
                "id": "web",
                "interval": "30s",
                "timeout": "2s 500ms",
                "input": {"type": "HTTP", "value": "GET"},
                "output": {"type": "STATUSCODE", "value": "200"},
                "target": {"type": "URL", "value": "https://example.com"},
                "alerts": [{"service": "discord", "target": "https://hooks.test/1"}]
            }"#,
        );

        assert_eq!(check.interval, Duration::from_secs(30));
        assert_eq!(check.timeout, Duration::from_millis(2500));
        assert_eq!(check.input, Component::new("HTTP", "GET"));
        assert!(check.payloads.is_empty());
        assert_eq!(check.alerts.len(), 1);
        assert_eq!(check.display_name(), "web");
    }

    #[test]
    fn component_value_defaults_to_empty() {
        let component: Component = serde_json::from_str(r#"{"type": "TIMEOUT"}"#).unwrap();
        assert_eq!(component, Component::new("TIMEOUT", ""));
    }

    fn parse(raw: &str) -> Check {
        serde_json::from_str(raw).unwrap()
    }
}
