//! Serde helpers for human readable durations such as `"30s"` or `"1m 30s"`.
//!
//! Use with `#[serde(with = "checkup::duration")]`.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&humantime::format_duration(*value))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    let raw = String::deserialize(deserializer)?;
    humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Wrapper {
        #[serde(with = "super")]
        every: Duration,
    }

    #[test]
    fn parses_compound_durations() {
        let parsed: Wrapper = serde_json::from_str(r#"{"every":"1m 30s"}"#).unwrap();
        assert_eq!(parsed.every, Duration::from_secs(90));
    }

    #[test]
    fn rejects_bare_numbers() {
        assert!(serde_json::from_str::<Wrapper>(r#"{"every":"30"}"#).is_err());
    }

    #[test]
    fn writes_milliseconds() {
        let raw = serde_json::to_string(&Wrapper { every: Duration::from_millis(250) }).unwrap();
        assert_eq!(raw, r#"{"every":"250ms"}"#);
    }
}
