//! Run statistics recorded by controllers.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::checker::CheckResult;

/// Outcome of one scheduled invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunStat {
    pub id: String,
    pub name: String,
    pub successful: bool,
    pub timeout: bool,
    pub start_time: DateTime<Utc>,
    #[serde(with = "crate::duration")]
    pub duration: Duration,
    /// Why a probe reported an unsuccessful check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Set when the invocation itself failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl RunStat {
    pub(crate) fn from_result(id: &str, name: &str, result: CheckResult) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            successful: result.successful,
            timeout: result.timeout,
            start_time: result.start_time,
            duration: result.duration,
            reason: result.reason,
            err: None,
        }
    }

    pub(crate) fn from_error(
        id: &str,
        name: &str,
        start_time: DateTime<Utc>,
        duration: Duration,
        err: String,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            successful: false,
            timeout: false,
            start_time,
            duration,
            reason: None,
            err: Some(err),
        }
    }

    /// Whether the invocation failed, as opposed to reporting a failed check
    pub fn is_err(&self) -> bool {
        self.err.is_some()
    }
}

/// Scheduling configuration of a controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigStatus {
    pub error_retry: bool,
    pub should_back_off: bool,
    #[serde(with = "crate::duration")]
    pub interval: Duration,
}

/// Counters over every invocation since the controller was created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStatus {
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failure_count: u64,
    pub last_success_time: Option<DateTime<Utc>>,
    pub last_failure_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl RunStatus {
    pub(crate) fn record(&mut self, stat: &RunStat) {
        let finished = stat.start_time + chrono::Duration::from_std(stat.duration).unwrap_or_default();

        match &stat.err {
            None => {
                self.success_count += 1;
                self.consecutive_failure_count = 0;
                self.last_success_time = Some(finished);
            }
            Some(err) => {
                self.failure_count += 1;
                self.consecutive_failure_count += 1;
                self.last_failure_time = Some(finished);
                self.last_error = Some(err.clone());
            }
        }
    }
}

/// Snapshot of one controller used by `GetManagerStats`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub name: String,
    pub config: ConfigStatus,
    pub run: RunStatus,
}
