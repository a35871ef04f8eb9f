//! Protocol probers.
//!
//! A prober performs one network exchange under a deadline. Running out of
//! time is reported as [`Outcome::Timeout`] and a target that cannot be
//! reached or drops the exchange as [`Outcome::Failed`]. Only problems on
//! the agent's side are returned as errors.

mod race;

pub mod dns;
pub mod http;
pub mod icmp;
pub mod tcp;
pub mod udp;
pub mod ws;

use std::{fmt, time::Duration};

use anyhow::anyhow;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

pub use race::{race, Raced};

/// Largest single message read from a stream or datagram socket
pub const MAX_MESSAGE_SIZE: usize = 65536;

/// How one probe ended
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Response(T),
    Timeout,
    Failed(String),
}

/// Result shared by every prober
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult<T> {
    pub start_time: DateTime<Utc>,
    pub duration: Duration,
    pub outcome: Outcome<T>,
}

impl<T> ProbeResult<T> {
    pub fn timeout(&self) -> bool {
        matches!(self.outcome, Outcome::Timeout)
    }

    pub fn response(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Response(response) => Some(response),
            _ => None,
        }
    }
}

/// Why an exchange stopped before producing a response
#[derive(Debug)]
pub(crate) enum Interrupt {
    Timeout,
    Failed(String),
    Cancelled,
}

impl<T, E: fmt::Display> Raced<Result<T, E>> {
    /// Collapse a raced I/O step, `step` names it in failure messages
    pub(crate) fn settle(self, step: &str) -> Result<T, Interrupt> {
        match self {
            Raced::Done(Ok(value)) => Ok(value),
            Raced::Done(Err(err)) => Err(Interrupt::Failed(format!("{step}: {err}"))),
            Raced::TimedOut => Err(Interrupt::Timeout),
            Raced::Cancelled => Err(Interrupt::Cancelled),
        }
    }
}

/// Start time and deadline of one probe
#[derive(Debug, Clone, Copy)]
pub(crate) struct Clock {
    start_time: DateTime<Utc>,
    started: Instant,
    timeout: Duration,
}

impl Clock {
    pub(crate) fn start(timeout: Duration) -> Self {
        Self { start_time: Utc::now(), started: Instant::now(), timeout }
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.started + self.timeout
    }

    pub(crate) fn finish<T>(&self, response: T) -> ProbeResult<T> {
        self.result(Outcome::Response(response), self.started.elapsed())
    }

    pub(crate) fn failed<T>(&self, reason: impl Into<String>) -> ProbeResult<T> {
        self.result(Outcome::Failed(reason.into()), self.started.elapsed())
    }

    pub(crate) fn timed_out<T>(&self) -> ProbeResult<T> {
        self.result(Outcome::Timeout, self.timeout)
    }

    pub(crate) fn interrupted<T>(&self, interrupt: Interrupt) -> anyhow::Result<ProbeResult<T>> {
        match interrupt {
            Interrupt::Timeout => Ok(self.timed_out()),
            Interrupt::Failed(reason) => Ok(self.failed(reason)),
            Interrupt::Cancelled => Err(anyhow!("probe cancelled")),
        }
    }

    fn result<T>(&self, outcome: Outcome<T>, duration: Duration) -> ProbeResult<T> {
        ProbeResult { start_time: self.start_time, duration, outcome }
    }
}

/// Turn received bytes into text, dropping NUL padding
pub(crate) fn message_text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim_matches('\0').to_string()
}
