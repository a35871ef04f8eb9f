//! Repeating task scheduler.
//!
//! A [`Controller`] owns one task function and runs it periodically on its
//! own worker, backing off while the task keeps failing. A [`Manager`] owns a
//! set of controllers keyed by id and is the single shutdown switch for all of
//! them.

mod error;
mod manager;
mod worker;
mod stats;

use std::{fmt, future::Future, sync::Arc, time::Duration};

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::checker::CheckResult;

pub use error::ControllerError;
pub use manager::Manager;
pub use worker::Controller;
pub use stats::{ConfigStatus, ControllerStatus, RunStat, RunStatus};

/// Default base delay of the error backoff
pub const DEFAULT_ERROR_RETRY_BASE: Duration = Duration::from_secs(1);

/// Future returned by a task function
pub type TaskFuture = BoxFuture<'static, anyhow::Result<CheckResult>>;

/// The task a controller runs on every tick.
///
/// It receives a token that is cancelled once the invocation is over, so any
/// helper work it hands off can notice that nobody waits for it anymore.
pub type RunnerFn = Arc<dyn Fn(CancellationToken) -> TaskFuture + Send + Sync>;

/// Wrap an async closure into a [`RunnerFn`]
pub fn runner<F, Fut>(func: F) -> RunnerFn
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<CheckResult>> + Send + 'static,
{
    Arc::new(move |token| Box::pin(func(token)))
}

/// Everything needed to create or update a controller
#[derive(Clone)]
pub struct ControllerOpts {
    pub id: String,
    pub name: String,
    pub interval: Duration,
    pub func: RunnerFn,
    /// When false, errors are recorded but never change the schedule
    pub error_retry: bool,
    /// When false, failing runs are retried every `error_retry_base`
    pub back_off: bool,
    pub error_retry_base: Duration,
    /// Maximum number of stats kept between two pulls, oldest dropped first
    pub history_limit: Option<usize>,
}

impl ControllerOpts {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        interval: Duration,
        func: RunnerFn,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            interval,
            func,
            error_retry: true,
            back_off: true,
            error_retry_base: DEFAULT_ERROR_RETRY_BASE,
            history_limit: None,
        }
    }

    /// Keep the configured interval even after errors
    pub fn no_error_retry(mut self) -> Self {
        self.error_retry = false;
        self
    }

    /// Retry errors at a constant `error_retry_base` instead of backing off
    pub fn without_back_off(mut self) -> Self {
        self.back_off = false;
        self
    }

    pub fn with_error_retry_base(mut self, base: Duration) -> Self {
        self.error_retry_base = base;
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = Some(limit);
        self
    }
}

impl fmt::Debug for ControllerOpts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControllerOpts")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("interval", &self.interval)
            .field("error_retry", &self.error_retry)
            .field("back_off", &self.back_off)
            .field("error_retry_base", &self.error_retry_base)
            .field("history_limit", &self.history_limit)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use chrono::Utc;
    use tokio::sync::Mutex;
    use tokio::time::Instant;

    use super::*;

    /// A task that succeeds and counts its invocations
    pub fn counting(counter: Arc<AtomicUsize>) -> RunnerFn {
        runner(move |_| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(CheckResult::success(Utc::now(), Duration::ZERO))
            }
        })
    }

    /// A task that records when it ran and fails for the first `failures` runs
    pub fn failing(times: Arc<Mutex<Vec<Instant>>>, failures: usize) -> RunnerFn {
        runner(move |_| {
            let times = Arc::clone(&times);
            async move {
                let mut times = times.lock().await;
                times.push(Instant::now());
                if times.len() <= failures {
                    anyhow::bail!("attempt {} failed", times.len());
                }
                Ok::<_, anyhow::Error>(CheckResult::success(Utc::now(), Duration::ZERO))
            }
        })
    }

    pub fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|pair| pair[1] - pair[0]).collect()
    }

    /// Compare invocation gaps allowing for timer granularity
    pub fn assert_gaps(times: &[Instant], expected: &[Duration]) {
        let actual = gaps(times);
        assert_eq!(actual.len(), expected.len(), "gaps {actual:?}, expected {expected:?}");
        for (actual, expected) in actual.iter().zip(expected) {
            let drift = actual.abs_diff(*expected);
            assert!(drift <= Duration::from_millis(5), "gap {actual:?}, expected {expected:?}");
        }
    }
}
