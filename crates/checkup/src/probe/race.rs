use std::future::Future;

use anyhow::anyhow;
use tokio::time::{sleep_until, timeout_at, Instant};
use tokio_util::sync::CancellationToken;

/// Which side of a [`race`] finished first
#[derive(Debug, PartialEq, Eq)]
pub enum Raced<T> {
    Done(T),
    TimedOut,
    Cancelled,
}

/// Run `operation` on its own task and wait for whichever comes first: its
/// completion, `deadline`, or cancellation of `token`.
///
/// When the deadline or the token wins, the spawned task is detached rather
/// than aborted. It keeps running in the background until the underlying I/O
/// returns. Socket operations are themselves bounded by `deadline`, so they
/// end then at the latest, while blocking calls such as the system resolver
/// may outlive it.
pub async fn race<F, T>(
    token: &CancellationToken,
    deadline: Instant,
    operation: F,
) -> anyhow::Result<Raced<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let worker = tokio::spawn(timeout_at(deadline, operation));

    tokio::select! {
        biased;
        joined = worker => match joined {
            Ok(Ok(value)) => Ok(Raced::Done(value)),
            Ok(Err(_elapsed)) => Ok(Raced::TimedOut),
            Err(err) => Err(anyhow!("probe worker failed: {err}")),
        },
        _ = sleep_until(deadline) => Ok(Raced::TimedOut),
        _ = token.cancelled() => Ok(Raced::Cancelled),
    }
}
