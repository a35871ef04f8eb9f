use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{
    sync::{Notify, RwLock},
    time::{sleep, Instant},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{
    stats::{ConfigStatus, ControllerStatus, RunStat, RunStatus},
    ControllerError, ControllerOpts, RunnerFn,
};

/// Runs one task function periodically on a dedicated worker.
///
/// Invocations are strictly serialized. Configuration changes are picked up by
/// the next scheduling decision and never interrupt a running invocation. Once
/// a stop is requested no further invocation starts.
pub struct Controller {
    id: String,
    name: String,
    state: RwLock<State>,
    update: Notify,
    stop: CancellationToken,
    terminated: CancellationToken,
    started: AtomicBool,
}

struct State {
    interval: Duration,
    func: RunnerFn,
    error_retry: bool,
    back_off: bool,
    error_retry_base: Duration,
    consecutive_errors: u32,
    history_limit: Option<usize>,
    history: VecDeque<RunStat>,
    latest: Option<RunStat>,
    status: RunStatus,
}

impl State {
    /// Delay until the next invocation given the current failure streak
    fn next_delay(&self) -> Duration {
        if self.consecutive_errors == 0 || !self.error_retry {
            return self.interval;
        }
        if !self.back_off {
            return self.error_retry_base;
        }
        self.error_retry_base.saturating_mul(self.consecutive_errors)
    }

    fn record(&mut self, stat: RunStat) -> Duration {
        if stat.is_err() {
            self.consecutive_errors = self.consecutive_errors.saturating_add(1);
        } else {
            self.consecutive_errors = 0;
        }

        self.status.record(&stat);
        self.latest = Some(stat.clone());
        self.history.push_back(stat);
        if let Some(limit) = self.history_limit {
            while self.history.len() > limit {
                self.history.pop_front();
            }
        }

        self.next_delay()
    }
}

impl Controller {
    /// Create a controller whose worker also stops when `parent` is cancelled
    pub fn new(opts: ControllerOpts, parent: &CancellationToken) -> Result<Self, ControllerError> {
        if opts.id.is_empty() {
            return Err(ControllerError::EmptyId);
        }
        if opts.interval.is_zero() {
            return Err(ControllerError::InvalidInterval("interval"));
        }
        if opts.error_retry && opts.error_retry_base.is_zero() {
            return Err(ControllerError::InvalidInterval("error retry base"));
        }

        let state = State {
            interval: opts.interval,
            func: opts.func,
            error_retry: opts.error_retry,
            back_off: opts.back_off,
            error_retry_base: opts.error_retry_base,
            consecutive_errors: 0,
            history_limit: opts.history_limit,
            history: VecDeque::new(),
            latest: None,
            status: RunStatus::default(),
        };

        Ok(Self {
            id: opts.id,
            name: opts.name,
            state: RwLock::new(state),
            update: Notify::new(),
            stop: parent.child_token(),
            terminated: CancellationToken::new(),
            started: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the worker. The first invocation happens right away.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            warn!(controller = %self.id, "controller already started");
            return;
        }

        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.run().await });
    }

    /// Request termination without waiting for it
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Wait until the worker has exited. Returns at once if it never started.
    pub async fn wait(&self) {
        if !self.started.load(Ordering::SeqCst) {
            return;
        }
        self.terminated.cancelled().await;
    }

    pub async fn update_interval(&self, interval: Duration) -> Result<(), ControllerError> {
        if interval.is_zero() {
            return Err(ControllerError::InvalidInterval("interval"));
        }

        {
            let mut state = self.state.write().await;
            if state.interval == interval {
                return Ok(());
            }
            state.interval = interval;
        }

        self.update.notify_one();
        Ok(())
    }

    /// Swap the task function, the running invocation keeps the old one
    pub async fn update_func(&self, func: RunnerFn) {
        self.state.write().await.func = func;
    }

    /// Drain the recorded history
    pub async fn pull_all_stats(&self) -> Vec<RunStat> {
        self.state.write().await.history.drain(..).collect()
    }

    /// Most recent stat, left in place
    pub async fn pull_latest_stat(&self) -> Option<RunStat> {
        self.state.read().await.latest.clone()
    }

    pub async fn status(&self) -> ControllerStatus {
        let state = self.state.read().await;
        ControllerStatus {
            name: self.name.clone(),
            config: ConfigStatus {
                error_retry: state.error_retry,
                should_back_off: state.error_retry && state.back_off,
                interval: state.interval,
            },
            run: state.status.clone(),
        }
    }

    async fn run(self: Arc<Self>) {
        let _terminated = self.terminated.clone().drop_guard();
        debug!(controller = %self.id, "controller started");

        let mut delay = Duration::ZERO;
        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = self.update.notified() => {
                    if self.stop.is_cancelled() {
                        break;
                    }
                    delay = self.state.read().await.next_delay();
                    continue;
                }
                _ = sleep(delay) => {}
            }

            if self.stop.is_cancelled() {
                break;
            }
            delay = self.run_once().await;
        }

        debug!(controller = %self.id, "controller stopped");
    }

    async fn run_once(&self) -> Duration {
        let func = self.state.read().await.func.clone();

        let token = CancellationToken::new();
        let start_time = Utc::now();
        let started = Instant::now();

        let run_token = token.clone();
        let outcome = tokio::spawn(async move { func(run_token).await }).await;
        token.cancel();
        let elapsed = started.elapsed();

        let stat = match outcome {
            Ok(Ok(result)) => RunStat::from_result(&self.id, &self.name, result),
            Ok(Err(err)) => {
                debug!(controller = %self.id, "run failed: {err:#}");
                RunStat::from_error(&self.id, &self.name, start_time, elapsed, format!("{err:#}"))
            }
            Err(join) => {
                warn!(controller = %self.id, "run panicked: {join}");
                let err = format!("task panicked: {join}");
                RunStat::from_error(&self.id, &self.name, start_time, elapsed, err)
            }
        };

        self.state.write().await.record(stat)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use tokio::sync::Mutex;

    use super::*;
    use crate::controller::{runner, test_support::*};

    async fn explode() -> anyhow::Result<crate::checker::CheckResult> {
        panic!("broken checker")
    }

    fn started(opts: ControllerOpts) -> Arc<Controller> {
        let controller = Arc::new(Controller::new(opts, &CancellationToken::new()).unwrap());
        controller.start();
        controller
    }

    #[tokio::test(start_paused = true)]
    async fn runs_once_per_interval() {
        let counter = Arc::new(AtomicUsize::new(0));
        let opts = ControllerOpts::new("a", "a", Duration::from_millis(100), counting(counter.clone()));
        let controller = started(opts);

        sleep(Duration::from_millis(1050)).await;
        controller.stop();
        controller.wait().await;

        let runs = counter.load(Ordering::SeqCst);
        assert!((9..=12).contains(&runs), "unexpected run count {runs}");
    }

    #[tokio::test(start_paused = true)]
    async fn consecutive_errors_grow_the_delay() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let opts = ControllerOpts::new("b", "b", Duration::from_secs(30), failing(times.clone(), usize::MAX));
        let controller = started(opts);

        sleep(Duration::from_millis(6500)).await;
        controller.stop();
        controller.wait().await;

        let times = times.lock().await;
        assert_gaps(&times, &[Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(3)]);
    }

    #[tokio::test(start_paused = true)]
    async fn success_restores_the_interval() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let opts = ControllerOpts::new("c", "c", Duration::from_secs(10), failing(times.clone(), 2));
        let controller = started(opts);

        sleep(Duration::from_millis(13500)).await;
        controller.stop();
        controller.wait().await;

        let times = times.lock().await;
        assert_gaps(&times, &[Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(10)]);
        assert_eq!(controller.status().await.run.consecutive_failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn no_error_retry_keeps_the_schedule() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let opts = ControllerOpts::new("d", "d", Duration::from_millis(500), failing(times.clone(), usize::MAX))
            .no_error_retry();
        let controller = started(opts);

        sleep(Duration::from_millis(1750)).await;
        controller.stop();
        controller.wait().await;

        let times = times.lock().await;
        assert_gaps(&times, &[Duration::from_millis(500); 3]);

        let status = controller.status().await;
        assert_eq!(status.run.failure_count, 4);
        assert!(!status.config.error_retry);
        assert!(!status.config.should_back_off);
    }

    #[tokio::test(start_paused = true)]
    async fn constant_retry_without_back_off() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let opts = ControllerOpts::new("e", "e", Duration::from_secs(60), failing(times.clone(), usize::MAX))
            .without_back_off()
            .with_error_retry_base(Duration::from_millis(200));
        let controller = started(opts);

        sleep(Duration::from_millis(700)).await;
        controller.stop();
        controller.wait().await;

        assert_gaps(&times.lock().await, &[Duration::from_millis(200); 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_update_restarts_the_timer_without_running() {
        let counter = Arc::new(AtomicUsize::new(0));
        let opts = ControllerOpts::new("f", "f", Duration::from_secs(10), counting(counter.clone()));
        let controller = started(opts);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        controller.update_interval(Duration::from_millis(100)).await.unwrap();
        sleep(Duration::from_millis(50)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 4);

        controller.stop();
        controller.wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_wins_over_a_pending_update() {
        let counter = Arc::new(AtomicUsize::new(0));
        let opts = ControllerOpts::new("g", "g", Duration::from_secs(1), counting(counter.clone()));
        let controller = started(opts);

        sleep(Duration::from_millis(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        controller.update_interval(Duration::from_millis(1)).await.unwrap();
        controller.stop();
        controller.wait().await;

        sleep(Duration::from_secs(5)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn swapped_function_is_used_by_the_next_run() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let opts = ControllerOpts::new("h", "h", Duration::from_secs(1), counting(first.clone()));
        let controller = started(opts);

        sleep(Duration::from_millis(500)).await;
        controller.update_func(counting(second.clone())).await;
        sleep(Duration::from_secs(2)).await;
        controller.stop();
        controller.wait().await;

        assert_eq!(first.load(Ordering::SeqCst), 1);
        assert_eq!(second.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pulling_all_stats_drains_but_latest_stays() {
        let counter = Arc::new(AtomicUsize::new(0));
        let opts = ControllerOpts::new("i", "i", Duration::from_millis(100), counting(counter));
        let controller = started(opts);

        sleep(Duration::from_millis(250)).await;
        controller.stop();
        controller.wait().await;

        assert_eq!(controller.pull_all_stats().await.len(), 3);
        assert!(controller.pull_all_stats().await.is_empty());

        let latest = controller.pull_latest_stat().await.unwrap();
        assert!(latest.successful);
        assert_eq!(latest.id, "i");
        assert!(controller.pull_latest_stat().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn history_limit_drops_oldest() {
        let times = Arc::new(Mutex::new(Vec::new()));
        let opts = ControllerOpts::new("j", "j", Duration::from_millis(100), failing(times, 1))
            .with_history_limit(2);
        let controller = started(opts);

        sleep(Duration::from_millis(1450)).await;
        controller.stop();
        controller.wait().await;

        let history = controller.pull_all_stats().await;
        assert_eq!(history.len(), 2);
        assert!(history.iter().all(|stat| !stat.is_err()));
    }

    #[tokio::test(start_paused = true)]
    async fn panics_are_recorded_as_errors() {
        let opts = ControllerOpts::new(
            "k",
            "k",
            Duration::from_secs(5),
            runner(|_| explode()),
        );
        let controller = started(opts);

        sleep(Duration::from_millis(10)).await;
        controller.stop();
        controller.wait().await;

        let latest = controller.pull_latest_stat().await.unwrap();
        assert!(latest.err.unwrap().contains("panicked"));
        assert_eq!(controller.status().await.run.failure_count, 1);
    }

    #[tokio::test]
    async fn rejects_zero_interval() {
        let opts = ControllerOpts::new("l", "l", Duration::ZERO, counting(Arc::default()));
        let err = Controller::new(opts, &CancellationToken::new()).err();
        assert_eq!(err, Some(ControllerError::InvalidInterval("interval")));
    }

    #[tokio::test]
    async fn wait_without_start_returns() {
        let opts = ControllerOpts::new("m", "m", Duration::from_secs(1), counting(Arc::default()));
        let controller = Controller::new(opts, &CancellationToken::new()).unwrap();
        controller.wait().await;
    }
}
