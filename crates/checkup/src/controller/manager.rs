use std::{collections::HashMap, sync::Arc, time::Duration};

use futures::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{
    stats::{ControllerStatus, RunStat},
    Controller, ControllerError, ControllerOpts,
};

/// Owns a set of controllers keyed by id.
///
/// The map lock is never held while waiting on a controller worker,
/// controllers are detached first and stopped afterwards. Lock order is
/// always the map first, then a controller's state.
pub struct Manager {
    root: CancellationToken,
    controllers: RwLock<HashMap<String, Arc<Controller>>>,
}

impl Default for Manager {
    fn default() -> Self {
        Self::new()
    }
}

impl Manager {
    pub fn new() -> Self {
        Self { root: CancellationToken::new(), controllers: RwLock::new(HashMap::new()) }
    }

    /// Create a manager that is also closed when `parent` is cancelled
    pub fn with_parent(parent: &CancellationToken) -> Self {
        Self { root: parent.child_token(), controllers: RwLock::new(HashMap::new()) }
    }

    /// Create and start a controller, or hot-swap the existing one with the same id.
    ///
    /// An existing controller keeps its worker and its history, only the
    /// interval (when it changed) and the task function are replaced.
    pub async fn update_controller(&self, opts: ControllerOpts) -> Result<(), ControllerError> {
        if opts.id.is_empty() {
            return Err(ControllerError::EmptyId);
        }

        let mut controllers = self.controllers.write().await;
        if self.root.is_cancelled() {
            return Err(ControllerError::ManagerClosed);
        }

        // Swapped under the map lock so a concurrent remove cannot orphan the update
        match controllers.get(&opts.id) {
            Some(existing) => {
                existing.update_func(opts.func).await;
                if !opts.interval.is_zero() {
                    existing.update_interval(opts.interval).await?;
                }
                debug!(controller = %opts.id, "controller updated");
            }
            None => {
                let id = opts.id.clone();
                let controller = Arc::new(Controller::new(opts, &self.root)?);
                controller.start();
                controllers.insert(id.clone(), controller);
                info!(controller = %id, "controller added");
            }
        }

        Ok(())
    }

    /// Ids mapped to controller names
    pub async fn list_controllers(&self) -> HashMap<String, String> {
        self.controllers
            .read()
            .await
            .iter()
            .map(|(id, controller)| (id.clone(), controller.name().to_string()))
            .collect()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.controllers.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.controllers.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.controllers.read().await.is_empty()
    }

    /// Detach and stop a controller without waiting. Returns whether it existed.
    pub async fn remove_controller(&self, id: &str) -> bool {
        match self.detach(id).await {
            Some(controller) => {
                controller.stop();
                true
            }
            None => false,
        }
    }

    /// Detach and stop a controller, then wait for its worker to exit
    pub async fn remove_controller_and_wait(&self, id: &str) -> bool {
        match self.detach(id).await {
            Some(controller) => {
                controller.stop();
                controller.wait().await;
                true
            }
            None => false,
        }
    }

    pub async fn remove_all(&self) {
        for controller in self.detach_all().await {
            controller.stop();
        }
    }

    pub async fn remove_all_and_wait(&self) {
        let controllers = self.detach_all().await;
        for controller in &controllers {
            controller.stop();
        }
        join_all(controllers.iter().map(|controller| controller.wait())).await;
    }

    /// Drain the history of every controller
    pub async fn pull_all_stats(&self) -> HashMap<String, Vec<RunStat>> {
        let mut stats = HashMap::new();
        for controller in self.snapshot().await {
            stats.insert(controller.id().to_string(), controller.pull_all_stats().await);
        }
        stats
    }

    /// Latest stat of every controller that has run at least once
    pub async fn pull_latest_stats(&self) -> HashMap<String, RunStat> {
        let mut stats = HashMap::new();
        for controller in self.snapshot().await {
            if let Some(stat) = controller.pull_latest_stat().await {
                stats.insert(controller.id().to_string(), stat);
            }
        }
        stats
    }

    pub async fn stats(&self) -> HashMap<String, ControllerStatus> {
        let mut stats = HashMap::new();
        for controller in self.snapshot().await {
            stats.insert(controller.id().to_string(), controller.status().await);
        }
        stats
    }

    /// Gracefully remove every controller within `timeout`.
    ///
    /// The manager is only closed when all workers exited in time. On timeout
    /// the controllers are already detached and stopping, and the caller may
    /// retry or [`close`](Self::close) it.
    pub async fn shutdown(&self, timeout: Duration) -> Result<(), ControllerError> {
        self.drain(timeout).await.map(drop)
    }

    /// [`shutdown`](Self::shutdown), returning the history every controller
    /// recorded up to its exit, including runs that finished while waiting.
    /// On timeout that history is dropped with the controllers.
    pub async fn drain(
        &self,
        timeout: Duration,
    ) -> Result<HashMap<String, Vec<RunStat>>, ControllerError> {
        let controllers = self.detach_all().await;
        for controller in &controllers {
            controller.stop();
        }
        let exited = join_all(controllers.iter().map(|controller| controller.wait()));
        tokio::time::timeout(timeout, exited)
            .await
            .map_err(|_| ControllerError::ShutdownTimeout(timeout))?;

        self.root.cancel();
        info!("manager shut down");

        let mut stats = HashMap::new();
        for controller in controllers {
            stats.insert(controller.id().to_string(), controller.pull_all_stats().await);
        }
        Ok(stats)
    }

    /// Remove everything and close the manager without waiting
    pub async fn close(&self) {
        self.root.cancel();
        self.remove_all().await;
        info!("manager closed");
    }

    /// Wait until the manager is closed
    pub async fn wait(&self) {
        self.root.cancelled().await;
    }

    pub fn is_closed(&self) -> bool {
        self.root.is_cancelled()
    }

    async fn detach(&self, id: &str) -> Option<Arc<Controller>> {
        let controller = self.controllers.write().await.remove(id);
        if controller.is_some() {
            info!(controller = %id, "controller removed");
        }
        controller
    }

    async fn detach_all(&self) -> Vec<Arc<Controller>> {
        self.controllers.write().await.drain().map(|(_, controller)| controller).collect()
    }

    async fn snapshot(&self) -> Vec<Arc<Controller>> {
        self.controllers.read().await.values().cloned().collect()
    }
}
