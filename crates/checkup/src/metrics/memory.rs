use std::{
    collections::{HashMap, VecDeque},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{sort_newest_first, Exporter, Metric};

/// Keeps the most recent metrics of every check in process
#[derive(Debug)]
pub struct MemoryExporter {
    limit: usize,
    metrics: RwLock<HashMap<String, VecDeque<Metric>>>,
}

impl MemoryExporter {
    pub const NAME: &'static str = "memory";

    /// Metrics kept per check by default
    pub const DEFAULT_LIMIT: usize = 4096;

    pub fn new(limit: usize) -> Self {
        Self { limit: limit.max(1), metrics: RwLock::new(HashMap::new()) }
    }
}

impl Default for MemoryExporter {
    fn default() -> Self {
        Self::new(Self::DEFAULT_LIMIT)
    }
}

#[async_trait]
impl Exporter for MemoryExporter {
    async fn export(&self, metrics: &[Metric]) -> anyhow::Result<()> {
        let mut stored = self.metrics.write().await;
        for metric in metrics {
            let list = stored.entry(metric.check_id.clone()).or_default();
            list.push_back(metric.clone());
            while list.len() > self.limit {
                list.pop_front();
            }
        }
        Ok(())
    }

    async fn get_metrics(
        &self,
        duration: Duration,
        check_ids: &[String],
    ) -> anyhow::Result<HashMap<String, Vec<Metric>>> {
        let since = Utc::now() - chrono::Duration::from_std(duration)?;
        let stored = self.metrics.read().await;

        let mut found: HashMap<String, Vec<Metric>> = stored
            .iter()
            .filter(|(id, _)| check_ids.is_empty() || check_ids.contains(*id))
            .map(|(id, list)| {
                let recent: Vec<Metric> = list.iter().filter(|m| m.start_time >= since).cloned().collect();
                (id.clone(), recent)
            })
            .collect();
        sort_newest_first(&mut found);
        Ok(found)
    }

    async fn forget(&self, check_id: &str) {
        self.metrics.write().await.remove(check_id);
    }
}
