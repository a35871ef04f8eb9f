use std::time::Duration;

use actix_web::{HttpResponse, Responder, get, web};
use serde::Deserialize;
use tracing::debug;

use crate::agent::Agent;

const MAX_DURATION: Duration = Duration::from_secs(7 * 24 * 60 * 60);
const DEFAULT_DURATION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Deserialize)]
pub struct MetricsQuery {
    /// Seconds to look back
    duration: Option<u64>,
    /// Comma separated check ids, all checks when empty
    checks: Option<String>,
}

impl MetricsQuery {
    fn duration(&self) -> Duration {
        self.duration.map(Duration::from_secs).unwrap_or(DEFAULT_DURATION).min(MAX_DURATION)
    }

    fn check_ids(&self) -> Vec<String> {
        self.checks
            .iter()
            .flat_map(|checks| checks.split(','))
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Recent metrics from the configured backend, newest first
#[get("/metrics")]
pub async fn metrics_route(agent: web::Data<Agent>, query: web::Query<MetricsQuery>) -> impl Responder {
    match agent.exporter().get_metrics(query.duration(), &query.check_ids()).await {
        Ok(metrics) => HttpResponse::Ok().json(metrics),
        Err(err) => {
            debug!("metrics query failed: {err:#}");
            HttpResponse::NotImplemented().body(format!("{err:#}"))
        }
    }
}
