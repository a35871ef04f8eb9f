use actix_web::web::ServiceConfig;

mod health;
mod metrics;
mod stats;

pub fn routes(cfg: &mut ServiceConfig) {
    cfg.service(health::health_route)
        .service(stats::stats_route)
        .service(metrics::metrics_route);
}
