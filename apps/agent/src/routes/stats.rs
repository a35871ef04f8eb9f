use actix_web::{HttpResponse, Responder, get, web};
use checkup::rpc::ManagerStats;

use crate::agent::Agent;

/// Status of every scheduled check
#[get("/stats")]
pub async fn stats_route(agent: web::Data<Agent>) -> impl Responder {
    let controllers = agent.manager().stats().await.into_iter().collect();
    HttpResponse::Ok().json(ManagerStats { controllers })
}
