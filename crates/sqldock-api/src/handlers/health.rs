//! `GET /v1/healthcheck` handler.

use actix_web::{get, web, HttpResponse};
use serde_json::json;

use sqldock_engine::{EngineSupervisor, SupervisorState};

#[get("/healthcheck")]
pub async fn healthcheck(supervisor: web::Data<EngineSupervisor>) -> HttpResponse {
    let state = supervisor.state();
    let body = json!({
        "status": if state == SupervisorState::Ready { "ok" } else { "unavailable" },
        "engine": state.as_str(),
    });
    if state == SupervisorState::Ready {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}
