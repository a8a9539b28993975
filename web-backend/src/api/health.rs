use actix_web::{web, HttpResponse, Responder};
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecks {
    pub scratch_dir_ready: bool,
    pub scanner_available: bool,
}

pub fn configure_health_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check));
}

async fn health_check(state: web::Data<AppState>) -> impl Responder {
    let orchestrator = &state.orchestrator;
    let checks = HealthChecks {
        scratch_dir_ready: orchestrator.scratch().is_ready().await,
        scanner_available: state.scanner_available,
    };

    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "checks": checks
    }))
}
