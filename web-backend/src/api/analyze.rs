use actix_web::{web, HttpResponse, Responder};
use clonescan_core::{AnalysisRequest, ScanResult};
use serde::Serialize;

use super::error_response;
use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub findings: ScanResult,
    pub repository_url: String,
    pub rule_set_selector: String,
    pub scan_time: String,
    pub completed_at: String,
}

pub fn configure_analyze_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/analyze", web::post().to(analyze));
}

/// 克隆仓库、扫描并返回结果
pub async fn analyze(state: web::Data<AppState>, req: web::Json<AnalysisRequest>) -> impl Responder {
    match state.orchestrator.analyze(&req).await {
        Ok(outcome) => {
            if outcome.result.parse_failed {
                tracing::warn!("Returning degraded result for {}", outcome.repository_url);
            }
            HttpResponse::Ok().json(AnalysisResponse {
                findings: outcome.result,
                repository_url: outcome.repository_url,
                rule_set_selector: outcome.selector.to_string(),
                scan_time: format!("{:?}", outcome.elapsed),
                completed_at: chrono::Local::now().to_rfc3339(),
            })
        }
        Err(e) => {
            if e.is_client_error() {
                tracing::warn!("Rejected analysis request: {}", e);
            } else {
                tracing::error!("Analysis failed: {}", e);
            }
            error_response(&e)
        }
    }
}
