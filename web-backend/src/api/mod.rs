use actix_web::{error::InternalError, web, HttpResponse};
use clonescan_core::error::CoreError;

pub mod analyze;
pub mod health;
pub mod rules;

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .configure(analyze::configure_analyze_routes)
        .configure(health::configure_health_routes)
        .configure(rules::configure_rules_routes);
}

/// 请求体无法解析时同样返回 JSON 错误
fn json_config() -> web::JsonConfig {
    web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(serde_json::json!({
            "error": format!("Invalid request body: {}", err),
            "code": "VALIDATION_ERROR"
        }));
        InternalError::from_response(err, response).into()
    })
}

pub fn error_response(err: &CoreError) -> HttpResponse {
    if err.is_client_error() {
        HttpResponse::BadRequest().json(serde_json::json!({
            "error": err.to_string(),
            "code": err.code()
        }))
    } else {
        HttpResponse::InternalServerError().json(serde_json::json!({
            "error": format!("Analysis failed: {}", err),
            "code": err.code()
        }))
    }
}
