use actix_web::{web, HttpResponse, Responder};
use clonescan_core::rules::custom::builtin_rules;
use clonescan_core::scanner::strategy::strategies_for;
use clonescan_core::RuleSelector;
use serde::Serialize;

/// 规则集选择器说明（与扫描器实际调用保持一致）
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorResponse {
    pub selector: String,
    pub description: String,
    pub default: bool,
    pub strategies: Vec<StrategyResponse>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_rules: Vec<CustomRuleResponse>,
}

#[derive(Serialize)]
pub struct StrategyResponse {
    pub name: String,
    pub configs: Vec<String>,
}

#[derive(Serialize)]
pub struct CustomRuleResponse {
    pub id: String,
    pub message: String,
    pub pattern: String,
}

pub fn configure_rules_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/rules", web::get().to(get_rules));
}

pub fn describe_selectors() -> Vec<SelectorResponse> {
    RuleSelector::ALL
        .iter()
        .map(|selector| {
            let custom_rules = match selector {
                RuleSelector::Comprehensive => builtin_rules()
                    .into_iter()
                    .map(|r| CustomRuleResponse {
                        id: r.id,
                        message: r.message,
                        pattern: r.pattern,
                    })
                    .collect(),
                _ => Vec::new(),
            };

            SelectorResponse {
                selector: selector.to_string(),
                description: selector.description().to_string(),
                default: *selector == RuleSelector::default(),
                strategies: strategies_for(*selector, None, None)
                    .into_iter()
                    .map(|s| StrategyResponse {
                        name: s.name.to_string(),
                        configs: s.configs,
                    })
                    .collect(),
                custom_rules,
            }
        })
        .collect()
}

/// 获取可用的规则集选择器
pub async fn get_rules() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "selectors": describe_selectors()
    }))
}
