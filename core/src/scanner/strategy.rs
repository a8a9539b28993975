// 扫描策略链：每个规则集选择器对应一组按顺序尝试的策略

use super::ExitDisposition;
use crate::error::{CoreError, Result};
use crate::rules::model::RuleSelector;
use std::future::Future;
use std::path::Path;

const OWASP_TOP_TEN: &str = "p/owasp-top-ten";
const DEFAULT_PACK: &str = "p/default";
const FRONTEND_RULESETS: [&str; 4] = ["r/javascript", "r/typescript", "r/react", "r/nextjs"];
const EXTRA_ECOSYSTEM_RULESETS: [&str; 3] = ["r/python", "r/java", "r/go"];

/// 一次扫描器调用的结果
#[derive(Debug, Clone)]
pub struct ScanAttempt {
    pub disposition: ExitDisposition,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone)]
pub struct ScanStrategy {
    pub name: &'static str,
    /// 依次以 `--config` 传给扫描器
    pub configs: Vec<String>,
    pub accept: fn(&ScanAttempt) -> bool,
}

/// 退出码表示成功（含发现问题），且确实产生了输出
pub fn produced_report(attempt: &ScanAttempt) -> bool {
    attempt.disposition.is_success() && !attempt.stdout.trim().is_empty()
}

fn configs(base: &[&str], extra: &[&Path]) -> Vec<String> {
    base.iter()
        .map(|c| c.to_string())
        .chain(extra.iter().map(|p| p.to_string_lossy().into_owned()))
        .collect()
}

/// 构造选择器对应的策略链。
///
/// `custom_rules` 只在 comprehensive 下使用；`project_config` 存在时附加到每个策略。
pub fn strategies_for(
    selector: RuleSelector,
    custom_rules: Option<&Path>,
    project_config: Option<&Path>,
) -> Vec<ScanStrategy> {
    let project: Vec<&Path> = project_config.into_iter().collect();

    match selector {
        RuleSelector::Standard => vec![
            ScanStrategy {
                name: "frontend-rulesets",
                configs: configs(&FRONTEND_RULESETS, &project),
                accept: produced_report,
            },
            ScanStrategy {
                name: "default-pack",
                configs: configs(&[DEFAULT_PACK], &project),
                accept: produced_report,
            },
        ],
        RuleSelector::Owasp => vec![ScanStrategy {
            name: "owasp-top-ten",
            configs: configs(&[OWASP_TOP_TEN], &project),
            accept: produced_report,
        }],
        RuleSelector::Comprehensive => {
            let mut extra: Vec<&Path> = custom_rules.into_iter().collect();
            extra.extend(project.iter().copied());

            let mut full = vec![OWASP_TOP_TEN];
            full.extend(FRONTEND_RULESETS);
            full.extend(EXTRA_ECOSYSTEM_RULESETS);

            vec![
                ScanStrategy {
                    name: "owasp-ecosystem-custom",
                    configs: configs(&full, &extra),
                    accept: produced_report,
                },
                ScanStrategy {
                    name: "owasp-custom",
                    configs: configs(&[OWASP_TOP_TEN], &extra),
                    accept: produced_report,
                },
            ]
        }
    }
}

/// 按顺序执行策略，返回第一个被接受的输出。
///
/// `attempt` 返回的错误（超时、输出过大、无法启动）立即终止整条链。
pub async fn run_chain<F, Fut>(strategies: &[ScanStrategy], mut attempt: F) -> Result<String>
where
    F: FnMut(ScanStrategy) -> Fut,
    Fut: Future<Output = Result<ScanAttempt>>,
{
    let mut rejected = Vec::new();

    for strategy in strategies {
        tracing::debug!("Trying scan strategy '{}'", strategy.name);
        let outcome = attempt(strategy.clone()).await?;

        if (strategy.accept)(&outcome) {
            tracing::info!("Scan strategy '{}' accepted ({:?})", strategy.name, outcome.disposition);
            return Ok(outcome.stdout);
        }

        let reason = describe_rejection(&outcome);
        tracing::warn!("Scan strategy '{}' rejected: {}", strategy.name, reason);
        rejected.push(format!("{}: {}", strategy.name, reason));
    }

    if rejected.is_empty() {
        return Err(CoreError::ScanFailed("no scan strategies configured".to_string()));
    }
    Err(CoreError::ScanFailed(rejected.join("; ")))
}

fn describe_rejection(attempt: &ScanAttempt) -> String {
    let stderr = attempt.stderr.trim();
    let last_line = stderr.lines().last().unwrap_or("");
    match attempt.disposition {
        ExitDisposition::Failed(Some(code)) if last_line.is_empty() => format!("exit code {}", code),
        ExitDisposition::Failed(Some(code)) => format!("exit code {} ({})", code, last_line),
        ExitDisposition::Failed(None) => "terminated by signal".to_string(),
        _ => "no output".to_string(),
    }
}
