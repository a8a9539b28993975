// 内置自定义规则，comprehensive 模式下写入临时规则文件交给扫描器

use crate::rules::model::{Rule, RuleMetadata, RuleSet, RuleSeverity};
use std::io::Write;
use tempfile::NamedTempFile;

const JS_LANGUAGES: [&str; 2] = ["javascript", "typescript"];

pub fn builtin_rules() -> Vec<Rule> {
    let languages: Vec<String> = JS_LANGUAGES.iter().map(|l| l.to_string()).collect();
    vec![
        Rule {
            id: "clonescan.no-console-log".to_string(),
            message: "console.log call left in source; remove it or use a structured logger".to_string(),
            severity: RuleSeverity::Warning,
            languages: languages.clone(),
            pattern: "console.log(...)".to_string(),
            metadata: Some(RuleMetadata {
                category: Some("best-practice".to_string()),
                cwe: None,
            }),
        },
        Rule {
            id: "clonescan.no-eval".to_string(),
            message: "eval() executes arbitrary code; avoid evaluating dynamic strings".to_string(),
            severity: RuleSeverity::Error,
            languages,
            pattern: "eval(...)".to_string(),
            metadata: Some(RuleMetadata {
                category: Some("security".to_string()),
                cwe: Some("CWE-95".to_string()),
            }),
        },
    ]
}

/// 把规则序列化为 YAML 写入临时文件；文件随返回值 drop 被删除
pub fn write_ephemeral(rules: &[Rule]) -> std::io::Result<NamedTempFile> {
    let rule_set = RuleSet {
        rules: rules.to_vec(),
    };
    let yaml = serde_yaml::to_string(&rule_set)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let mut file = tempfile::Builder::new()
        .prefix("clonescan-rules-")
        .suffix(".yaml")
        .tempfile()?;
    file.write_all(yaml.as_bytes())?;
    file.flush()?;

    Ok(file)
}
