use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 规则集选择器，决定扫描时加载哪些规则
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuleSelector {
    #[default]
    Standard,
    Owasp,
    Comprehensive,
}

impl RuleSelector {
    pub const ALL: [RuleSelector; 3] = [
        RuleSelector::Standard,
        RuleSelector::Owasp,
        RuleSelector::Comprehensive,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RuleSelector::Standard => "standard",
            RuleSelector::Owasp => "owasp",
            RuleSelector::Comprehensive => "comprehensive",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RuleSelector::Standard => "Broad default rule set for JavaScript, TypeScript, React and Next.js",
            RuleSelector::Owasp => "Rules mapped to the OWASP Top Ten categories",
            RuleSelector::Comprehensive => {
                "OWASP Top Ten plus per-ecosystem rule packs and the built-in custom rules"
            }
        }
    }
}

impl fmt::Display for RuleSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleSelector {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(RuleSelector::Standard),
            "owasp" => Ok(RuleSelector::Owasp),
            "comprehensive" => Ok(RuleSelector::Comprehensive),
            _ => Err(CoreError::InvalidRuleSelector(s.to_string())),
        }
    }
}

/// 单条扫描器规则（Semgrep 规则文件格式）
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Rule {
    pub id: String,
    pub message: String,
    pub severity: RuleSeverity,
    pub languages: Vec<String>,
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<RuleMetadata>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuleMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwe: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum RuleSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
}
