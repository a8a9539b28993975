// Report module - 扫描器 JSON 输出的解析与归一化

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// 漏洞发现结果
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub rule_id: String,
    pub severity: Severity,
    pub message: String,
    pub location: Location,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owasp_category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub path: String,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    /// 兼容扫描器新旧两套严重级别
    pub fn from_scanner(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "CRITICAL" => Severity::Critical,
            "ERROR" | "HIGH" => Severity::Error,
            "WARNING" | "WARN" | "MEDIUM" => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScanResult {
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub errors: Vec<serde_json::Value>,
    pub parse_failed: bool,
    /// 仅在解析失败时保留，用于诊断
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_output: Option<String>,
}

impl ScanResult {
    pub fn degraded(raw_output: String) -> Self {
        Self {
            findings: Vec::new(),
            errors: Vec::new(),
            parse_failed: true,
            raw_output: Some(raw_output),
        }
    }
}

#[derive(Deserialize)]
struct RawReport {
    results: Vec<RawResult>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawResult {
    check_id: String,
    path: String,
    start: RawPosition,
    #[serde(default)]
    end: Option<RawPosition>,
    #[serde(default)]
    extra: RawExtra,
}

#[derive(Deserialize)]
struct RawPosition {
    line: usize,
}

#[derive(Deserialize, Default)]
struct RawExtra {
    #[serde(default)]
    message: String,
    #[serde(default)]
    severity: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
}

/// 解析扫描器输出。永远不会失败：无法解析时返回 `parse_failed = true` 的结果。
pub fn translate(raw_output: &str) -> ScanResult {
    let report: RawReport = match serde_json::from_str(raw_output) {
        Ok(report) => report,
        Err(e) => {
            tracing::warn!("Scanner output is not a valid report ({}); returning degraded result", e);
            return ScanResult::degraded(raw_output.to_string());
        }
    };

    let mut findings: Vec<Finding> = report.results.into_iter().map(into_finding).collect();
    findings.sort_by(|a, b| {
        a.location
            .path
            .cmp(&b.location.path)
            .then(a.location.start_line.cmp(&b.location.start_line))
    });

    tracing::info!(
        "Analysis complete. Found {} results, {} scanner errors",
        findings.len(),
        report.errors.len()
    );

    ScanResult {
        findings,
        errors: report.errors,
        parse_failed: false,
        raw_output: None,
    }
}

fn into_finding(raw: RawResult) -> Finding {
    let owasp_category = owasp_category(&raw.check_id, &raw.extra.metadata);
    let start_line = raw.start.line;
    let end_line = raw.end.map(|p| p.line).unwrap_or(start_line).max(start_line);

    Finding {
        severity: raw
            .extra
            .severity
            .as_deref()
            .map(Severity::from_scanner)
            .unwrap_or(Severity::Info),
        message: raw.extra.message,
        location: Location {
            path: raw.path,
            start_line,
            end_line,
        },
        owasp_category,
        rule_id: raw.check_id,
    }
}

fn metadata_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bA(\d{1,2}):(\d{4})\b").ok()).as_ref()
}

fn rule_id_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)owasp[-_.]?a(\d{1,2})(?:[-_.:]?(\d{4}))?").ok())
        .as_ref()
}

/// 先看 metadata.owasp，再看规则 ID；都识别不出时返回 None
pub fn owasp_category(rule_id: &str, metadata: &serde_json::Value) -> Option<String> {
    let tags: Vec<&str> = match metadata.get("owasp") {
        Some(serde_json::Value::String(s)) => vec![s.as_str()],
        Some(serde_json::Value::Array(items)) => items.iter().filter_map(|v| v.as_str()).collect(),
        _ => Vec::new(),
    };

    if let Some(re) = metadata_regex() {
        for tag in tags {
            if let Some(caps) = re.captures(tag) {
                let number: u32 = caps[1].parse().ok()?;
                return Some(format!("A{:02}:{}", number, &caps[2]));
            }
        }
    }

    let caps = rule_id_regex()?.captures(rule_id)?;
    let number: u32 = caps[1].parse().ok()?;
    Some(match caps.get(2) {
        Some(year) => format!("A{:02}:{}", number, year.as_str()),
        None => format!("A{:02}", number),
    })
}
