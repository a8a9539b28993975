use clonescan_core::scanner::SemgrepConfig;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// 运行配置，全部来自环境变量（可由 .env 提供）
#[derive(Debug, Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub scratch_root: PathBuf,
    pub scan_config_path: Option<PathBuf>,
    pub scanner_bin: String,
    pub scanner_args: Vec<String>,
    pub git_bin: String,
    pub scan_timeout: Duration,
    pub clone_timeout: Duration,
    pub max_output_bytes: usize,
    pub max_target_bytes: u64,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // SCANNER_BIN 可以带前缀参数，例如 "python3 -m semgrep"
        let scanner = get("SCANNER_BIN").unwrap_or_else(|| "semgrep".to_string());
        let mut scanner_parts = scanner.split_whitespace().map(str::to_string);
        let scanner_bin = scanner_parts.next().unwrap_or_else(|| "semgrep".to_string());
        let scanner_args: Vec<String> = scanner_parts.collect();

        Ok(Self {
            host: get("BIND_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or("PORT", get("PORT"), 3000)?,
            scratch_root: get("SCRATCH_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("clonescan")),
            scan_config_path: get("SCAN_CONFIG_PATH").map(PathBuf::from),
            scanner_bin,
            scanner_args,
            git_bin: get("GIT_BIN").unwrap_or_else(|| "git".to_string()),
            scan_timeout: Duration::from_secs(parse_or("SCAN_TIMEOUT_SECS", get("SCAN_TIMEOUT_SECS"), 300)?),
            clone_timeout: Duration::from_secs(parse_or("CLONE_TIMEOUT_SECS", get("CLONE_TIMEOUT_SECS"), 300)?),
            max_output_bytes: parse_or("SCAN_MAX_OUTPUT_BYTES", get("SCAN_MAX_OUTPUT_BYTES"), 50 * 1024 * 1024)?,
            max_target_bytes: parse_or("SCAN_MAX_TARGET_BYTES", get("SCAN_MAX_TARGET_BYTES"), 100_000_000)?,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn semgrep_config(&self) -> SemgrepConfig {
        SemgrepConfig {
            bin: self.scanner_bin.clone(),
            launcher_args: self.scanner_args.clone(),
            timeout: self.scan_timeout,
            max_output_bytes: self.max_output_bytes,
            max_target_bytes: self.max_target_bytes,
            project_config: self.scan_config_path.clone(),
        }
    }
}

fn parse_or<T>(var: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
