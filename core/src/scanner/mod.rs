// Scanner module - 扫描器模块
// 定义扫描器的核心接口与退出码语义

pub mod semgrep;
pub mod strategy;

use crate::error::Result;
use crate::rules::model::RuleSelector;
use async_trait::async_trait;
use std::path::Path;

pub use semgrep::{SemgrepConfig, SemgrepScanner};

/// 扫描器 trait - 对目录执行一次扫描，返回原始输出（预期为 JSON）
#[async_trait]
pub trait Scanner: Send + Sync {
    /// 返回扫描器名称
    fn name(&self) -> String;

    async fn scan(&self, directory: &Path, selector: RuleSelector) -> Result<String>;

    /// 扫描器是否可以被调用
    async fn is_available(&self) -> bool;
}

/// 扫描器保留的 "发现问题" 退出码
pub const FINDINGS_EXIT_CODE: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDisposition {
    Clean,
    FindingsPresent,
    /// 其余非零退出码，或被信号终止（None）
    Failed(Option<i32>),
}

impl ExitDisposition {
    pub fn from_code(code: Option<i32>) -> Self {
        match code {
            Some(0) => ExitDisposition::Clean,
            Some(FINDINGS_EXIT_CODE) => ExitDisposition::FindingsPresent,
            other => ExitDisposition::Failed(other),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, ExitDisposition::Failed(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_mapping() {
        assert_eq!(ExitDisposition::from_code(Some(0)), ExitDisposition::Clean);
        assert_eq!(ExitDisposition::from_code(Some(1)), ExitDisposition::FindingsPresent);
        assert_eq!(ExitDisposition::from_code(Some(2)), ExitDisposition::Failed(Some(2)));
        assert_eq!(ExitDisposition::from_code(Some(-1)), ExitDisposition::Failed(Some(-1)));
        assert_eq!(ExitDisposition::from_code(None), ExitDisposition::Failed(None));

        assert!(ExitDisposition::FindingsPresent.is_success());
        assert!(!ExitDisposition::Failed(Some(7)).is_success());
    }
}
