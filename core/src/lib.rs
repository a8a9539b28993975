// clonescan Core Library
// 克隆 -> 扫描 -> 翻译 -> 清理 流水线的核心实现

pub mod fetch;
pub mod pipeline;
pub mod process;
pub mod report;
pub mod rules;
pub mod scanner;
pub mod scratch;

// 重新导出常用类型
pub use fetch::{GitFetcher, RepositoryFetcher};
pub use pipeline::{AnalysisOutcome, AnalysisRequest, Orchestrator, Stage};
pub use report::{translate, Finding, Location, ScanResult, Severity};
pub use rules::model::RuleSelector;
pub use scanner::{Scanner, SemgrepScanner};
pub use scratch::{ScratchDir, WorkingTree};

pub mod error {
    use std::path::PathBuf;
    use std::time::Duration;
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum CoreError {
        #[error("Validation error: {0}")]
        Validation(String),

        #[error("Scratch directory error at {path:?}: {source}")]
        ScratchIo {
            path: PathBuf,
            #[source]
            source: std::io::Error,
        },

        #[error("Failed to clone repository: {0}")]
        CloneFailed(String),

        #[error("Repository directory not found after clone: {0:?}")]
        CloneVerificationFailed(PathBuf),

        #[error("Unknown rule set selector '{0}'")]
        InvalidRuleSelector(String),

        #[error("Scan failed: {0}")]
        ScanFailed(String),

        #[error("Scan timed out after {0:?}")]
        ScanTimeout(Duration),

        #[error("Scanner output exceeded {0} bytes")]
        ScanOutputTooLarge(usize),
    }

    impl CoreError {
        pub fn scratch_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
            CoreError::ScratchIo {
                path: path.into(),
                source,
            }
        }

        /// 对外暴露的稳定错误码
        pub fn code(&self) -> &'static str {
            match self {
                CoreError::Validation(_) => "VALIDATION_ERROR",
                CoreError::ScratchIo { .. } => "SCRATCH_IO_ERROR",
                CoreError::CloneFailed(_) => "CLONE_FAILED",
                CoreError::CloneVerificationFailed(_) => "CLONE_VERIFICATION_FAILED",
                CoreError::InvalidRuleSelector(_) => "INVALID_RULE_SELECTOR",
                CoreError::ScanFailed(_) => "SCAN_FAILED",
                CoreError::ScanTimeout(_) => "SCAN_TIMEOUT",
                CoreError::ScanOutputTooLarge(_) => "SCAN_OUTPUT_TOO_LARGE",
            }
        }

        pub fn is_client_error(&self) -> bool {
            matches!(self, CoreError::Validation(_))
        }
    }

    pub type Result<T> = std::result::Result<T, CoreError>;
}
