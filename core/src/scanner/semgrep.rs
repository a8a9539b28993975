use super::strategy::{self, ScanAttempt, ScanStrategy};
use super::{ExitDisposition, Scanner};
use crate::error::{CoreError, Result};
use crate::process::{run_bounded, ProcessError, ProcessLimits};
use crate::rules::custom;
use crate::rules::model::RuleSelector;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;

const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct SemgrepConfig {
    pub bin: String,
    /// 插在 `scan` 之前的参数，例如 `python3 -m semgrep` 中的 `-m semgrep`
    pub launcher_args: Vec<String>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub max_target_bytes: u64,
    /// 项目级配置文件，存在时才会传给扫描器
    pub project_config: Option<PathBuf>,
}

impl Default for SemgrepConfig {
    fn default() -> Self {
        Self {
            bin: "semgrep".to_string(),
            launcher_args: Vec::new(),
            timeout: Duration::from_secs(300),
            max_output_bytes: 50 * 1024 * 1024,
            max_target_bytes: 100_000_000,
            project_config: None,
        }
    }
}

pub struct SemgrepScanner {
    config: SemgrepConfig,
}

impl SemgrepScanner {
    pub fn new(config: SemgrepConfig) -> Self {
        Self { config }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.config.bin);
        cmd.args(&self.config.launcher_args);
        cmd
    }

    async fn project_config(&self) -> Option<PathBuf> {
        let path = self.config.project_config.as_ref()?;
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => Some(path.clone()),
            _ => {
                tracing::debug!("Project scan config {:?} not present, skipping", path);
                None
            }
        }
    }

    async fn invoke(&self, directory: &Path, strategy: ScanStrategy) -> Result<ScanAttempt> {
        let mut cmd = self.command();
        cmd.arg("scan")
            .arg("--json")
            .arg("--error")
            .arg(format!("--max-target-bytes={}", self.config.max_target_bytes));
        for config in &strategy.configs {
            cmd.arg("--config").arg(config);
        }
        cmd.arg(directory);

        tracing::info!(
            "Running {} on directory: {:?} (strategy '{}')",
            self.config.bin,
            directory,
            strategy.name
        );

        let limits = ProcessLimits {
            timeout: self.config.timeout,
            max_stdout_bytes: self.config.max_output_bytes,
        };

        let output = run_bounded(cmd, limits).await.map_err(|e| match e {
            ProcessError::Timeout(d) => CoreError::ScanTimeout(d),
            ProcessError::OutputTooLarge(n) => CoreError::ScanOutputTooLarge(n),
            other => CoreError::ScanFailed(other.to_string()),
        })?;

        let disposition = ExitDisposition::from_code(output.status.code());
        match disposition {
            ExitDisposition::Clean => tracing::debug!("Scanner exited cleanly"),
            ExitDisposition::FindingsPresent => tracing::debug!("Scanner exited with findings present"),
            ExitDisposition::Failed(code) => {
                tracing::error!("Scanner failed with exit code {:?}: {}", code, output.stderr.trim())
            }
        }

        Ok(ScanAttempt {
            disposition,
            stdout: output.stdout_lossy(),
            stderr: output.stderr,
        })
    }
}

#[async_trait]
impl Scanner for SemgrepScanner {
    fn name(&self) -> String {
        "Semgrep".to_string()
    }

    async fn scan(&self, directory: &Path, selector: RuleSelector) -> Result<String> {
        if tokio::fs::metadata(directory).await.is_err() {
            return Err(CoreError::ScanFailed(format!("Directory does not exist: {:?}", directory)));
        }

        // 临时规则文件在本函数返回时随 drop 删除，无论扫描成败
        let custom_rules = match selector {
            RuleSelector::Comprehensive => Some(
                custom::write_ephemeral(&custom::builtin_rules())
                    .map_err(|e| CoreError::ScanFailed(format!("failed to write custom rule file: {}", e)))?,
            ),
            _ => None,
        };

        let project_config = self.project_config().await;
        let strategies = strategy::strategies_for(
            selector,
            custom_rules.as_ref().map(|f| f.path()),
            project_config.as_deref(),
        );

        strategy::run_chain(&strategies, |s| self.invoke(directory, s)).await
    }

    async fn is_available(&self) -> bool {
        let mut cmd = self.command();
        cmd.arg("--version");
        let limits = ProcessLimits {
            timeout: VERSION_PROBE_TIMEOUT,
            max_stdout_bytes: 64 * 1024,
        };

        match run_bounded(cmd, limits).await {
            Ok(output) if output.status.success() => {
                tracing::debug!("{} version {}", self.config.bin, output.stdout_lossy().trim());
                true
            }
            Ok(output) => {
                tracing::warn!("{} --version exited with {}", self.config.bin, output.status);
                false
            }
            Err(e) => {
                tracing::warn!("{} is not invocable: {}", self.config.bin, e);
                false
            }
        }
    }
}
