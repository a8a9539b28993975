// Fetch module - 仓库克隆

use crate::error::{CoreError, Result};
use crate::process::{run_bounded, ProcessError, ProcessLimits};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use walkdir::WalkDir;

/// clone 的输出只用于错误信息
const CLONE_STDOUT_LIMIT: usize = 1024 * 1024;

/// 仓库获取 trait - 把 URL 克隆到不存在的目标目录
#[async_trait]
pub trait RepositoryFetcher: Send + Sync {
    fn name(&self) -> String;

    async fn fetch(&self, url: &str, destination: &Path) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct GitFetcher {
    git_bin: String,
    timeout: Duration,
}

impl GitFetcher {
    pub fn new(git_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            git_bin: git_bin.into(),
            timeout,
        }
    }
}

#[async_trait]
impl RepositoryFetcher for GitFetcher {
    fn name(&self) -> String {
        "GitFetcher".to_string()
    }

    async fn fetch(&self, url: &str, destination: &Path) -> Result<()> {
        tracing::info!("Starting clone of: {} into {:?}", url, destination);

        let mut cmd = Command::new(&self.git_bin);
        cmd.arg("clone")
            .arg("--quiet")
            .arg("--")
            .arg(url)
            .arg(destination)
            // 需要凭据时直接失败，不要卡在交互提示
            .env("GIT_TERMINAL_PROMPT", "0");

        let limits = ProcessLimits {
            timeout: self.timeout,
            max_stdout_bytes: CLONE_STDOUT_LIMIT,
        };

        let output = run_bounded(cmd, limits).await.map_err(|e| match e {
            ProcessError::Timeout(d) => CoreError::CloneFailed(format!("clone timed out after {:?}", d)),
            other => CoreError::CloneFailed(other.to_string()),
        })?;

        if !output.status.success() {
            let message = output.stderr.trim();
            let message = if message.is_empty() {
                format!("{} exited with {}", self.git_bin, output.status)
            } else {
                message.to_string()
            };
            tracing::error!("Error cloning repository: {}", message);
            return Err(CoreError::CloneFailed(message));
        }

        verify_clone(destination).await?;
        tracing::info!("Successfully cloned to: {:?}", destination);

        if tracing::enabled!(tracing::Level::DEBUG) {
            let files = tree_file_count(destination).await;
            tracing::debug!("Working tree {:?} contains {} files", destination, files);
        }

        Ok(())
    }
}

/// clone 报告成功但目录不存在或为空时视为失败
pub async fn verify_clone(destination: &Path) -> Result<()> {
    let mut entries = match tokio::fs::read_dir(destination).await {
        Ok(entries) => entries,
        Err(_) => return Err(CoreError::CloneVerificationFailed(destination.to_path_buf())),
    };

    match entries.next_entry().await {
        Ok(Some(_)) => Ok(()),
        _ => Err(CoreError::CloneVerificationFailed(destination.to_path_buf())),
    }
}

/// 在阻塞线程池里统计文件数，大仓库的遍历不占用 actix worker
pub async fn tree_file_count(root: &Path) -> usize {
    let root = root.to_path_buf();
    match tokio::task::spawn_blocking(move || count_files(&root)).await {
        Ok(files) => files,
        Err(e) => {
            tracing::warn!("File count task failed: {}", e);
            0
        }
    }
}

/// 统计 working tree 中的文件数（跳过 .git）
pub fn count_files(root: &Path) -> usize {
    WalkDir::new(root)
        .into_iter()
        .filter_entry(|e| e.file_name() != ".git")
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn fetcher(bin: &str) -> GitFetcher {
        GitFetcher::new(bin, Duration::from_secs(10))
    }

    #[tokio::test]
    async fn nonzero_exit_is_clone_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("repo");

        let err = fetcher("false")
            .fetch("https://example.invalid/org/repo.git", &dest)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CLONE_FAILED");
    }

    #[tokio::test]
    async fn success_without_directory_fails_verification() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("repo");

        // `true` 忽略参数并以 0 退出，但什么都不会创建
        let err = fetcher("true")
            .fetch("https://example.com/org/repo.git", &dest)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "CLONE_VERIFICATION_FAILED");
    }

    #[tokio::test]
    async fn missing_binary_is_clone_failed() {
        let tmp = tempfile::tempdir().unwrap();
        let err = fetcher("/nonexistent/git")
            .fetch("https://example.com/org/repo.git", &tmp.path().join("repo"))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CloneFailed(_)));
    }

    #[tokio::test]
    async fn verify_rejects_empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("empty");
        std::fs::create_dir(&dest).unwrap();
        assert!(verify_clone(&dest).await.is_err());

        std::fs::write(dest.join("README.md"), "# hi").unwrap();
        assert!(verify_clone(&dest).await.is_ok());
    }

    #[test]
    fn count_skips_git_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git/objects")).unwrap();
        std::fs::write(tmp.path().join(".git/HEAD"), "ref").unwrap();
        std::fs::create_dir_all(tmp.path().join("src")).unwrap();
        std::fs::write(tmp.path().join("src/app.ts"), "").unwrap();
        std::fs::write(tmp.path().join("package.json"), "{}").unwrap();

        assert_eq!(count_files(tmp.path()), 2);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn tree_count_works_on_a_single_threaded_runtime() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git/config"), "").unwrap();
        std::fs::write(tmp.path().join("index.js"), "").unwrap();

        assert_eq!(tree_file_count(tmp.path()).await, 1);
        assert_eq!(tree_file_count(&tmp.path().join("missing")).await, 0);
    }
}
