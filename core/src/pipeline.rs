// Pipeline module - 单个分析请求的编排
// prepare -> fetch -> scan -> translate -> release

use crate::error::{CoreError, Result};
use crate::fetch::RepositoryFetcher;
use crate::report::{translate, ScanResult};
use crate::rules::model::RuleSelector;
use crate::scanner::Scanner;
use crate::scratch::{ScratchDir, WorkingTree};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// 请求体。`gitUrl` 作为 `repositoryUrl` 的别名保留
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    #[serde(default, alias = "gitUrl")]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub rule_set_selector: Option<String>,
}

impl AnalysisRequest {
    pub fn new(repository_url: impl Into<String>) -> Self {
        Self {
            repository_url: Some(repository_url.into()),
            rule_set_selector: None,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.rule_set_selector = Some(selector.into());
        self
    }

    /// 校验 URL 与选择器。任何文件系统或进程操作之前调用
    pub fn validate(&self) -> Result<(String, RuleSelector)> {
        let url = self
            .repository_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| CoreError::Validation("Please provide a repositoryUrl in the request body.".to_string()))?;

        let selector = match self.rule_set_selector.as_deref() {
            None => RuleSelector::default(),
            Some(raw) => raw.parse()?,
        };

        Ok((url.to_string(), selector))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Prepared,
    Fetched,
    Scanned,
    Translated,
    Cleaned,
    Failed,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub repository_url: String,
    pub selector: RuleSelector,
    pub result: ScanResult,
    pub elapsed: Duration,
}

pub struct Orchestrator {
    scratch: ScratchDir,
    fetcher: Arc<dyn RepositoryFetcher>,
    scanner: Arc<dyn Scanner>,
}

impl Orchestrator {
    pub fn new(scratch: ScratchDir, fetcher: Arc<dyn RepositoryFetcher>, scanner: Arc<dyn Scanner>) -> Self {
        Self {
            scratch,
            fetcher,
            scanner,
        }
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    pub fn scanner(&self) -> &Arc<dyn Scanner> {
        &self.scanner
    }

    /// 执行一次完整分析。working tree 一旦准备好，无论成功失败都会在返回前清理
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AnalysisOutcome> {
        let start = Instant::now();
        let (url, selector) = request.validate()?;
        tracing::info!("Received analysis request for: {} (rules: {})", url, selector);
        transition(&url, Stage::Received);

        let tree = match self.scratch.prepare(&url).await {
            Ok(tree) => tree,
            Err(e) => {
                tracing::error!("Analysis failed before clone: {}", e);
                transition(&url, Stage::Failed);
                return Err(e);
            }
        };
        transition(&url, Stage::Prepared);

        let outcome = self.run(&tree, &url, selector).await;
        if outcome.is_err() {
            transition(&url, Stage::Failed);
        }

        let path = tree.path().to_path_buf();
        tracing::info!("Cleaning up: {:?}", path);
        match self.scratch.release(tree).await {
            Ok(()) => transition(&url, Stage::Cleaned),
            // 清理失败只记录，不覆盖主结果
            Err(e) => tracing::error!("Failed to remove working tree {:?}: {}", path, e),
        }

        let result = outcome?;
        Ok(AnalysisOutcome {
            repository_url: url,
            selector,
            result,
            elapsed: start.elapsed(),
        })
    }

    async fn run(&self, tree: &WorkingTree, url: &str, selector: RuleSelector) -> Result<ScanResult> {
        self.fetcher.fetch(url, tree.path()).await?;
        transition(url, Stage::Fetched);

        let raw = self.scanner.scan(tree.path(), selector).await?;
        transition(url, Stage::Scanned);

        let result = translate(&raw);
        transition(url, Stage::Translated);
        Ok(result)
    }
}

fn transition(url: &str, stage: Stage) {
    tracing::debug!(repository = url, stage = ?stage, "pipeline stage");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeFetcher {
        calls: AtomicUsize,
        fail: bool,
        seen: Mutex<Vec<PathBuf>>,
    }

    #[async_trait]
    impl RepositoryFetcher for FakeFetcher {
        fn name(&self) -> String {
            "FakeFetcher".to_string()
        }

        async fn fetch(&self, _url: &str, destination: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(destination.to_path_buf());
            // 先留下部分文件，模拟 clone 中途失败
            std::fs::create_dir_all(destination.join(".git")).unwrap();
            if self.fail {
                return Err(CoreError::CloneFailed("repository not found".to_string()));
            }
            std::fs::write(destination.join("index.js"), "eval(input)").unwrap();
            Ok(())
        }
    }

    struct FakeScanner {
        output: Result<String>,
        saw_tree: Mutex<Vec<bool>>,
    }

    impl FakeScanner {
        fn returning(output: Result<String>) -> Self {
            Self {
                output,
                saw_tree: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Scanner for FakeScanner {
        fn name(&self) -> String {
            "FakeScanner".to_string()
        }

        async fn scan(&self, directory: &Path, _selector: RuleSelector) -> Result<String> {
            self.saw_tree.lock().unwrap().push(directory.join("index.js").exists());
            match &self.output {
                Ok(s) => Ok(s.clone()),
                Err(e) => Err(CoreError::ScanFailed(e.to_string())),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    fn orchestrator(root: &Path, fetcher: Arc<FakeFetcher>, scanner: Arc<FakeScanner>) -> Orchestrator {
        Orchestrator::new(ScratchDir::new(root), fetcher, scanner)
    }

    fn entries(root: &Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    const EMPTY_REPORT: &str = r#"{"results": [], "errors": []}"#;

    #[tokio::test]
    async fn missing_url_is_rejected_without_side_effects() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let orch = orchestrator(
            tmp.path(),
            fetcher.clone(),
            Arc::new(FakeScanner::returning(Ok(EMPTY_REPORT.to_string()))),
        );

        for request in [AnalysisRequest::default(), AnalysisRequest::new("   ")] {
            let err = orch.analyze(&request).await.unwrap_err();
            assert!(err.is_client_error());
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn invalid_selector_is_rejected_before_clone() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let orch = orchestrator(
            tmp.path(),
            fetcher.clone(),
            Arc::new(FakeScanner::returning(Ok(EMPTY_REPORT.to_string()))),
        );

        let request = AnalysisRequest::new("https://example.com/org/repo.git").with_selector("bogus");
        let err = orch.analyze(&request).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_RULE_SELECTOR");
        assert!(!err.is_client_error());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn scratch_failure_stops_before_fetch() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("scratch");
        std::fs::write(&root, "").unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let orch = orchestrator(
            &root,
            fetcher.clone(),
            Arc::new(FakeScanner::returning(Ok(EMPTY_REPORT.to_string()))),
        );

        let err = orch
            .analyze(&AnalysisRequest::new("https://example.com/org/repo.git"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCRATCH_IO_ERROR");
        assert!(!err.is_client_error());
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn cancelled_analysis_kills_scanner_and_removes_tree() {
        use crate::scanner::semgrep::{SemgrepConfig, SemgrepScanner};
        use std::time::Duration;

        let root = tempfile::tempdir().unwrap();
        let bin = tempfile::tempdir().unwrap();
        let pid_file = bin.path().join("pid");
        let script = bin.path().join("scanner.sh");
        // 扫描器再拉起一个后台进程，然后一直等待
        std::fs::write(&script, format!("sleep 60 & echo $! > '{}'\nwait\n", pid_file.display())).unwrap();

        let scanner = SemgrepScanner::new(SemgrepConfig {
            bin: "sh".to_string(),
            launcher_args: vec![script.display().to_string()],
            timeout: Duration::from_secs(60),
            ..SemgrepConfig::default()
        });
        let fetcher = Arc::new(FakeFetcher::default());
        let orch = Orchestrator::new(ScratchDir::new(root.path()), fetcher.clone(), Arc::new(scanner));

        let request = AnalysisRequest::new("https://example.com/org/repo.git");
        let mut analysis = Box::pin(orch.analyze(&request));

        // 等扫描器真正跑起来再放弃这个请求
        let mut started = false;
        for _ in 0..100 {
            tokio::select! {
                _ = &mut analysis => panic!("analysis finished unexpectedly"),
                _ = tokio::time::sleep(Duration::from_millis(50)) => {}
            }
            if std::fs::read_to_string(&pid_file).is_ok_and(|p| !p.trim().is_empty()) {
                started = true;
                break;
            }
        }
        assert!(started, "scanner never started");
        drop(analysis);

        assert_eq!(entries(root.path()), 0);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let stat = format!("/proc/{}/stat", pid.trim());
        let mut gone = false;
        for _ in 0..40 {
            // 不存在或已成僵尸都算终止
            let alive = std::fs::read_to_string(&stat)
                .map(|s| s.rsplit(')').next().is_some_and(|rest| !rest.trim_start().starts_with('Z')))
                .unwrap_or(false);
            if !alive {
                gone = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(gone, "scanner descendant {} still alive", pid.trim());
    }

    #[tokio::test]
    async fn success_returns_findings_and_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let scanner = Arc::new(FakeScanner::returning(Ok(EMPTY_REPORT.to_string())));
        let orch = orchestrator(tmp.path(), fetcher.clone(), scanner.clone());

        let outcome = orch
            .analyze(&AnalysisRequest::new("https://example.com/org/repo.git"))
            .await
            .unwrap();

        assert!(!outcome.result.parse_failed);
        assert!(outcome.result.findings.is_empty());
        assert_eq!(outcome.selector, RuleSelector::Standard);
        assert_eq!(outcome.repository_url, "https://example.com/org/repo.git");

        // 扫描时 working tree 存在，结束后被删除
        assert_eq!(*scanner.saw_tree.lock().unwrap(), vec![true]);
        let cloned = fetcher.seen.lock().unwrap()[0].clone();
        assert!(cloned.starts_with(tmp.path()));
        assert!(!cloned.exists());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn clone_failure_cleans_partial_tree() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher {
            fail: true,
            ..FakeFetcher::default()
        });
        let scanner = Arc::new(FakeScanner::returning(Ok(EMPTY_REPORT.to_string())));
        let orch = orchestrator(tmp.path(), fetcher.clone(), scanner.clone());

        let err = orch
            .analyze(&AnalysisRequest::new("https://example.invalid/nope.git"))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "CLONE_FAILED");
        assert!(scanner.saw_tree.lock().unwrap().is_empty());
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn scan_failure_cleans_up() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            tmp.path(),
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeScanner::returning(Err(CoreError::ScanFailed("exit code 2".to_string())))),
        );

        let err = orch
            .analyze(&AnalysisRequest::new("https://example.com/org/repo.git"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "SCAN_FAILED");
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn unparseable_output_degrades() {
        let tmp = tempfile::tempdir().unwrap();
        let orch = orchestrator(
            tmp.path(),
            Arc::new(FakeFetcher::default()),
            Arc::new(FakeScanner::returning(Ok("Scanning 3 files...\nDone".to_string()))),
        );

        let outcome = orch
            .analyze(&AnalysisRequest::new("https://example.com/org/repo.git"))
            .await
            .unwrap();
        assert!(outcome.result.parse_failed);
        assert!(outcome.result.findings.is_empty());
        assert_eq!(outcome.result.raw_output.as_deref(), Some("Scanning 3 files...\nDone"));
        assert_eq!(entries(tmp.path()), 0);
    }

    #[tokio::test]
    async fn repeated_requests_get_independent_trees() {
        let tmp = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(FakeFetcher::default());
        let orch = orchestrator(
            tmp.path(),
            fetcher.clone(),
            Arc::new(FakeScanner::returning(Ok(EMPTY_REPORT.to_string()))),
        );

        let request = AnalysisRequest::new("https://example.com/org/repo.git").with_selector("owasp");
        orch.analyze(&request).await.unwrap();
        orch.analyze(&request).await.unwrap();

        let seen = fetcher.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        assert_ne!(seen[0], seen[1]);
        assert_eq!(entries(tmp.path()), 0);
    }

    #[test]
    fn request_accepts_legacy_git_url_field() {
        let request: AnalysisRequest = serde_json::from_str(r#"{"gitUrl": "https://example.com/a.git"}"#).unwrap();
        let (url, selector) = request.validate().unwrap();
        assert_eq!(url, "https://example.com/a.git");
        assert_eq!(selector, RuleSelector::Standard);
    }
}
