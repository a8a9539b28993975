use crate::config::Settings;
use clonescan_core::{GitFetcher, Orchestrator, ScratchDir, SemgrepScanner};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    /// 启动时探测一次，/health 直接读取
    pub scanner_available: bool,
}

impl AppState {
    pub async fn new(settings: &Settings) -> anyhow::Result<Self> {
        // 初始化 scratch root
        let scratch = ScratchDir::new(&settings.scratch_root);
        scratch.ensure_root().await?;
        tracing::info!("Temporary directory: {}", scratch.root().display());

        let fetcher = Arc::new(GitFetcher::new(&settings.git_bin, settings.clone_timeout));
        let scanner = Arc::new(SemgrepScanner::new(settings.semgrep_config()));

        let state = Self::probe(Orchestrator::new(scratch, fetcher, scanner)).await;

        // 扫描器不可用时仍然启动，由 /health 暴露状态
        if state.scanner_available {
            tracing::info!("Scanner '{}' is available", settings.scanner_bin);
        } else {
            tracing::error!(
                "Scanner '{}' is not invocable; /analyze requests will fail until it is installed",
                settings.scanner_bin
            );
        }

        Ok(state)
    }

    /// 探测扫描器是否可用并缓存结果
    pub async fn probe(orchestrator: Orchestrator) -> Self {
        let scanner_available = orchestrator.scanner().is_available().await;
        Self::from_orchestrator(orchestrator, scanner_available)
    }

    pub fn from_orchestrator(orchestrator: Orchestrator, scanner_available: bool) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            scanner_available,
        }
    }
}
