// Scratch module - 临时工作目录管理
// 每个请求在 scratch root 下拥有一个独立的 working tree

use crate::error::{CoreError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// 无法从 URL 推导出目录名时使用
pub const DEFAULT_TREE_NAME: &str = "repo";

#[derive(Debug, Clone)]
pub struct ScratchDir {
    root: PathBuf,
}

/// 一次请求独占的克隆目录。
///
/// 未经 [`ScratchDir::release`] 就被丢弃时（例如客户端断开导致请求 future 被取消），
/// Drop 会同步删除目录。
#[derive(Debug)]
pub struct WorkingTree {
    path: PathBuf,
    repository_url: String,
    armed: bool,
}

impl WorkingTree {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn repository_url(&self) -> &str {
        &self.repository_url
    }
}

impl Drop for WorkingTree {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => tracing::debug!("Removed abandoned working tree {:?}", self.path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove abandoned working tree {:?}: {}", self.path, e),
        }
    }
}

impl ScratchDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 启动时调用，root 不存在则创建
    pub async fn ensure_root(&self) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| CoreError::scratch_io(&self.root, e))
    }

    pub async fn is_ready(&self) -> bool {
        tokio::fs::metadata(&self.root)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    /// 为一次请求准备目录路径；返回时该路径保证不存在
    pub async fn prepare(&self, repository_url: &str) -> Result<WorkingTree> {
        let name = format!("{}_{}", derive_tree_name(repository_url), Uuid::new_v4().simple());
        let path = self.root.join(name);

        // 名字带 uuid，几乎不会撞上；撞上了也要保证返回时路径不存在
        match tokio::fs::remove_dir_all(&path).await {
            Ok(()) => tracing::info!("Removed stale directory at {:?}", path),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(CoreError::scratch_io(&path, e)),
        }

        Ok(WorkingTree {
            path,
            repository_url: repository_url.to_string(),
            armed: true,
        })
    }

    /// 递归删除 working tree；目录已不存在时视为成功
    pub async fn release(&self, mut tree: WorkingTree) -> std::io::Result<()> {
        tree.armed = false;
        match tokio::fs::remove_dir_all(&tree.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// 进程退出前尽力清理整个 root
    pub async fn remove_root(&self) {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => tracing::info!("Removed scratch root {:?}", self.root),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove scratch root {:?}: {}", self.root, e),
        }
    }
}

/// 取 URL 最后一段并去掉 `.git` 后缀，只保留文件名安全字符
pub fn derive_tree_name(repository_url: &str) -> String {
    let trimmed = repository_url.trim().trim_end_matches('/');
    let segment = trimmed
        .rsplit(|c| c == '/' || c == ':' || c == '\\')
        .next()
        .unwrap_or("");
    let segment = segment.strip_suffix(".git").unwrap_or(segment);

    let name: String = segment
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if name.is_empty() || name.chars().all(|c| c == '.') {
        DEFAULT_TREE_NAME.to_string()
    } else {
        name
    }
}
