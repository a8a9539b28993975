// Process module - 外部进程执行
// 统一处理超时、输出上限与子进程回收

use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};

/// stderr 只保留末尾这么多字节，足够拿来拼错误信息
const STDERR_TAIL_BYTES: usize = 64 * 1024;

const READ_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct ProcessLimits {
    pub timeout: Duration,
    pub max_stdout_bytes: usize,
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    #[error("process timed out after {0:?}")]
    Timeout(Duration),

    #[error("process output exceeded {0} bytes")]
    OutputTooLarge(usize),

    #[error("process I/O error: {0}")]
    Io(#[source] io::Error),
}

enum Finish {
    Exited(Vec<u8>, ExitStatus),
    Overflow,
}

/// 子进程退出后，等待 stderr 读完的最长时间
const STDERR_GRACE: Duration = Duration::from_millis(500);

/// 运行命令并收集输出。
///
/// 子进程放在独立的进程组里。超时、stdout 超出上限或读取失败时整个进程组
/// 都会被 kill；正常退出后残留的后代进程同样会被清掉。调用方的 future 被
/// 丢弃时由 `ProcessGroup` 的 Drop 负责终止。
pub async fn run_bounded(mut cmd: Command, limits: ProcessLimits) -> Result<ProcessOutput, ProcessError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(ProcessError::Spawn)?;
    let group = ProcessGroup::new(child.id());
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // stderr 单独读，避免管道写满把子进程卡住
    let mut stderr_task = tokio::spawn(read_tail(stderr, STDERR_TAIL_BYTES));

    let outcome = tokio::time::timeout(limits.timeout, async {
        match read_capped(stdout, limits.max_stdout_bytes).await? {
            Some(bytes) => {
                let status = child.wait().await?;
                Ok::<_, io::Error>(Finish::Exited(bytes, status))
            }
            None => Ok(Finish::Overflow),
        }
    })
    .await;

    match outcome {
        Ok(Ok(Finish::Exited(stdout, status))) => {
            // 后台后代进程可能还握着 stderr 管道
            group.kill();
            let stderr = match tokio::time::timeout(STDERR_GRACE, &mut stderr_task).await {
                Ok(joined) => joined.unwrap_or_default(),
                Err(_) => {
                    stderr_task.abort();
                    String::new()
                }
            };
            Ok(ProcessOutput {
                status,
                stdout,
                stderr,
            })
        }
        Ok(Ok(Finish::Overflow)) => {
            terminate(&group, &mut child).await;
            stderr_task.abort();
            Err(ProcessError::OutputTooLarge(limits.max_stdout_bytes))
        }
        Ok(Err(e)) => {
            terminate(&group, &mut child).await;
            stderr_task.abort();
            Err(ProcessError::Io(e))
        }
        Err(_) => {
            terminate(&group, &mut child).await;
            stderr_task.abort();
            Err(ProcessError::Timeout(limits.timeout))
        }
    }
}

async fn terminate(group: &ProcessGroup, child: &mut Child) {
    group.kill();
    // kill() 会发送 SIGKILL 并等待回收
    if let Err(e) = child.kill().await {
        tracing::warn!("Failed to kill child process {:?}: {}", child.id(), e);
    }
}

/// 以子进程 pid 为组号的进程组，Drop 时对整个组发 SIGKILL
struct ProcessGroup {
    pgid: Option<u32>,
}

impl ProcessGroup {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    #[cfg(unix)]
    fn kill(&self) {
        let Some(pgid) = self.pgid.and_then(|id| libc::pid_t::try_from(id).ok()) else {
            return;
        };
        // 组内已无进程时返回 ESRCH，忽略即可
        // SAFETY: killpg 只读取参数，不涉及内存
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                tracing::warn!("Failed to kill process group {}: {}", pgid, err);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill(&self) {}
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// 读到 EOF；超过 `cap` 字节时返回 None
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> io::Result<Option<Vec<u8>>> {
    let Some(mut reader) = reader else {
        return Ok(Some(Vec::new()));
    };

    let mut buf = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(Some(buf));
        }
        if buf.len() + n > cap {
            return Ok(None);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn read_tail<R: AsyncRead + Unpin>(reader: Option<R>, keep: usize) -> String {
    let Some(mut reader) = reader else {
        return String::new();
    };

    let mut buf: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > keep {
                    let excess = buf.len() - keep;
                    buf.drain(..excess);
                }
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
