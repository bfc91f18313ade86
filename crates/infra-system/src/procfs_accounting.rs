// Procfs accounting source
// reason: tokio::fs so a slow /proc read never stalls a runtime worker
use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tracing::trace;

use proctor_core::port::process_accounting::{ProcessAccounting, SampleError};

const DEFAULT_PROC_ROOT: &str = "/proc";

/// Reads accounting records from a procfs mount
pub struct ProcfsAccounting {
    root: PathBuf,
}

impl ProcfsAccounting {
    /// Procfs at `/proc`
    pub fn new() -> Self {
        Self::with_root(DEFAULT_PROC_ROOT)
    }

    /// Procfs mounted elsewhere (containers, fixture trees in tests)
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn read_pid_file(&self, pid: u32, file: &str) -> Result<String, SampleError> {
        let path = self.root.join(pid.to_string()).join(file);
        read(&path).await.map_err(|e| map_pid_error(pid, &path, e))
    }
}

impl Default for ProcfsAccounting {
    fn default() -> Self {
        Self::new()
    }
}

async fn read(path: &Path) -> io::Result<String> {
    let text = tokio::fs::read_to_string(path).await?;
    trace!(path = %path.display(), bytes = text.len(), "Read accounting record");
    Ok(text)
}

/// A vanished pid shows up as ENOENT, or ESRCH when it exits mid-read
fn map_pid_error(pid: u32, path: &Path, err: io::Error) -> SampleError {
    if err.kind() == io::ErrorKind::NotFound || is_esrch(&err) {
        SampleError::ProcessNotFound(pid)
    } else {
        SampleError::Io(format!("{}: {}", path.display(), err))
    }
}

#[cfg(unix)]
fn is_esrch(err: &io::Error) -> bool {
    err.raw_os_error() == Some(nix::errno::Errno::ESRCH as i32)
}

#[cfg(not(unix))]
fn is_esrch(_err: &io::Error) -> bool {
    false
}

#[async_trait]
impl ProcessAccounting for ProcfsAccounting {
    async fn read_smaps(&self, pid: u32) -> Result<String, SampleError> {
        self.read_pid_file(pid, "smaps").await
    }

    async fn read_process_stat(&self, pid: u32) -> Result<String, SampleError> {
        self.read_pid_file(pid, "stat").await
    }

    async fn read_system_stat(&self) -> Result<String, SampleError> {
        let path = self.root.join("stat");
        read(&path)
            .await
            .map_err(|e| SampleError::Io(format!("{}: {}", path.display(), e)))
    }
}
