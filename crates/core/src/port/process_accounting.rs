// Process Accounting Port
// Read-only access to kernel process accounting records (Linux procfs)
use async_trait::async_trait;

pub use crate::domain::accounting::SampleError;

/// Source of raw accounting records
///
/// Implementations return the file text verbatim; parsing lives in
/// `domain::accounting`.
#[async_trait]
pub trait ProcessAccounting: Send + Sync {
    /// Per-region memory accounting (`/proc/<pid>/smaps`)
    ///
    /// # Errors
    /// - SampleError::ProcessNotFound if the pid no longer exists
    async fn read_smaps(&self, pid: u32) -> Result<String, SampleError>;

    /// Per-process CPU time record (`/proc/<pid>/stat`)
    ///
    /// # Errors
    /// - SampleError::ProcessNotFound if the pid no longer exists
    async fn read_process_stat(&self, pid: u32) -> Result<String, SampleError>;

    /// System-wide CPU time record (`/proc/stat`)
    async fn read_system_stat(&self) -> Result<String, SampleError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted accounting source
    ///
    /// Each read pops the next scripted record; the last one repeats forever.
    /// An empty script for a pid-keyed record means the process is gone.
    pub struct StaticAccounting {
        pid: u32,
        smaps: Mutex<VecDeque<String>>,
        process_stat: Mutex<VecDeque<String>>,
        system_stat: Mutex<VecDeque<String>>,
    }

    impl StaticAccounting {
        pub fn new(pid: u32) -> Self {
            Self {
                pid,
                smaps: Mutex::new(VecDeque::new()),
                process_stat: Mutex::new(VecDeque::new()),
                system_stat: Mutex::new(VecDeque::new()),
            }
        }

        pub fn with_smaps(self, smaps: impl Into<String>) -> Self {
            self.smaps.lock().unwrap().push_back(smaps.into());
            self
        }

        pub fn with_process_stat(self, stat: impl Into<String>) -> Self {
            self.process_stat.lock().unwrap().push_back(stat.into());
            self
        }

        pub fn with_system_stat(self, stat: impl Into<String>) -> Self {
            self.system_stat.lock().unwrap().push_back(stat.into());
            self
        }

        fn next(queue: &Mutex<VecDeque<String>>) -> Option<String> {
            let mut q = queue.lock().unwrap();
            if q.len() > 1 {
                q.pop_front()
            } else {
                q.front().cloned()
            }
        }

        fn next_for(&self, pid: u32, queue: &Mutex<VecDeque<String>>) -> Result<String, SampleError> {
            if pid != self.pid {
                return Err(SampleError::ProcessNotFound(pid));
            }
            Self::next(queue).ok_or(SampleError::ProcessNotFound(pid))
        }
    }

    #[async_trait]
    impl ProcessAccounting for StaticAccounting {
        async fn read_smaps(&self, pid: u32) -> Result<String, SampleError> {
            self.next_for(pid, &self.smaps)
        }

        async fn read_process_stat(&self, pid: u32) -> Result<String, SampleError> {
            self.next_for(pid, &self.process_stat)
        }

        async fn read_system_stat(&self) -> Result<String, SampleError> {
            Self::next(&self.system_stat)
                .ok_or_else(|| SampleError::Io("no system stat scripted".to_string()))
        }
    }
}
