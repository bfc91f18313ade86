// Supervised Run Domain Model

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::DomainError;
use super::transcript::{FlushReport, SinkError};

/// Run ID (UUID v4), used to correlate logs of one supervised run
pub type RunId = String;

/// Immutable description of one supervised run
///
/// Created once by the caller and owned by the orchestrator for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    executable: PathBuf,
    args: Vec<String>,
    fixture: PathBuf,
    bucket: String,
    key: String,
    timeout: Duration,
}

impl RunConfig {
    /// Create a validated run configuration
    ///
    /// # Errors
    /// - DomainError::InvalidConfig if bucket or key is empty, or timeout is zero
    ///
    /// # Example
    /// ```text
    /// let config = RunConfig::new("./run", "./testFile.txt", "logs", "log", Duration::from_secs(60))?;
    /// ```
    pub fn new(
        executable: impl Into<PathBuf>,
        fixture: impl Into<PathBuf>,
        bucket: impl Into<String>,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DomainError> {
        let config = Self {
            executable: executable.into(),
            args: Vec::new(),
            fixture: fixture.into(),
            bucket: bucket.into(),
            key: key.into(),
            timeout,
        };
        config.validate()?;
        Ok(config)
    }

    /// Arguments passed to the executable
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), DomainError> {
        if self.executable.as_os_str().is_empty() {
            return Err(DomainError::InvalidConfig("executable path is empty".into()));
        }
        if self.bucket.trim().is_empty() {
            return Err(DomainError::InvalidConfig("bucket is empty".into()));
        }
        if self.key.trim().is_empty() {
            return Err(DomainError::InvalidConfig("object key is empty".into()));
        }
        if self.timeout.is_zero() {
            return Err(DomainError::InvalidConfig("timeout must be positive".into()));
        }
        Ok(())
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn fixture(&self) -> &Path {
        &self.fixture
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Abnormal exit details of the supervised child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessFailure {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub message: String,
}

/// How a supervised run ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminalStatus {
    /// Child exited on its own with a success status
    Completed { exit_code: Option<i32> },
    /// Deadline fired; child was terminated
    TimedOut {
        #[serde(with = "duration_millis")]
        after: Duration,
    },
    /// Child died abnormally (non-zero status, signal, or wait failure)
    ProcessError(ProcessFailure),
}

impl TerminalStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, TerminalStatus::Completed { .. })
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, TerminalStatus::TimedOut { .. })
    }
}

impl std::fmt::Display for TerminalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalStatus::Completed { exit_code } => match exit_code {
                Some(code) => write!(f, "COMPLETED (exit {})", code),
                None => write!(f, "COMPLETED"),
            },
            TerminalStatus::TimedOut { after } => {
                write!(f, "TIMED_OUT after {}ms", after.as_millis())
            }
            TerminalStatus::ProcessError(failure) => {
                write!(f, "PROCESS_ERROR: {}", failure.message)
            }
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Failures local to one producer task (stdin-feeder or stdout-collector)
///
/// Never fatal to the run: the sibling producer and the final flush still happen.
#[derive(Error, Debug)]
pub enum ProducerError {
    #[error("Input fixture read failed ({path}): {source}")]
    InputRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Child stdout read failed: {0}")]
    OutputRead(#[source] std::io::Error),

    /// Child closed its stdin (usually exited early)
    #[error("Write to child stdin failed after {written} lines: {source}")]
    PipeWrite {
        written: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("Producer task aborted: {0}")]
    Aborted(String),
}

impl ProducerError {
    /// Broken pipe on the child's stdin is an expected race with child exit
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            ProducerError::PipeWrite { source, .. }
                if source.kind() == std::io::ErrorKind::BrokenPipe
        )
    }
}

/// Run-level errors (only startup is fatal)
#[derive(Error, Debug)]
pub enum RunError {
    #[error("Startup failed for {executable}: {reason}")]
    Startup { executable: PathBuf, reason: String },

    #[error("Supervisor task failed: {0}")]
    Supervisor(String),
}

/// Everything the caller learns about a finished run
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub pid: u32,
    pub status: TerminalStatus,
    /// Transcript length at final flush
    pub entries: usize,
    pub faults: Vec<ProducerError>,
    pub final_flush: Result<FlushReport, SinkError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validation() {
        let ok = RunConfig::new("/bin/cat", "in.txt", "logs", "log", Duration::from_secs(1));
        assert!(ok.is_ok());

        let no_bucket = RunConfig::new("/bin/cat", "in.txt", " ", "log", Duration::from_secs(1));
        assert!(matches!(no_bucket, Err(DomainError::InvalidConfig(_))));

        let no_key = RunConfig::new("/bin/cat", "in.txt", "logs", "", Duration::from_secs(1));
        assert!(matches!(no_key, Err(DomainError::InvalidConfig(_))));

        let zero = RunConfig::new("/bin/cat", "in.txt", "logs", "log", Duration::ZERO);
        assert!(matches!(zero, Err(DomainError::InvalidConfig(_))));
    }

    #[test]
    fn test_with_args() {
        let config = RunConfig::new("/bin/sh", "in.txt", "logs", "log", Duration::from_secs(1))
            .unwrap()
            .with_args(["-c", "cat"]);
        assert_eq!(config.args(), &["-c".to_string(), "cat".to_string()]);
    }

    #[test]
    fn test_terminal_status_serialization() {
        let status = TerminalStatus::TimedOut {
            after: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "TIMED_OUT");
        assert_eq!(json["after"], 1500);
    }

    #[test]
    fn test_broken_pipe_is_expected() {
        let err = ProducerError::PipeWrite {
            written: 3,
            source: std::io::Error::from(std::io::ErrorKind::BrokenPipe),
        };
        assert!(err.is_expected());

        let err = ProducerError::OutputRead(std::io::Error::from(std::io::ErrorKind::Other));
        assert!(!err.is_expected());
    }
}
