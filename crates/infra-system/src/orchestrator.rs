// Process Orchestrator
// reason: tokio::process for async pipes, nix for process-group signals
//
// Supervises exactly one child per run:
// - stdin-feeder and stdout-collector append to one shared LogAggregator
// - every 5th unified entry requests a flush from the background flusher
// - deadline expiry terminates the child's process group
// - once the child is reaped its group is swept so the pipes reach EOF
// - producers and the flusher are joined before the single final flush
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, warn};

use proctor_core::application::constants::{
    PRODUCER_DRAIN_TIMEOUT, TERMINATE_GRACE, TIMEOUT_MARKER_PREFIX,
};
use proctor_core::application::{
    exit_channel, spawn_flusher, ExitNotifier, ExitWatch, FlushRequests, LogAggregator, LogSink,
};
use proctor_core::domain::{
    LogEntry, ProcessFailure, ProducerError, RunConfig, RunError, RunId, RunReport, TerminalStatus,
};
use proctor_core::port::{IdProvider, ObjectStore, TimeProvider};

type ProducerHandle = JoinHandle<Result<u64, ProducerError>>;

/// Starts and supervises runs; cheap to share behind an Arc
pub struct Orchestrator {
    store: Arc<dyn ObjectStore>,
    time_provider: Arc<dyn TimeProvider>,
    id_provider: Arc<dyn IdProvider>,
}

impl Orchestrator {
    /// Create a new orchestrator
    ///
    /// # Arguments
    /// * `store` - Object store receiving transcript flushes
    /// * `time_provider` - Clock for the timeout marker
    /// * `id_provider` - Run ID source
    ///
    /// # Example
    /// ```ignore
    /// let orchestrator = Orchestrator::new(
    ///     Arc::new(S3ObjectStore::connect(&store_config).await),
    ///     Arc::new(SystemTimeProvider),
    ///     Arc::new(UuidProvider),
    /// );
    /// ```
    pub fn new(
        store: Arc<dyn ObjectStore>,
        time_provider: Arc<dyn TimeProvider>,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            store,
            time_provider,
            id_provider,
        }
    }

    /// Start the child and both producers
    ///
    /// The deadline starts counting when the child is spawned.
    ///
    /// # Errors
    /// - RunError::Startup if the process or its pipes could not be created
    pub async fn start(&self, config: RunConfig) -> Result<RunHandle, RunError> {
        let run_id = self.id_provider.generate_id();

        info!(
            run_id = %run_id,
            executable = %config.executable().display(),
            args = ?config.args(),
            fixture = %config.fixture().display(),
            bucket = %config.bucket(),
            key = %config.key(),
            timeout_ms = %config.timeout().as_millis(),
            "Starting supervised run"
        );

        let mut command = Command::new(config.executable());
        command
            .args(config.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        // Own process group so the deadline can take down grandchildren too
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .map_err(|e| startup_error(&config, e.to_string()))?;
        let deadline = Instant::now() + config.timeout();

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| startup_error(&config, "stdin pipe unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| startup_error(&config, "stdout pipe unavailable"))?;
        let pid = child
            .id()
            .ok_or_else(|| startup_error(&config, "child exited before its pid was read"))?;

        let aggregator = Arc::new(LogAggregator::new());
        let sink = Arc::new(LogSink::new(
            Arc::clone(&self.store),
            config.bucket(),
            config.key(),
        ));
        let (notifier, exit) = exit_channel();
        // Producers hold the only request handles, so the flusher ends with them
        let (requests, flusher) = spawn_flusher(Arc::clone(&sink), Arc::clone(&aggregator));

        let feeder = tokio::spawn(feed_stdin(
            config.fixture().to_path_buf(),
            stdin,
            Arc::clone(&aggregator),
            requests.clone(),
        ));
        let collector = tokio::spawn(collect_stdout(stdout, Arc::clone(&aggregator), requests));

        info!(run_id = %run_id, pid = %pid, "Child started");

        let supervision = Supervision {
            run_id: run_id.clone(),
            pid,
            config,
            child,
            deadline,
            aggregator: Arc::clone(&aggregator),
            sink,
            flusher,
            notifier,
            time_provider: Arc::clone(&self.time_provider),
        };
        let task = tokio::spawn(supervision.supervise(feeder, collector));

        Ok(RunHandle {
            run_id,
            pid,
            exit,
            aggregator,
            task,
        })
    }

    /// Start a run and wait for its terminal status
    pub async fn run(&self, config: RunConfig) -> Result<RunReport, RunError> {
        self.start(config).await?.wait().await
    }
}

fn startup_error(config: &RunConfig, reason: impl Into<String>) -> RunError {
    RunError::Startup {
        executable: config.executable().to_path_buf(),
        reason: reason.into(),
    }
}

/// Caller's view of a run in progress
///
/// Exposes only the pid and read-only observers; the pipes and the child
/// handle stay with the supervising task.
pub struct RunHandle {
    run_id: RunId,
    pid: u32,
    exit: ExitWatch,
    aggregator: Arc<LogAggregator>,
    task: JoinHandle<RunReport>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// OS process id of the child (for the resource sampler)
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Fires once the child has been reaped
    pub fn exit_watch(&self) -> ExitWatch {
        self.exit.clone()
    }

    /// Point-in-time copy of the transcript so far
    pub fn transcript(&self) -> Vec<LogEntry> {
        self.aggregator.snapshot()
    }

    /// Wait for the terminal status and the final flush
    ///
    /// # Errors
    /// - RunError::Supervisor if the supervising task panicked
    pub async fn wait(self) -> Result<RunReport, RunError> {
        self.task
            .await
            .map_err(|e| RunError::Supervisor(e.to_string()))
    }
}

/// State owned by the supervising task
struct Supervision {
    run_id: RunId,
    pid: u32,
    config: RunConfig,
    child: Child,
    deadline: Instant,
    aggregator: Arc<LogAggregator>,
    sink: Arc<LogSink>,
    flusher: JoinHandle<u64>,
    notifier: ExitNotifier,
    time_provider: Arc<dyn TimeProvider>,
}

impl Supervision {
    async fn supervise(mut self, feeder: ProducerHandle, collector: ProducerHandle) -> RunReport {
        let status = match timeout_at(self.deadline, self.child.wait()).await {
            Ok(Ok(exit)) => status_from_exit(exit),
            Ok(Err(e)) => {
                warn!(run_id = %self.run_id, pid = %self.pid, error = %e, "Waiting on child failed");
                let _ = self.child.start_kill();
                TerminalStatus::ProcessError(ProcessFailure {
                    exit_code: None,
                    signal: None,
                    message: format!("wait failed: {}", e),
                })
            }
            Err(_) => {
                warn!(
                    run_id = %self.run_id,
                    pid = %self.pid,
                    timeout_ms = %self.config.timeout().as_millis(),
                    "Deadline exceeded, terminating child"
                );
                self.terminate().await;
                TerminalStatus::TimedOut {
                    after: self.config.timeout(),
                }
            }
        };
        self.notifier.notify_exited();

        // With the group gone nothing else holds the pipes, so both producers
        // reach EOF or EPIPE on their own
        let drain = if self.sweep_group() {
            None
        } else {
            Some(PRODUCER_DRAIN_TIMEOUT)
        };

        // No producer may still be appending when the final flush starts
        let mut faults = Vec::new();
        for (name, handle) in [("stdin-feeder", feeder), ("stdout-collector", collector)] {
            if let Some(fault) = join_producer(&self.run_id, name, handle, drain).await {
                faults.push(fault);
            }
        }

        // Producers dropped their request handles; serve what is pending
        match (&mut self.flusher).await {
            Ok(uploads) => debug!(run_id = %self.run_id, uploads = uploads, "Flusher drained"),
            Err(e) => warn!(run_id = %self.run_id, error = %e, "Flusher task failed"),
        }

        if status.is_timed_out() {
            let marker = format!(
                "{} {}",
                TIMEOUT_MARKER_PREFIX,
                self.time_provider.now().to_rfc3339()
            );
            self.aggregator.append(marker);
        }

        let final_flush = self.sink.flush(&self.aggregator).await;
        let entries = self.aggregator.len();
        let flushes = self.sink.attempts().await;

        info!(
            run_id = %self.run_id,
            pid = %self.pid,
            status = %status,
            entries = entries,
            faults = faults.len(),
            flushes = flushes,
            flushed = final_flush.is_ok(),
            "Run finished"
        );

        RunReport {
            run_id: self.run_id,
            pid: self.pid,
            status,
            entries,
            faults,
            final_flush,
        }
    }

    /// SIGKILL whatever is left of the child's process group
    ///
    /// Returns true when the group is known to be empty afterwards.
    #[cfg(unix)]
    fn sweep_group(&self) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        match killpg(Pid::from_raw(self.pid as i32), Signal::SIGKILL) {
            Ok(()) => {
                info!(run_id = %self.run_id, pid = %self.pid, "Killed processes left in the child's group");
                true
            }
            Err(Errno::ESRCH) => true,
            Err(e) => {
                warn!(run_id = %self.run_id, pid = %self.pid, error = %e, "Process group sweep failed");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn sweep_group(&self) -> bool {
        false
    }

    /// SIGTERM the process group, SIGKILL after the grace period, then reap
    async fn terminate(&mut self) {
        #[cfg(unix)]
        {
            use nix::sys::signal::{killpg, Signal};
            use nix::unistd::Pid;

            let group = Pid::from_raw(self.pid as i32);
            if let Err(e) = killpg(group, Signal::SIGTERM) {
                warn!(pid = %self.pid, error = %e, "SIGTERM failed");
            }

            match timeout(TERMINATE_GRACE, self.child.wait()).await {
                Ok(Ok(_)) => info!(pid = %self.pid, "Child exited after SIGTERM"),
                _ => warn!(pid = %self.pid, "Child did not exit after SIGTERM, sending SIGKILL"),
            }
            // Also sweeps grandchildren still holding the pipes
            if let Err(e) = killpg(group, Signal::SIGKILL) {
                debug!(pid = %self.pid, error = %e, "SIGKILL sweep found nothing to kill");
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = self.child.start_kill() {
                warn!(pid = %self.pid, error = %e, "Kill failed");
            }
        }

        if let Err(e) = self.child.wait().await {
            warn!(pid = %self.pid, error = %e, "Reaping terminated child failed");
        }
    }
}

fn status_from_exit(exit: ExitStatus) -> TerminalStatus {
    if exit.success() {
        return TerminalStatus::Completed {
            exit_code: exit.code(),
        };
    }

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        exit.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    TerminalStatus::ProcessError(ProcessFailure {
        exit_code: exit.code(),
        signal,
        message: exit.to_string(),
    })
}

/// Join a producer
///
/// With a `drain` bound the producer is aborted if it is still blocked when
/// the bound expires; without one it is awaited to completion.
async fn join_producer(
    run_id: &str,
    name: &'static str,
    mut handle: ProducerHandle,
    drain: Option<Duration>,
) -> Option<ProducerError> {
    let joined = match drain {
        None => handle.await,
        Some(limit) => match timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(run_id = %run_id, producer = name, "Producer still blocked, aborting");
                handle.abort();
                handle.await
            }
        },
    };

    match joined {
        Ok(Ok(lines)) => {
            debug!(run_id = %run_id, producer = name, lines = lines, "Producer finished");
            None
        }
        Ok(Err(e)) => {
            if e.is_expected() {
                debug!(run_id = %run_id, producer = name, error = %e, "Child closed its stdin early");
            } else {
                warn!(run_id = %run_id, producer = name, error = %e, "Producer failed");
            }
            Some(e)
        }
        Err(join_err) => Some(ProducerError::Aborted(format!("{}: {}", name, join_err))),
    }
}

/// Read one line into `buf` without its `\n` / `\r\n` terminator
///
/// Returns false at end of stream.
async fn read_line<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<bool> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(false);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(true)
}

/// stdin-feeder: fixture lines → child stdin, one entry per written line
async fn feed_stdin(
    fixture: PathBuf,
    mut stdin: ChildStdin,
    aggregator: Arc<LogAggregator>,
    flushes: FlushRequests,
) -> Result<u64, ProducerError> {
    let input_err = |source| ProducerError::InputRead {
        path: fixture.clone(),
        source,
    };

    let file = File::open(&fixture).await.map_err(input_err)?;
    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    let mut written = 0u64;

    while read_line(&mut reader, &mut line).await.map_err(input_err)? {
        line.push(b'\n');
        if let Err(source) = stdin.write_all(&line).await {
            return Err(ProducerError::PipeWrite { written, source });
        }
        line.pop();
        written += 1;

        flushes.record(&aggregator, String::from_utf8_lossy(&line));
    }

    // Dropping stdin closes the pipe so the child sees end of input
    drop(stdin);
    Ok(written)
}

/// stdout-collector: child stdout lines → entries
///
/// Output of an untrusted child may not be UTF-8; it is decoded lossily.
async fn collect_stdout(
    stdout: ChildStdout,
    aggregator: Arc<LogAggregator>,
    flushes: FlushRequests,
) -> Result<u64, ProducerError> {
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();
    let mut collected = 0u64;

    while read_line(&mut reader, &mut line)
        .await
        .map_err(ProducerError::OutputRead)?
    {
        collected += 1;
        flushes.record(&aggregator, String::from_utf8_lossy(&line));
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::domain::TranscriptDocument;
    use proctor_core::port::id_provider::SequentialIdProvider;
    use proctor_core::port::object_store::mocks::InMemoryObjectStore;
    use proctor_core::port::time_provider::SystemTimeProvider;

    fn orchestrator(store: Arc<InMemoryObjectStore>) -> Orchestrator {
        Orchestrator::new(
            store,
            Arc::new(SystemTimeProvider),
            Arc::new(SequentialIdProvider::new("test")),
        )
    }

    fn fixture(lines: &[&str]) -> tempfile::NamedTempFile {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut body = lines.join("\n");
        body.push('\n');
        std::fs::write(file.path(), body).unwrap();
        file
    }

    fn sh(script: &str, fixture: &tempfile::NamedTempFile, timeout: Duration) -> RunConfig {
        RunConfig::new("/bin/sh", fixture.path(), "logs", "log", timeout)
            .unwrap()
            .with_args(["-c", script])
    }

    #[tokio::test]
    async fn test_read_line_strips_terminators() {
        let mut reader = BufReader::new(&b"a\r\nb\nc"[..]);
        let mut buf = Vec::new();
        assert!(read_line(&mut reader, &mut buf).await.unwrap());
        assert_eq!(buf, b"a");
        assert!(read_line(&mut reader, &mut buf).await.unwrap());
        assert_eq!(buf, b"b");
        assert!(read_line(&mut reader, &mut buf).await.unwrap());
        assert_eq!(buf, b"c");
        assert!(!read_line(&mut reader, &mut buf).await.unwrap());
    }

    #[tokio::test]
    async fn test_cat_echoes_every_line() {
        let store = Arc::new(InMemoryObjectStore::new());
        let input = fixture(&["1 2", "3 4", "5 6"]);

        let report = orchestrator(store.clone())
            .run(sh("cat", &input, Duration::from_secs(10)))
            .await
            .unwrap();

        assert_eq!(report.status, TerminalStatus::Completed { exit_code: Some(0) });
        assert_eq!(report.entries, 6);
        assert!(report.faults.is_empty(), "{:?}", report.faults);

        let doc = TranscriptDocument::decode(&store.latest("logs", "log").unwrap()).unwrap();
        let texts: Vec<&str> = doc.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts.iter().filter(|t| **t == "3 4").count(), 2);
        assert!(doc.lines.iter().enumerate().all(|(i, l)| l.id == i as u64));
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_process_error() {
        let store = Arc::new(InMemoryObjectStore::new());
        let input = fixture(&["x"]);

        let report = orchestrator(store.clone())
            .run(sh("cat >/dev/null; echo partial; exit 3", &input, Duration::from_secs(10)))
            .await
            .unwrap();

        match report.status {
            TerminalStatus::ProcessError(failure) => assert_eq!(failure.exit_code, Some(3)),
            other => panic!("unexpected status {:?}", other),
        }
        // Everything captured up to the failure is flushed
        let doc = TranscriptDocument::decode(&store.latest("logs", "log").unwrap()).unwrap();
        assert_eq!(doc.lines.len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_marker_uses_clock() {
        use chrono::TimeZone;
        use proctor_core::port::time_provider::FixedTimeProvider;

        let store = Arc::new(InMemoryObjectStore::new());
        let input = fixture(&["x"]);
        let clock = chrono::Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let orchestrator = Orchestrator::new(
            store.clone(),
            Arc::new(FixedTimeProvider(clock)),
            Arc::new(SequentialIdProvider::new("test")),
        );

        let report = orchestrator
            .run(sh("cat >/dev/null; sleep 30", &input, Duration::from_millis(200)))
            .await
            .unwrap();

        assert!(report.status.is_timed_out());
        let doc = TranscriptDocument::decode(&store.latest("logs", "log").unwrap()).unwrap();
        assert_eq!(
            doc.lines.last().map(|l| l.text.as_str()),
            Some("Command timed out at 2024-05-01T12:00:00+00:00")
        );
    }

    #[tokio::test]
    async fn test_missing_executable_is_startup_failure() {
        let store = Arc::new(InMemoryObjectStore::new());
        let input = fixture(&["x"]);
        let config = RunConfig::new(
            "/definitely/not/here",
            input.path(),
            "logs",
            "log",
            Duration::from_secs(1),
        )
        .unwrap();

        let result = orchestrator(store.clone()).start(config).await;
        assert!(matches!(result, Err(RunError::Startup { .. })));
        assert_eq!(store.put_count(), 0);
    }

    #[tokio::test]
    async fn test_handle_exposes_pid_and_exit_watch() {
        let store = Arc::new(InMemoryObjectStore::new());
        let input = fixture(&["x"]);

        let handle = orchestrator(store)
            .start(sh("cat >/dev/null", &input, Duration::from_secs(10)))
            .await
            .unwrap();
        assert!(handle.pid() > 0);
        assert_eq!(handle.run_id(), "test-0");

        let mut exit = handle.exit_watch();
        let report = handle.wait().await.unwrap();
        assert!(exit.has_exited());
        exit.wait().await;
        assert!(report.status.is_completed());
    }
}
