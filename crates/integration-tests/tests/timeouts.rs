//! Timeout Tests
//!
//! Deadline expiry must kill the whole process group, append the marker as
//! the last entry and still produce exactly one final flush.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{fixture, orchestrator, shell, texts, uploaded};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg};
use nix::unistd::Pid;
use proctor_core::application::constants::TIMEOUT_MARKER_PREFIX;
use proctor_core::domain::{ProducerError, TerminalStatus};
use proctor_core::port::object_store::mocks::InMemoryObjectStore;

const DEADLINE: Duration = Duration::from_millis(300);

fn is_gone(pid: u32) -> bool {
    kill(Pid::from_raw(pid as i32), None) == Err(Errno::ESRCH)
}

/// Test 1: Child that never exits is killed and the marker is appended last
#[tokio::test]
async fn test_timeout_appends_marker_and_kills_child() {
    let store = Arc::new(InMemoryObjectStore::new());
    let input = fixture(&["1 2", "3 4", "5 6"]);
    let started = Instant::now();

    let report = orchestrator(store.clone())
        .run(shell("cat >/dev/null; sleep 30", &input, DEADLINE))
        .await
        .unwrap();

    assert_eq!(report.status, TerminalStatus::TimedOut { after: DEADLINE });
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(is_gone(report.pid));

    let doc = uploaded(&store);
    assert_eq!(doc.lines.len(), 4);
    let last = texts(&doc).pop().unwrap();
    assert!(last.starts_with(TIMEOUT_MARKER_PREFIX), "last entry: {}", last);
    assert_eq!(report.entries, 4);
}

/// Test 2: SIGTERM is ignored, SIGKILL follows after the grace period
#[tokio::test]
async fn test_timeout_escalates_to_sigkill() {
    let store = Arc::new(InMemoryObjectStore::new());
    let input = fixture(&["x"]);
    let started = Instant::now();

    let report = orchestrator(store.clone())
        .run(shell(
            "trap '' TERM; cat >/dev/null; while :; do sleep 1; done",
            &input,
            DEADLINE,
        ))
        .await
        .unwrap();

    assert!(report.status.is_timed_out());
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(is_gone(report.pid));
    assert!(texts(&uploaded(&store))
        .last()
        .is_some_and(|t| t.starts_with(TIMEOUT_MARKER_PREFIX)));
}

/// Test 3: Output written before the deadline survives the kill
#[tokio::test]
async fn test_timeout_keeps_partial_output() {
    let store = Arc::new(InMemoryObjectStore::new());
    let input = fixture(&["ping"]);

    let report = orchestrator(store.clone())
        .run(shell(
            r#"read -r l; echo "pong $l"; sleep 30"#,
            &input,
            Duration::from_secs(1),
        ))
        .await
        .unwrap();

    assert!(report.status.is_timed_out());
    let uploaded_lines = uploaded(&store);
    let lines = texts(&uploaded_lines);
    assert!(lines.contains(&"ping"));
    assert!(lines.contains(&"pong ping"));
    assert!(lines[lines.len() - 1].starts_with(TIMEOUT_MARKER_PREFIX));
}

/// Test 4: Orphan holding stdout after a normal exit is swept with the group
#[tokio::test]
async fn test_orphan_holding_stdout_is_swept() {
    let store = Arc::new(InMemoryObjectStore::new());
    let input = fixture(&["a"]);
    let started = Instant::now();

    let report = orchestrator(store.clone())
        .run(shell("(sleep 30 &); cat", &input, Duration::from_secs(20)))
        .await
        .unwrap();

    assert!(report.status.is_completed());
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.faults.is_empty(), "{:?}", report.faults);
    assert_eq!(texts(&uploaded(&store)), vec!["a", "a"]);

    // Nothing is left in the child's process group
    assert_eq!(
        killpg(Pid::from_raw(report.pid as i32), None),
        Err(Errno::ESRCH)
    );
}

/// Test 5: Child that ignores its input times out with the feeder blocked
#[tokio::test]
async fn test_timeout_while_feeder_blocked_on_full_pipe() {
    let store = Arc::new(InMemoryObjectStore::new());
    // Far more than a pipe buffer holds
    let lines: Vec<String> = (0..200_000).map(|i| format!("line-{}", i)).collect();
    let input = fixture(&lines);
    let started = Instant::now();

    let report = orchestrator(store.clone())
        .run(shell("sleep 30", &input, DEADLINE))
        .await
        .unwrap();

    assert_eq!(report.status, TerminalStatus::TimedOut { after: DEADLINE });
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(is_gone(report.pid));
    assert!(report
        .faults
        .iter()
        .any(|f| matches!(f, ProducerError::PipeWrite { .. }) && f.is_expected()));

    let doc = uploaded(&store);
    assert_eq!(doc.lines.len(), report.entries);
    assert!(doc.lines.len() < lines.len());
    let last = texts(&doc).pop().unwrap();
    assert!(last.starts_with(TIMEOUT_MARKER_PREFIX), "last entry: {}", last);
}
