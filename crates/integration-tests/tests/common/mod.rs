//! Shared fixtures for end-to-end runs against `/bin/sh` children
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use proctor_core::domain::{RunConfig, TranscriptDocument};
use proctor_core::port::id_provider::SequentialIdProvider;
use proctor_core::port::object_store::mocks::InMemoryObjectStore;
use proctor_core::port::time_provider::SystemTimeProvider;
use proctor_infra_system::Orchestrator;
use tempfile::NamedTempFile;

pub const BUCKET: &str = "logs";
pub const KEY: &str = "run/transcript.json";

pub fn orchestrator(store: Arc<InMemoryObjectStore>) -> Orchestrator {
    Orchestrator::new(
        store,
        Arc::new(SystemTimeProvider),
        Arc::new(SequentialIdProvider::new("it")),
    )
}

/// Fixture file holding `lines`, newline-terminated
pub fn fixture<S: AsRef<str>>(lines: &[S]) -> NamedTempFile {
    let file = NamedTempFile::new().unwrap();
    let body: String = lines.iter().map(|l| format!("{}\n", l.as_ref())).collect();
    std::fs::write(file.path(), body).unwrap();
    file
}

/// Run `script` with `/bin/sh -c`
pub fn shell(script: &str, fixture: &NamedTempFile, timeout: Duration) -> RunConfig {
    RunConfig::new("/bin/sh", fixture.path(), BUCKET, KEY, timeout)
        .unwrap()
        .with_args(["-c", script])
}

/// Latest uploaded transcript
pub fn uploaded(store: &InMemoryObjectStore) -> TranscriptDocument {
    let body = store.latest(BUCKET, KEY).expect("no transcript uploaded");
    TranscriptDocument::decode(&body).unwrap()
}

pub fn texts(doc: &TranscriptDocument) -> Vec<&str> {
    doc.lines.iter().map(|l| l.text.as_str()).collect()
}
