// Log Sink
//
// Serializes the transcript snapshot and overwrites the stored object.
// Every flush re-sends the whole transcript; the latest successful put wins.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::application::constants::TRANSCRIPT_CONTENT_TYPE;
use crate::application::transcript::LogAggregator;
use crate::domain::{FlushReport, LogEntry, SinkError, TranscriptDocument};
use crate::port::ObjectStore;

/// Flush bookkeeping, guarded by the flush lock
#[derive(Debug, Default)]
struct FlushState {
    attempts: u64,
    /// Entries in the last successfully uploaded snapshot
    last_uploaded: Option<usize>,
}

/// Pushes transcript snapshots to `bucket/key`
pub struct LogSink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key: String,
    state: Mutex<FlushState>,
}

impl LogSink {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
            key: key.into(),
            state: Mutex::new(FlushState::default()),
        }
    }

    /// Encode a snapshot as the persisted document
    ///
    /// Pure: the same snapshot always yields the same bytes.
    pub fn encode(entries: &[LogEntry]) -> Result<Vec<u8>, SinkError> {
        TranscriptDocument::encode(entries).map_err(|e| SinkError::Encode(e.to_string()))
    }

    /// Snapshot the aggregator and upload it
    ///
    /// Flushes are serialized and the snapshot is taken inside the lock, so
    /// uploads reach the store in non-decreasing transcript length even when
    /// both producers trigger a flush at once.
    ///
    /// # Errors
    /// - SinkError::Upload if the store rejected the object (non-fatal; the
    ///   next flush supersedes it)
    pub async fn flush(&self, aggregator: &LogAggregator) -> Result<FlushReport, SinkError> {
        let mut state = self.state.lock().await;
        state.attempts += 1;

        let snapshot = aggregator.snapshot();
        let body = Self::encode(&snapshot)?;
        let report = FlushReport {
            entries: snapshot.len(),
            bytes: body.len(),
        };

        match self
            .store
            .put(&self.bucket, &self.key, body, TRANSCRIPT_CONTENT_TYPE)
            .await
        {
            Ok(()) => {
                state.last_uploaded = Some(report.entries);
                debug!(
                    bucket = %self.bucket,
                    key = %self.key,
                    entries = report.entries,
                    bytes = report.bytes,
                    "Transcript flushed"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(
                    bucket = %self.bucket,
                    key = %self.key,
                    entries = report.entries,
                    error = %e,
                    "Transcript upload failed, next flush will supersede it"
                );
                Err(SinkError::Upload {
                    bucket: self.bucket.clone(),
                    key: self.key.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Number of flushes attempted so far
    pub async fn attempts(&self) -> u64 {
        self.state.lock().await.attempts
    }

    /// Entries in the last successfully uploaded snapshot
    pub async fn last_uploaded(&self) -> Option<usize> {
        self.state.lock().await.last_uploaded
    }
}
