// Transcript Domain Model
// Persisted shape: {"lines": [{"id": int, "text": string}, ...]}

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One fed input line or one captured output line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: u64,
    pub text: String,
}

impl LogEntry {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Self {
            id,
            text: text.into(),
        }
    }
}

/// Owned form of the persisted transcript document
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TranscriptDocument {
    pub lines: Vec<LogEntry>,
}

/// Borrowed form used for encoding, avoids cloning the snapshot twice
#[derive(Serialize)]
struct TranscriptDocumentRef<'a> {
    lines: &'a [LogEntry],
}

impl TranscriptDocument {
    /// Encode entries as the persisted JSON document (UTF-8)
    pub fn encode(lines: &[LogEntry]) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&TranscriptDocumentRef { lines })
    }

    pub fn decode(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// Outcome of one successful flush
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub entries: usize,
    pub bytes: usize,
}

/// Flush failures (always non-fatal to the run)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    #[error("Transcript encoding failed: {0}")]
    Encode(String),

    #[error("Upload to {bucket}/{key} failed: {reason}")]
    Upload {
        bucket: String,
        key: String,
        reason: String,
    },
}
