// Log Aggregator
//
// Single serialization point for both producers: the id is the vector
// length, so append+increment happen in one critical section.

use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::application::constants::FLUSH_EVERY_ENTRIES;
use crate::domain::LogEntry;

/// Result of one append
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    pub id: u64,
    /// True on every FLUSH_EVERY_ENTRIES-th entry of the unified sequence
    pub flush_due: bool,
}

/// Ordered, growing transcript shared by the stdin-feeder and stdout-collector
#[derive(Debug, Default)]
pub struct LogAggregator {
    entries: Mutex<Vec<LogEntry>>,
}

impl LogAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<LogEntry>> {
        // A panicking producer must not take the transcript down with it
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append one line and return its sequence id
    pub fn append(&self, text: impl Into<String>) -> Appended {
        let mut entries = self.lock();
        let id = entries.len() as u64;
        entries.push(LogEntry::new(id, text));
        Appended {
            id,
            flush_due: (id + 1) % FLUSH_EVERY_ENTRIES == 0,
        }
    }

    /// Consistent point-in-time copy
    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
