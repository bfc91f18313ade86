// Background Flusher
//
// Periodic uploads run on their own task so producers never wait on the
// store. Requests arriving while an upload is in flight collapse into one,
// and every upload snapshots the transcript as it is when the upload starts.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::application::transcript::{LogAggregator, LogSink};

/// Producer side of the flusher; cloning it is cheap
///
/// The flusher task ends once every `FlushRequests` has been dropped and the
/// pending request (if any) has been served.
#[derive(Clone)]
pub struct FlushRequests {
    tx: mpsc::Sender<()>,
}

impl FlushRequests {
    /// Ask for a flush without waiting for it
    ///
    /// A request made while one is already pending is absorbed by it.
    pub fn request(&self) {
        let _ = self.tx.try_send(());
    }

    /// Append `text` and request a flush when the entry makes one due
    pub fn record(&self, aggregator: &LogAggregator, text: impl Into<String>) {
        if aggregator.append(text).flush_due {
            self.request();
        }
    }
}

/// Spawn the flusher task for one run
///
/// Returns the request handle for producers and the task handle, which
/// resolves to the number of uploads the flusher attempted.
///
/// # Example
/// ```ignore
/// let (requests, flusher) = spawn_flusher(Arc::clone(&sink), Arc::clone(&aggregator));
/// requests.record(&aggregator, "line");
/// drop(requests);
/// let uploads = flusher.await?;
/// ```
pub fn spawn_flusher(sink: Arc<LogSink>, aggregator: Arc<LogAggregator>) -> (FlushRequests, JoinHandle<u64>) {
    // One slot: a queued request already covers everything appended after it
    let (tx, mut rx) = mpsc::channel(1);

    let task = tokio::spawn(async move {
        let mut uploads = 0u64;
        while rx.recv().await.is_some() {
            uploads += 1;
            // Failure is logged by the sink; the next flush supersedes it
            let _ = sink.flush(&aggregator).await;
        }
        debug!(uploads = uploads, "Flusher stopped");
        uploads
    });

    (FlushRequests { tx }, task)
}
