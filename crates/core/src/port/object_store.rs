// Object Store Port
// Write-once blob store reachable over a network API (S3 / MinIO)

use async_trait::async_trait;
use thiserror::Error;

/// Object store errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Put {bucket}/{key} failed: {reason}")]
    Put {
        bucket: String,
        key: String,
        reason: String,
    },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Object store port
///
/// Each `put` is independent and idempotent at the key: a later put fully
/// overwrites the object written by an earlier one.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload `body` as the complete content of `bucket/key`
    ///
    /// # Errors
    /// - StoreError::Put if the store rejected or could not receive the object
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// One recorded upload
    #[derive(Debug, Clone)]
    pub struct PutRecord {
        pub bucket: String,
        pub key: String,
        pub body: Vec<u8>,
        pub content_type: String,
    }

    /// In-memory store recording every put, optionally failing or slow
    #[derive(Default)]
    pub struct InMemoryObjectStore {
        puts: Mutex<Vec<PutRecord>>,
        failing: AtomicBool,
        latency: Duration,
    }

    impl InMemoryObjectStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn new_failing() -> Self {
            let store = Self::default();
            store.set_failing(true);
            store
        }

        /// Every put sleeps for `latency` before it is recorded
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = latency;
            self
        }

        pub fn set_failing(&self, failing: bool) {
            self.failing.store(failing, Ordering::SeqCst);
        }

        pub fn put_count(&self) -> usize {
            self.puts.lock().unwrap().len()
        }

        pub fn puts(&self) -> Vec<PutRecord> {
            self.puts.lock().unwrap().clone()
        }

        /// Body of the last successful put to `bucket/key`
        pub fn latest(&self, bucket: &str, key: &str) -> Option<Vec<u8>> {
            self.puts
                .lock()
                .unwrap()
                .iter()
                .rev()
                .find(|p| p.bucket == bucket && p.key == key)
                .map(|p| p.body.clone())
        }
    }

    #[async_trait]
    impl ObjectStore for InMemoryObjectStore {
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            body: Vec<u8>,
            content_type: &str,
        ) -> Result<(), StoreError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(StoreError::Put {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    reason: "mock store is failing".to_string(),
                });
            }
            self.puts.lock().unwrap().push(PutRecord {
                bucket: bucket.to_string(),
                key: key.to_string(),
                body,
                content_type: content_type.to_string(),
            });
            Ok(())
        }
    }
}
