// Spooled object store
// Keeps a local copy of every upload, written via temp file + atomic rename
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use proctor_core::port::{ObjectStore, StoreError};

/// Decorator writing `<spool_dir>/<bucket>/<key>` before delegating the put
///
/// Readers of the spool file always see a complete document: the body is
/// written to a temp file in the same directory and renamed over the target.
/// Spool failures are logged and never block the upload.
pub struct SpooledStore<S> {
    inner: S,
    spool_dir: PathBuf,
}

impl<S: ObjectStore> SpooledStore<S> {
    pub fn new(inner: S, spool_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            spool_dir: spool_dir.into(),
        }
    }

    /// Path of the local copy for `bucket/key`
    pub fn spool_path(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.spool_dir.clone();
        for segment in bucket.split('/').chain(key.split('/')).filter(|s| !s.is_empty()) {
            path.push(sanitize(segment));
        }
        path
    }
}

/// Keys come from the command line; never let them climb out of the spool
fn sanitize(segment: &str) -> &str {
    match segment {
        "." | ".." => "_",
        other => other,
    }
}

fn write_atomic(target: &Path, body: &[u8]) -> std::io::Result<()> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(body)?;
    tmp.as_file().sync_all()?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[async_trait]
impl<S: ObjectStore> ObjectStore for SpooledStore<S> {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StoreError> {
        let target = self.spool_path(bucket, key);
        let copy = body.clone();
        let spool_target = target.clone();

        match tokio::task::spawn_blocking(move || write_atomic(&spool_target, &copy)).await {
            Ok(Ok(())) => debug!(path = %target.display(), "Spooled transcript"),
            Ok(Err(e)) => warn!(path = %target.display(), error = %e, "Spool write failed"),
            Err(e) => warn!(path = %target.display(), error = %e, "Spool task failed"),
        }

        self.inner.put(bucket, key, body, content_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::port::object_store::mocks::InMemoryObjectStore;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn test_spools_then_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpooledStore::new(InMemoryObjectStore::new(), dir.path());

        assert_ok!(
            store
                .put("logs", "runs/1.json", b"{\"lines\":[]}".to_vec(), "application/json")
                .await
        );

        let spooled = std::fs::read(dir.path().join("logs/runs/1.json")).unwrap();
        assert_eq!(spooled, b"{\"lines\":[]}");
        assert_eq!(store.inner.put_count(), 1);
    }

    #[tokio::test]
    async fn test_later_put_replaces_spool_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpooledStore::new(InMemoryObjectStore::new(), dir.path());

        store.put("logs", "log", b"first".to_vec(), "application/json").await.unwrap();
        store.put("logs", "log", b"second".to_vec(), "application/json").await.unwrap();

        assert_eq!(std::fs::read(store.spool_path("logs", "log")).unwrap(), b"second");
        // No temp files left behind
        let leftovers = std::fs::read_dir(dir.path().join("logs")).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[tokio::test]
    async fn test_upload_failure_still_spools() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpooledStore::new(InMemoryObjectStore::new_failing(), dir.path());

        let result = store.put("logs", "log", b"kept".to_vec(), "application/json").await;
        assert!(result.is_err());
        assert_eq!(std::fs::read(store.spool_path("logs", "log")).unwrap(), b"kept");
    }

    #[tokio::test]
    async fn test_spool_failure_does_not_block_upload() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the spool directory should be
        let blocker = dir.path().join("spool");
        std::fs::write(&blocker, b"").unwrap();
        let store = SpooledStore::new(InMemoryObjectStore::new(), &blocker);

        store.put("logs", "log", b"x".to_vec(), "application/json").await.unwrap();
        assert_eq!(store.inner.latest("logs", "log").unwrap(), b"x");
    }

    #[test]
    fn test_spool_path_stays_inside_dir() {
        let store = SpooledStore::new(InMemoryObjectStore::new(), "/spool");
        assert_eq!(
            store.spool_path("logs", "../../etc/passwd"),
            PathBuf::from("/spool/logs/_/_/etc/passwd")
        );
    }
}
