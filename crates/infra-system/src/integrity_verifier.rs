// Integrity verifier (fixture tree vs expected template hashes)
// reason: walkdir for the tree walk, sha2 + hex for lowercase SHA-256 digests
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};
use tracing::{info, warn};
use walkdir::WalkDir;

use proctor_core::domain::{FileStatus, IntegrityError, IntegrityReport};

/// Chunk size for streaming file hashing (64 KB)
const CHUNK_SIZE: usize = 64 * 1024;

/// Lowercase hex SHA-256 of a whole file, read in 64 KB chunks
pub fn hash_file(path: &Path) -> Result<String, IntegrityError> {
    let to_err = |source| IntegrityError::Hash {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(to_err)?;
    let mut reader = BufReader::new(file);
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buf).map_err(to_err)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// `/`-joined path of `path` relative to `root`
fn relative_key(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// One-shot batch check of a fixture tree
///
/// Every required file must exist and differ from its template hash, and no
/// untracked file may exist under the root.
#[derive(Debug, Default, Clone, Copy)]
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    pub fn new() -> Self {
        Self
    }

    /// Walk `root` and classify every regular file
    ///
    /// `requirements` maps paths relative to `root` to lowercase hex SHA-256.
    /// Symlinks are not followed and are not counted as regular files.
    ///
    /// # Errors
    /// - IntegrityError::RootNotFound if `root` does not exist
    /// - IntegrityError::Walk / Hash on I/O failure during the walk
    pub fn verify(
        &self,
        root: &Path,
        requirements: &HashMap<String, String>,
    ) -> Result<IntegrityReport, IntegrityError> {
        if !root.exists() {
            return Err(IntegrityError::RootNotFound(root.to_path_buf()));
        }

        let mut found = HashMap::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = entry.map_err(|e| IntegrityError::Walk(e.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }

            let key = relative_key(root, entry.path());
            // Only required files are hashed; extras just need to be seen
            let hash = if requirements.contains_key(&key) {
                hash_file(entry.path())?
            } else {
                String::new()
            };
            found.insert(key, hash);
        }

        let report = IntegrityReport::classify(&found, requirements);
        for (path, status) in &report.files {
            if *status != FileStatus::Modified {
                warn!(path = %path, status = %status, "Integrity check failure");
            }
        }
        info!(
            root = %root.display(),
            files = report.files.len(),
            valid = report.is_valid(),
            "Integrity check completed"
        );

        Ok(report)
    }
}
