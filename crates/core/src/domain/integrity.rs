// Integrity verification policy
//
// A required file passes only when it exists AND its content differs from the
// template hash. Unchanged files, missing files and untracked extra files all
// fail the verdict.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of one path under the verified root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileStatus {
    /// Required, present, hash differs from the template
    Modified,
    /// Required, present, hash equals the template (not customized)
    Unchanged,
    /// Required but not found
    Missing,
    /// Found but not required
    Extra,
}

impl FileStatus {
    pub fn is_pass(&self) -> bool {
        matches!(self, FileStatus::Modified)
    }
}

impl std::fmt::Display for FileStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileStatus::Modified => write!(f, "MODIFIED"),
            FileStatus::Unchanged => write!(f, "UNCHANGED"),
            FileStatus::Missing => write!(f, "MISSING"),
            FileStatus::Extra => write!(f, "EXTRA"),
        }
    }
}

/// Per-path verdicts, keyed by `/`-separated path relative to the root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    pub files: BTreeMap<String, FileStatus>,
}

impl IntegrityReport {
    /// Classify found files against requirements
    ///
    /// `found` maps every regular file under the root to its content hash;
    /// the hash is only consulted for required paths. Hashes are lowercase
    /// hex SHA-256 on both sides and are compared exactly, so a requirement
    /// written in another case never matches.
    pub fn classify(
        found: &HashMap<String, String>,
        requirements: &HashMap<String, String>,
    ) -> Self {
        let mut files = BTreeMap::new();

        for (path, expected) in requirements {
            let status = match found.get(path) {
                None => FileStatus::Missing,
                Some(actual) if actual == expected => FileStatus::Unchanged,
                Some(_) => FileStatus::Modified,
            };
            files.insert(path.clone(), status);
        }

        for path in found.keys() {
            if !requirements.contains_key(path) {
                files.insert(path.clone(), FileStatus::Extra);
            }
        }

        Self { files }
    }

    /// AND across all paths
    pub fn is_valid(&self) -> bool {
        self.files.values().all(FileStatus::is_pass)
    }

    /// Paths with the given status, in sorted order
    pub fn with_status(&self, status: FileStatus) -> Vec<&str> {
        self.files
            .iter()
            .filter(|(_, s)| **s == status)
            .map(|(p, _)| p.as_str())
            .collect()
    }
}

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("Path not found: {0}")]
    RootNotFound(PathBuf),

    #[error("Directory walk failed: {0}")]
    Walk(String),

    #[error("Cannot hash {path}: {source}")]
    Hash {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_modified_file_is_valid() {
        let report = IntegrityReport::classify(&map(&[("a", "ff")]), &map(&[("a", "00")]));
        assert_eq!(report.files["a"], FileStatus::Modified);
        assert!(report.is_valid());
    }

    #[test]
    fn test_unchanged_file_is_invalid() {
        let report = IntegrityReport::classify(&map(&[("a", "abcd")]), &map(&[("a", "abcd")]));
        assert_eq!(report.files["a"], FileStatus::Unchanged);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_hash_comparison_is_exact() {
        // Same digest, uppercase requirement
        let report = IntegrityReport::classify(&map(&[("a", "abcd")]), &map(&[("a", "ABCD")]));
        assert_eq!(report.files["a"], FileStatus::Modified);
    }

    #[test]
    fn test_missing_and_extra() {
        let report = IntegrityReport::classify(&map(&[("b", "11")]), &map(&[("a", "00")]));
        assert_eq!(report.with_status(FileStatus::Missing), vec!["a"]);
        assert_eq!(report.with_status(FileStatus::Extra), vec!["b"]);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_empty_tree_no_requirements() {
        let report = IntegrityReport::classify(&HashMap::new(), &HashMap::new());
        assert!(report.is_valid());
    }
}
