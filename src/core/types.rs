//! Core types used throughout the sandbridge library.
//!
//! This module defines the values that flow through one pass of the
//! pipeline: the file being looked at, its content fingerprint, the
//! sandbox task it maps to, the task's status and the final score.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Hex-encoded SHA-256 of a file's full content.
///
/// This is the only key used for deduplication against the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wraps an already computed hex digest.
    ///
    /// The digest is lowercased so lookups are stable regardless of how
    /// the caller formatted it.
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into().to_ascii_lowercase())
    }

    /// Returns the hex digest.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sha256:{}", self.0)
    }
}

/// Opaque identifier of one sandbox analysis job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as it appears in endpoint paths.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads a task identifier out of a JSON value.
    ///
    /// Cuckoo hands out integer ids, but strings are accepted too so the
    /// identifier stays opaque.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Number(n) => Some(Self(n.to_string())),
            serde_json::Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<u64> for TaskId {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Status of a sandbox task as seen by the poller.
///
/// Only `pending` has meaning to the pipeline; every other status (running,
/// completed, reported, failed_analysis, ...) ends the queue wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Still queued.
    Pending,
    /// Any other status string reported by the sandbox.
    Other(String),
}

impl TaskStatus {
    /// Parses the status string returned by the task view endpoint.
    pub fn parse(status: &str) -> Self {
        if status == "pending" {
            Self::Pending
        } else {
            Self::Other(status.to_string())
        }
    }

    /// Returns `true` while the task is still queued.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Other(status) => f.write_str(status),
        }
    }
}

/// Non-negative risk score produced by a finished analysis.
///
/// Higher means more suspicious. A score of `0.0` is also what the pipeline
/// reports when it could not determine the risk at all.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(f64);

impl Score {
    /// The score reported for timed out or failed analyses.
    pub const ZERO: Score = Score(0.0);

    /// Creates a score, rejecting negative and non-finite values.
    pub fn new(value: f64) -> Option<Self> {
        (value.is_finite() && value >= 0.0).then_some(Self(value))
    }

    /// Returns the raw value.
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Returns `true` if this score meets or exceeds `threshold`.
    pub fn meets(&self, threshold: f64) -> bool {
        self.0 >= threshold
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A file discovered in the watched directory.
///
/// Derived fresh on every cycle; nothing about a file is remembered between
/// cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    path: PathBuf,
    name: String,
    extension: Option<String>,
}

impl FileRef {
    /// Builds a reference from a path, deriving its name and extension.
    ///
    /// The extension is everything after the *first* `.` in the file name,
    /// so `sample.tar.gz` has extension `tar.gz`. A name without a `.` has
    /// no extension. A name that is not valid UTF-8 is converted lossily
    /// while the path keeps the original bytes. Returns `None` if the path
    /// has no file name at all.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = path.file_name()?.to_string_lossy().into_owned();
        let extension = name
            .split_once('.')
            .map(|(_, ext)| ext.to_string());

        Some(Self {
            path,
            name,
            extension,
        })
    }

    /// Returns the full path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the file name without any directory components.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the derived extension, if the name has one.
    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_ref_extension_after_first_dot() {
        let file = FileRef::from_path("/nsm/extracted/HTTP-FZ1.exe").unwrap();
        assert_eq!(file.name(), "HTTP-FZ1.exe");
        assert_eq!(file.extension(), Some("exe"));

        let file = FileRef::from_path("/nsm/extracted/report.tar.gz").unwrap();
        assert_eq!(file.extension(), Some("tar.gz"));
    }

    #[test]
    fn test_file_ref_without_extension() {
        let file = FileRef::from_path("/nsm/extracted/README").unwrap();
        assert_eq!(file.name(), "README");
        assert_eq!(file.extension(), None);
    }

    #[test]
    fn test_file_ref_dotfile() {
        let file = FileRef::from_path("/tmp/.profile").unwrap();
        assert_eq!(file.extension(), Some("profile"));
    }

    #[cfg(unix)]
    #[test]
    fn test_file_ref_non_utf8_name_keeps_path() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = Path::new("/nsm/extracted").join(OsStr::from_bytes(b"bad\xff.exe"));
        let file = FileRef::from_path(raw.clone()).unwrap();

        assert_eq!(file.path(), raw.as_path());
        assert_eq!(file.name(), "bad\u{fffd}.exe");
        assert_eq!(file.extension(), Some("exe"));
        assert!(FileRef::from_path("/").is_none());
    }

    #[test]
    fn test_task_id_from_json() {
        assert_eq!(
            TaskId::from_json(&serde_json::json!(42)),
            Some(TaskId::new("42"))
        );
        assert_eq!(
            TaskId::from_json(&serde_json::json!("abc")),
            Some(TaskId::new("abc"))
        );
        assert_eq!(TaskId::from_json(&serde_json::json!(null)), None);
        assert_eq!(TaskId::from_json(&serde_json::json!("")), None);
    }

    #[test]
    fn test_task_status_parse() {
        assert!(TaskStatus::parse("pending").is_pending());
        assert_eq!(
            TaskStatus::parse("reported"),
            TaskStatus::Other("reported".into())
        );
    }

    #[test]
    fn test_score_validation() {
        assert_eq!(Score::new(7.5).map(|s| s.value()), Some(7.5));
        assert!(Score::new(-1.0).is_none());
        assert!(Score::new(f64::NAN).is_none());
        assert!(Score::new(4.0).unwrap().meets(4.0));
        assert!(!Score::ZERO.meets(4.0));
    }

    #[test]
    fn test_fingerprint_normalized() {
        let fp = Fingerprint::new("ABC123");
        assert_eq!(fp.as_str(), "abc123");
        assert_eq!(fp.to_string(), "sha256:abc123");
    }
}
