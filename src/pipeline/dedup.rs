//! Hash-based deduplication against the sandbox's history.

use crate::core::{ArcSandbox, Fingerprint, SandboxError, TaskId};

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, Weak};

/// How a file ended up with its task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The sandbox already knew the content; its first task is reused.
    Reused(TaskId),
    /// The content was new and has just been submitted.
    Submitted(TaskId),
}

impl Resolution {
    /// Returns the task to poll.
    pub fn task_id(&self) -> &TaskId {
        match self {
            Self::Reused(id) | Self::Submitted(id) => id,
        }
    }

    /// Returns `true` if no submission was made.
    pub fn is_reused(&self) -> bool {
        matches!(self, Self::Reused(_))
    }
}

/// Decides whether a fingerprint maps to an existing task or needs a new one.
///
/// Lookup and submission for one fingerprint run under an async lock keyed
/// by that fingerprint, so concurrent workers handling identical content
/// never submit it twice. The lock table only holds entries while someone
/// is using them; no fingerprint-to-task mapping is kept.
#[derive(Debug)]
pub struct DedupResolver {
    sandbox: ArcSandbox,
    gates: Mutex<HashMap<Fingerprint, Weak<tokio::sync::Mutex<()>>>>,
}

impl DedupResolver {
    /// Creates a resolver over the given sandbox.
    pub fn new(sandbox: ArcSandbox) -> Self {
        Self {
            sandbox,
            gates: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the task for a fingerprint, submitting the file if needed.
    ///
    /// Errors from the lookup or the submission are returned unchanged.
    pub async fn resolve(
        &self,
        fingerprint: &Fingerprint,
        path: &Path,
        file_name: &str,
    ) -> Result<Resolution, SandboxError> {
        let gate = self.gate_for(fingerprint);
        let _held = gate.lock().await;

        if let Some(task_id) = self.sandbox.lookup_by_hash(fingerprint).await? {
            tracing::debug!(
                sandbox = self.sandbox.name(),
                fingerprint = %fingerprint,
                task_id = %task_id,
                "Content already analysed, reusing task"
            );
            return Ok(Resolution::Reused(task_id));
        }

        let task_id = self.sandbox.submit(path, file_name).await?;
        tracing::debug!(
            sandbox = self.sandbox.name(),
            fingerprint = %fingerprint,
            task_id = %task_id,
            file_name = %file_name,
            "Submitted new content"
        );
        Ok(Resolution::Submitted(task_id))
    }

    /// Returns the number of fingerprints currently being resolved.
    pub fn in_flight(&self) -> usize {
        self.gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|gate| gate.strong_count() > 0)
            .count()
    }

    fn gate_for(&self, fingerprint: &Fingerprint) -> Arc<tokio::sync::Mutex<()>> {
        let mut gates = self
            .gates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(gate) = gates.get(fingerprint).and_then(Weak::upgrade) {
            return gate;
        }

        gates.retain(|_, gate| gate.strong_count() > 0);
        let gate = Arc::new(tokio::sync::Mutex::new(()));
        gates.insert(fingerprint.clone(), Arc::downgrade(&gate));
        gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{MockReply, MockSandbox};
    use crate::core::FileHasher;
    use std::io::Write;
    use std::time::Duration;

    fn temp_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file
    }

    #[tokio::test]
    async fn test_unknown_content_is_submitted() {
        let sandbox = Arc::new(MockSandbox::new().with_next_task_id(42));
        let resolver = DedupResolver::new(sandbox.clone());
        let file = temp_file(b"sample");
        let fp = FileHasher::new().hash_file(file.path()).unwrap();

        let resolution = resolver.resolve(&fp, file.path(), "sample.exe").await.unwrap();

        assert_eq!(resolution, Resolution::Submitted(TaskId::new("42")));
        assert_eq!(sandbox.lookup_count(), 1);
        assert_eq!(sandbox.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_known_content_is_reused() {
        let fp = FileHasher::new().hash_bytes(b"dup");
        let sandbox = Arc::new(MockSandbox::new().with_known_hash(fp.clone(), TaskId::new("42")));
        let resolver = DedupResolver::new(sandbox.clone());
        let file = temp_file(b"dup");

        let resolution = resolver.resolve(&fp, file.path(), "dup.exe").await.unwrap();

        assert!(resolution.is_reused());
        assert_eq!(resolution.task_id(), &TaskId::new("42"));
        assert_eq!(sandbox.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_second_resolution_reuses_first_submission() {
        let sandbox = Arc::new(MockSandbox::new().with_next_task_id(7));
        let resolver = DedupResolver::new(sandbox.clone());
        let first = temp_file(b"same bytes");
        let second = temp_file(b"same bytes");
        let fp = FileHasher::new().hash_file(first.path()).unwrap();

        let a = resolver.resolve(&fp, first.path(), "a.exe").await.unwrap();
        let b = resolver.resolve(&fp, second.path(), "b.exe").await.unwrap();

        assert_eq!(a.task_id(), b.task_id());
        assert!(b.is_reused());
        assert_eq!(sandbox.submit_count(), 1);
    }

    #[tokio::test]
    async fn test_forgetful_sandbox_gets_a_second_submission() {
        let sandbox = Arc::new(
            MockSandbox::new()
                .with_name("forgetful")
                .with_remember_submissions(false),
        );
        let resolver = DedupResolver::new(sandbox.clone());
        let file = temp_file(b"never indexed");
        let fp = FileHasher::new().hash_file(file.path()).unwrap();

        let a = resolver.resolve(&fp, file.path(), "a.exe").await.unwrap();
        let b = resolver.resolve(&fp, file.path(), "a.exe").await.unwrap();

        assert!(!a.is_reused());
        assert!(!b.is_reused());
        assert_ne!(a.task_id(), b.task_id());
        assert_eq!(sandbox.submit_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_resolutions_submit_once() {
        let sandbox = Arc::new(
            MockSandbox::new().with_submit_latency(Duration::from_millis(50)),
        );
        let resolver = DedupResolver::new(sandbox.clone());
        let first = temp_file(b"raced content");
        let second = temp_file(b"raced content");
        let fp = FileHasher::new().hash_file(first.path()).unwrap();

        let (a, b) = tokio::join!(
            resolver.resolve(&fp, first.path(), "one.exe"),
            resolver.resolve(&fp, second.path(), "two.exe"),
        );

        assert_eq!(a.unwrap().task_id(), b.unwrap().task_id());
        assert_eq!(sandbox.submit_count(), 1);
        assert_eq!(resolver.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_lookup_error_propagates_without_submit() {
        let sandbox = Arc::new(MockSandbox::new().with_lookup_failure(MockReply::Malformed));
        let resolver = DedupResolver::new(sandbox.clone());
        let file = temp_file(b"x");
        let fp = FileHasher::new().hash_file(file.path()).unwrap();

        let err = resolver.resolve(&fp, file.path(), "x.exe").await.unwrap_err();
        assert!(err.is_malformed());
        assert_eq!(sandbox.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_submit_error_propagates() {
        let sandbox = Arc::new(MockSandbox::new().with_submit_failure(MockReply::Transport));
        let resolver = DedupResolver::new(sandbox);
        let file = temp_file(b"y");
        let fp = FileHasher::new().hash_file(file.path()).unwrap();

        let err = resolver.resolve(&fp, file.path(), "y.exe").await.unwrap_err();
        assert!(err.is_transport());
    }
}
