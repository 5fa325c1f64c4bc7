//! Scripted sandbox for testing.
//!
//! This module provides a configurable in-memory `SandboxApi` that can be
//! used in tests to drive the dedup resolver, the poller and the scan loop
//! without a running Cuckoo instance.

use crate::core::{FileHasher, Fingerprint, SandboxApi, SandboxError, Score, TaskId, TaskStatus};

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// One scripted answer from the mock.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply<T> {
    /// Answer with a value.
    Value(T),
    /// Answer with a `MalformedResponse` error.
    Malformed,
    /// Answer with a `Transport` error.
    Transport,
}

impl<T> MockReply<T> {
    fn into_result(self, endpoint: &str) -> Result<T, SandboxError> {
        match self {
            Self::Value(value) => Ok(value),
            Self::Malformed => Err(SandboxError::malformed(endpoint, "scripted malformed body")),
            Self::Transport => Err(SandboxError::transport(endpoint, "scripted transport failure")),
        }
    }
}

/// A scripted sandbox.
///
/// By default every hash is unknown, submissions hand out increasing task
/// ids starting at 1 and are remembered, so a later lookup of the same
/// content finds the earlier task. Tasks report a non-pending status and
/// a score of `0.0` unless scripted otherwise.
///
/// # Examples
///
/// ```rust
/// use sandbridge::backends::MockSandbox;
/// use sandbridge::core::{Score, TaskId};
///
/// let sandbox = MockSandbox::new()
///     .with_next_task_id(42)
///     .with_pending(TaskId::new("42"), 1)
///     .with_score(TaskId::new("42"), Score::new(7.5).unwrap());
/// assert_eq!(sandbox.submit_count(), 0);
/// ```
#[derive(Debug)]
pub struct MockSandbox {
    name: String,
    known: Mutex<HashMap<Fingerprint, TaskId>>,
    statuses: Mutex<HashMap<TaskId, VecDeque<MockReply<TaskStatus>>>>,
    scores: Mutex<HashMap<TaskId, VecDeque<MockReply<Option<Score>>>>>,
    final_scores: Mutex<HashMap<TaskId, Option<Score>>>,
    default_score: Option<Score>,
    lookup_failure: Option<MockReply<Option<TaskId>>>,
    submit_failure: Option<MockReply<TaskId>>,
    remember_submissions: bool,
    submit_latency: Option<Duration>,
    next_task_id: AtomicU64,
    submitted: Mutex<Vec<String>>,
    lookup_count: AtomicU64,
    submit_count: AtomicU64,
    status_count: AtomicU64,
    score_count: AtomicU64,
}

impl MockSandbox {
    /// Creates a new mock with default behaviour.
    pub fn new() -> Self {
        Self {
            name: "mock".to_string(),
            known: Mutex::new(HashMap::new()),
            statuses: Mutex::new(HashMap::new()),
            scores: Mutex::new(HashMap::new()),
            final_scores: Mutex::new(HashMap::new()),
            default_score: Some(Score::ZERO),
            lookup_failure: None,
            submit_failure: None,
            remember_submissions: true,
            submit_latency: None,
            next_task_id: AtomicU64::new(1),
            submitted: Mutex::new(Vec::new()),
            lookup_count: AtomicU64::new(0),
            submit_count: AtomicU64::new(0),
            status_count: AtomicU64::new(0),
            score_count: AtomicU64::new(0),
        }
    }

    /// Sets the name of this mock.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the id handed out by the next submission.
    pub fn with_next_task_id(self, id: u64) -> Self {
        self.next_task_id.store(id, Ordering::SeqCst);
        self
    }

    /// Makes a fingerprint known to the sandbox under the given task.
    pub fn with_known_hash(self, fingerprint: Fingerprint, task_id: TaskId) -> Self {
        lock(&self.known).insert(fingerprint, task_id);
        self
    }

    /// Scripts the answers of the status endpoint for a task.
    ///
    /// Once the script runs out the task reports `completed`.
    pub fn with_status_script(self, task_id: TaskId, replies: Vec<MockReply<TaskStatus>>) -> Self {
        lock(&self.statuses).insert(task_id, replies.into());
        self
    }

    /// Makes a task report `pending` for the first `times` status checks.
    pub fn with_pending(self, task_id: TaskId, times: usize) -> Self {
        let replies = vec![MockReply::Value(TaskStatus::Pending); times];
        self.with_status_script(task_id, replies)
    }

    /// Scripts the answers of the report endpoint for a task.
    ///
    /// Once the script runs out the task's final score (or the default
    /// score) is returned.
    pub fn with_score_script(
        self,
        task_id: TaskId,
        replies: Vec<MockReply<Option<Score>>>,
    ) -> Self {
        lock(&self.scores).insert(task_id, replies.into());
        self
    }

    /// Sets the score a task's report eventually carries.
    pub fn with_score(self, task_id: TaskId, score: Score) -> Self {
        lock(&self.final_scores).insert(task_id, Some(score));
        self
    }

    /// Sets the score for tasks without a scripted one. `None` means the
    /// report is never ready.
    pub fn with_default_score(mut self, score: Option<Score>) -> Self {
        self.default_score = score;
        self
    }

    /// Makes every lookup fail.
    pub fn with_lookup_failure(mut self, failure: MockReply<Option<TaskId>>) -> Self {
        self.lookup_failure = Some(failure);
        self
    }

    /// Makes every submission fail.
    pub fn with_submit_failure(mut self, failure: MockReply<TaskId>) -> Self {
        self.submit_failure = Some(failure);
        self
    }

    /// Controls whether submitted content becomes visible to later lookups.
    pub fn with_remember_submissions(mut self, remember: bool) -> Self {
        self.remember_submissions = remember;
        self
    }

    /// Delays every submission, to widen race windows in tests.
    pub fn with_submit_latency(mut self, latency: Duration) -> Self {
        self.submit_latency = Some(latency);
        self
    }

    /// Returns the number of hash lookups performed.
    pub fn lookup_count(&self) -> u64 {
        self.lookup_count.load(Ordering::SeqCst)
    }

    /// Returns the number of submissions performed.
    pub fn submit_count(&self) -> u64 {
        self.submit_count.load(Ordering::SeqCst)
    }

    /// Returns the number of status checks performed.
    pub fn status_count(&self) -> u64 {
        self.status_count.load(Ordering::SeqCst)
    }

    /// Returns the number of report fetches performed.
    pub fn score_count(&self) -> u64 {
        self.score_count.load(Ordering::SeqCst)
    }

    /// Returns the total number of calls made against the mock.
    pub fn total_calls(&self) -> u64 {
        self.lookup_count() + self.submit_count() + self.status_count() + self.score_count()
    }

    /// Returns the file names submitted so far, in order.
    pub fn submitted_files(&self) -> Vec<String> {
        lock(&self.submitted).clone()
    }
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl SandboxApi for MockSandbox {
    fn name(&self) -> &str {
        &self.name
    }

    async fn lookup_by_hash(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TaskId>, SandboxError> {
        self.lookup_count.fetch_add(1, Ordering::SeqCst);

        if let Some(failure) = &self.lookup_failure {
            return failure.clone().into_result("/files/view/sha256");
        }

        Ok(lock(&self.known).get(fingerprint).cloned())
    }

    async fn submit(&self, path: &Path, file_name: &str) -> Result<TaskId, SandboxError> {
        self.submit_count.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.submit_latency {
            tokio::time::sleep(latency).await;
        }

        if let Some(failure) = &self.submit_failure {
            return failure.clone().into_result("/tasks/create/file");
        }

        let fingerprint = FileHasher::new().hash_file_async(path).await?;
        let task_id = TaskId::from(self.next_task_id.fetch_add(1, Ordering::SeqCst));

        if self.remember_submissions {
            lock(&self.known).insert(fingerprint, task_id.clone());
        }
        lock(&self.submitted).push(file_name.to_string());

        Ok(task_id)
    }

    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus, SandboxError> {
        self.status_count.fetch_add(1, Ordering::SeqCst);

        let reply = lock(&self.statuses)
            .get_mut(task_id)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(reply) => reply.into_result("/tasks/view"),
            None => Ok(TaskStatus::Other("completed".to_string())),
        }
    }

    async fn fetch_score(&self, task_id: &TaskId) -> Result<Option<Score>, SandboxError> {
        self.score_count.fetch_add(1, Ordering::SeqCst);

        let reply = lock(&self.scores)
            .get_mut(task_id)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(reply) => reply.into_result("/tasks/report"),
            None => Ok(lock(&self.final_scores)
                .get(task_id)
                .copied()
                .unwrap_or(self.default_score)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_submission_is_remembered() {
        let sandbox = MockSandbox::new().with_next_task_id(42);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"payload").unwrap();

        let fingerprint = FileHasher::new().hash_file(file.path()).unwrap();
        assert_eq!(sandbox.lookup_by_hash(&fingerprint).await.unwrap(), None);

        let task = sandbox.submit(file.path(), "payload.bin").await.unwrap();
        assert_eq!(task, TaskId::new("42"));
        assert_eq!(
            sandbox.lookup_by_hash(&fingerprint).await.unwrap(),
            Some(TaskId::new("42"))
        );
        assert_eq!(sandbox.submitted_files(), vec!["payload.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_status_script_then_default() {
        let task = TaskId::new("1");
        let sandbox = MockSandbox::new().with_status_script(
            task.clone(),
            vec![MockReply::Value(TaskStatus::Pending), MockReply::Malformed],
        );

        assert!(sandbox.task_status(&task).await.unwrap().is_pending());
        assert!(sandbox.task_status(&task).await.unwrap_err().is_malformed());
        assert!(!sandbox.task_status(&task).await.unwrap().is_pending());
        assert_eq!(sandbox.status_count(), 3);
    }

    #[tokio::test]
    async fn test_score_script_then_final() {
        let task = TaskId::new("5");
        let sandbox = MockSandbox::new()
            .with_score_script(task.clone(), vec![MockReply::Value(None)])
            .with_score(task.clone(), Score::new(2.5).unwrap());

        assert_eq!(sandbox.fetch_score(&task).await.unwrap(), None);
        assert_eq!(sandbox.fetch_score(&task).await.unwrap(), Score::new(2.5));
    }

    #[test]
    fn test_name() {
        assert_eq!(MockSandbox::new().name(), "mock");
        assert_eq!(MockSandbox::new().with_name("lab-cuckoo").name(), "lab-cuckoo");
    }

    #[tokio::test]
    async fn test_lookup_failure() {
        let sandbox = MockSandbox::new().with_lookup_failure(MockReply::Transport);
        let err = sandbox
            .lookup_by_hash(&Fingerprint::new("ab"))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }
}
