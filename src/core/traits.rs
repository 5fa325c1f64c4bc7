//! Core traits for the sandbridge library.
//!
//! This module defines the `SandboxApi` trait that every sandbox client
//! implements. The pipeline only ever talks to the sandbox through it,
//! which is what lets the tests drive the dedup and polling logic with a
//! scripted client.

use crate::core::error::SandboxError;
use crate::core::types::{Fingerprint, Score, TaskId, TaskStatus};

use async_trait::async_trait;
use std::fmt::Debug;
use std::path::Path;

/// The four operations the pipeline needs from a malware-analysis sandbox.
///
/// # Implementation Notes
///
/// - Implementations must be `Send + Sync` for use across worker tasks.
/// - "Not there" is never an error: an unknown hash is `Ok(None)` from
///   `lookup_by_hash` and an unfinished report is `Ok(None)` from
///   `fetch_score`.
/// - A body that does not have the expected shape must be reported as
///   `SandboxError::MalformedResponse`, never folded into `None`. The
///   poller treats the two differently.
/// - Implementations should never panic.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use sandbridge::core::{Fingerprint, SandboxApi, SandboxError, Score, TaskId, TaskStatus};
/// use async_trait::async_trait;
/// use std::path::Path;
///
/// #[derive(Debug)]
/// struct MySandbox;
///
/// #[async_trait]
/// impl SandboxApi for MySandbox {
///     fn name(&self) -> &str {
///         "my-sandbox"
///     }
///
///     async fn lookup_by_hash(&self, fingerprint: &Fingerprint) -> Result<Option<TaskId>, SandboxError> {
///         todo!()
///     }
///
///     async fn submit(&self, path: &Path, file_name: &str) -> Result<TaskId, SandboxError> {
///         todo!()
///     }
///
///     async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus, SandboxError> {
///         todo!()
///     }
///
///     async fn fetch_score(&self, task_id: &TaskId) -> Result<Option<Score>, SandboxError> {
///         todo!()
///     }
/// }
/// ```
#[async_trait]
pub trait SandboxApi: Send + Sync + Debug {
    /// Returns a stable, human-readable name for log fields.
    fn name(&self) -> &str;

    /// Looks up a previous analysis of content with this fingerprint.
    ///
    /// Returns the first task recorded for the sample, or `None` if the
    /// sandbox has never seen it.
    async fn lookup_by_hash(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Option<TaskId>, SandboxError>;

    /// Uploads a file for analysis and returns the new task.
    async fn submit(&self, path: &Path, file_name: &str) -> Result<TaskId, SandboxError>;

    /// Returns the current status of a task.
    async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus, SandboxError>;

    /// Returns the task's score once its report exists.
    async fn fetch_score(&self, task_id: &TaskId) -> Result<Option<Score>, SandboxError>;
}

/// An arc-wrapped sandbox client for shared ownership.
pub type ArcSandbox = std::sync::Arc<dyn SandboxApi>;
