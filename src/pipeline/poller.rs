//! Polling a sandbox task until it yields a score or runs out of time.
//!
//! A task goes through two waits. First it sits in the sandbox queue with
//! status `pending`; then, once analysis has started, its report has to
//! appear with a score. Only the second wait has a default time limit.
//!
//! ```text
//! AwaitingQueueExit --(status != pending)--> AwaitingReport --(score)--> Done
//!        |                                        |
//!        +--(malformed status)--> Failed          +--(timeout)--> TimedOut
//!        +--(pending bound hit)--> TimedOut       +--(malformed report)--> Failed
//! ```
//!
//! Every terminal state yields a score through [`PollOutcome::score`]; the
//! non-`Done` ones yield `0.0`. Transport, authentication and rate-limit
//! errors are not outcomes: they abort the file and are returned as `Err`.

use crate::audit;
use crate::core::{ArcSandbox, PollOutcome, PollPhase, SandboxError, TaskId};

use std::time::Duration;
use tokio::time::Instant;

/// Timing configuration for the poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Wait between two checks, in both phases.
    pub poll_interval: Duration,

    /// Time allowed for the report to carry a score once the task left the
    /// queue.
    pub analysis_timeout: Duration,

    /// Time allowed in the `pending` state. `None` waits indefinitely.
    pub pending_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(20),
            analysis_timeout: Duration::from_secs(300),
            pending_timeout: None,
        }
    }
}

impl PollerConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Sets the analysis timeout.
    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    /// Bounds the time a task may stay `pending`.
    pub fn with_pending_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pending_timeout = timeout;
        self
    }
}

/// Drives one task from submission to a score.
#[derive(Debug)]
pub struct Poller {
    sandbox: ArcSandbox,
    config: PollerConfig,
}

impl Poller {
    /// Creates a poller over the given sandbox.
    pub fn new(sandbox: ArcSandbox, config: PollerConfig) -> Self {
        Self { sandbox, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Polls `task_id` until it has a score, times out or fails.
    pub async fn poll(&self, task_id: &TaskId) -> Result<PollOutcome, SandboxError> {
        let outcome = match self.await_queue_exit(task_id).await? {
            Some(outcome) => outcome,
            None => self.await_report(task_id).await?,
        };

        if !outcome.is_done() {
            audit::emit_poll_degraded(task_id, &outcome);
        }
        Ok(outcome)
    }

    /// Returns `Some` if polling ended while the task was still queued.
    async fn await_queue_exit(&self, task_id: &TaskId) -> Result<Option<PollOutcome>, SandboxError> {
        let queued_at = Instant::now();

        loop {
            let status = match self.sandbox.task_status(task_id).await {
                Ok(status) => status,
                Err(e) if e.is_malformed() => {
                    return Ok(Some(PollOutcome::Failed {
                        phase: PollPhase::AwaitingQueueExit,
                        reason: e.to_string(),
                    }));
                }
                Err(e) => return Err(e),
            };

            if !status.is_pending() {
                tracing::debug!(
                    sandbox = self.sandbox.name(),
                    task_id = %task_id,
                    status = %status,
                    "Task left the queue"
                );
                return Ok(None);
            }

            let elapsed = queued_at.elapsed();
            let pause = match self.config.pending_timeout {
                Some(limit) if elapsed >= limit => {
                    return Ok(Some(PollOutcome::TimedOut {
                        phase: PollPhase::AwaitingQueueExit,
                        elapsed,
                    }));
                }
                Some(limit) => self.config.poll_interval.min(limit - elapsed),
                None => self.config.poll_interval,
            };

            tracing::trace!(task_id = %task_id, "Task pending");
            tokio::time::sleep(pause).await;
        }
    }

    async fn await_report(&self, task_id: &TaskId) -> Result<PollOutcome, SandboxError> {
        let started = Instant::now();
        let timeout = self.config.analysis_timeout;

        while started.elapsed() < timeout {
            match self.sandbox.fetch_score(task_id).await {
                Ok(Some(score)) => {
                    tracing::debug!(
                        sandbox = self.sandbox.name(),
                        task_id = %task_id,
                        score = %score,
                        "Report ready"
                    );
                    return Ok(PollOutcome::Done { score });
                }
                Ok(None) => {}
                Err(e) if e.is_malformed() => {
                    return Ok(PollOutcome::Failed {
                        phase: PollPhase::AwaitingReport,
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }

            let remaining = timeout.saturating_sub(started.elapsed());
            tracing::trace!(task_id = %task_id, remaining_ms = remaining.as_millis() as u64, "Report not ready");
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
        }

        Ok(PollOutcome::TimedOut {
            phase: PollPhase::AwaitingReport,
            elapsed: started.elapsed(),
        })
    }
}
