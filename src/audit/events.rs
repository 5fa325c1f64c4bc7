//! Audit event types and emission functions.

use crate::core::{FileRef, Fingerprint, PollOutcome, SandboxError, ScoreReport, TaskId};
use crate::pipeline::{CycleSummary, Resolution};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Base trait for audit events.
pub trait AuditEvent: Serialize {
    /// Returns the event type name.
    fn event_type(&self) -> &'static str;

    /// Returns the timestamp of the event.
    fn timestamp(&self) -> DateTime<Utc>;
}

/// Audit record of one file's score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreAuditEvent {
    /// Timestamp of the event.
    pub timestamp: DateTime<Utc>,

    /// File name as found in the watched directory.
    pub file_name: String,

    /// Full path of the file.
    pub path: String,

    /// SHA-256 of the file content.
    pub sha256: String,

    /// Sandbox task the score came from.
    pub task_id: String,

    /// Whether an earlier task was reused instead of submitting.
    pub reused_task: bool,

    /// `done`, `timed_out` or `failed`.
    pub outcome: String,

    /// The reported score; `0.0` unless the outcome is `done`.
    pub score: f64,

    /// Whether the score met the configured threshold.
    pub above_threshold: bool,
}

impl From<&ScoreReport> for ScoreAuditEvent {
    fn from(report: &ScoreReport) -> Self {
        Self {
            timestamp: report.reported_at,
            file_name: report.file_name.clone(),
            path: report.path.display().to_string(),
            sha256: report.fingerprint.as_str().to_string(),
            task_id: report.task_id.to_string(),
            reused_task: report.reused_task,
            outcome: report.outcome.label().to_string(),
            score: report.score().value(),
            above_threshold: report.above_threshold,
        }
    }
}

impl AuditEvent for ScoreAuditEvent {
    fn event_type(&self) -> &'static str {
        "score_report"
    }

    fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Emits an audit event for a file that was not sent to the sandbox.
pub fn emit_file_skipped(file: &FileRef, reason: &str) {
    tracing::info!(
        target: "sandbridge::audit",
        event_type = "file_skipped",
        file_name = %file.name(),
        extension = ?file.extension(),
        reason = %reason,
        "File skipped"
    );
}

/// Emits an audit event once a file is bound to a sandbox task.
pub fn emit_task_resolved(file: &FileRef, fingerprint: &Fingerprint, resolution: &Resolution) {
    tracing::info!(
        target: "sandbridge::audit",
        event_type = "task_resolved",
        file_name = %file.name(),
        sha256 = %fingerprint.as_str(),
        task_id = %resolution.task_id(),
        reused_task = resolution.is_reused(),
        "Task resolved"
    );
}

/// Emits the per-file score line.
///
/// Scores at or above the threshold are logged at `warn`.
pub fn emit_score_report(report: &ScoreReport) {
    let event = ScoreAuditEvent::from(report);

    if event.above_threshold {
        tracing::warn!(
            target: "sandbridge::audit",
            event_type = event.event_type(),
            reported_at = %event.timestamp().to_rfc3339(),
            file_name = %event.file_name,
            sha256 = %event.sha256,
            task_id = %event.task_id,
            reused_task = event.reused_task,
            outcome = %event.outcome,
            score = event.score,
            "Score for {} is {}",
            event.file_name,
            event.score
        );
    } else {
        tracing::info!(
            target: "sandbridge::audit",
            event_type = event.event_type(),
            reported_at = %event.timestamp().to_rfc3339(),
            file_name = %event.file_name,
            sha256 = %event.sha256,
            task_id = %event.task_id,
            reused_task = event.reused_task,
            outcome = %event.outcome,
            score = event.score,
            "Score for {} is {}",
            event.file_name,
            event.score
        );
    }
}

/// Emits an audit event when polling ended without a real score.
pub fn emit_poll_degraded(task_id: &TaskId, outcome: &PollOutcome) {
    match outcome {
        PollOutcome::Done { .. } => {}
        PollOutcome::TimedOut { phase, elapsed } => {
            tracing::warn!(
                target: "sandbridge::audit",
                event_type = "poll_timed_out",
                task_id = %task_id,
                phase = %phase,
                elapsed_ms = elapsed.as_millis() as u64,
                "Gave up waiting for task"
            );
        }
        PollOutcome::Failed { phase, reason } => {
            tracing::warn!(
                target: "sandbridge::audit",
                event_type = "poll_failed",
                task_id = %task_id,
                phase = %phase,
                reason = %reason,
                "Sandbox answer could not be interpreted"
            );
        }
    }
}

/// Emits an audit event for a file dropped from the current cycle.
pub fn emit_file_abandoned(file: &FileRef, error: &SandboxError) {
    tracing::error!(
        target: "sandbridge::audit",
        event_type = "file_abandoned",
        file_name = %file.name(),
        endpoint = ?error.endpoint(),
        recoverable = error.is_recoverable(),
        retry_after_secs = ?error.retry_after().map(|d| d.as_secs()),
        error = %error,
        "File abandoned for this cycle"
    );
}

/// Emits the end-of-cycle summary.
pub fn emit_cycle_completed(summary: &CycleSummary, next_in: Duration) {
    tracing::info!(
        target: "sandbridge::audit",
        event_type = "cycle_completed",
        cycle_id = %summary.cycle_id,
        discovered = summary.discovered,
        skipped = summary.skipped,
        scored = summary.scored,
        timed_out = summary.timed_out,
        failed = summary.failed,
        errors = summary.errors,
        above_threshold = summary.above_threshold,
        duration_ms = summary.duration.as_millis() as u64,
        next_cycle_in_secs = next_in.as_secs(),
        "Cycle completed"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PollPhase, Score};
    use std::path::PathBuf;

    fn report(outcome: PollOutcome, above_threshold: bool) -> ScoreReport {
        ScoreReport {
            file_name: "sample.exe".to_string(),
            path: PathBuf::from("/nsm/bro/extracted/sample.exe"),
            fingerprint: Fingerprint::new("ABCDEF"),
            task_id: TaskId::new("42"),
            reused_task: true,
            outcome,
            above_threshold,
            reported_at: Utc::now(),
        }
    }

    #[test]
    fn test_score_event_from_report() {
        let report = report(
            PollOutcome::Done {
                score: Score::new(7.5).unwrap(),
            },
            true,
        );
        let event = ScoreAuditEvent::from(&report);

        assert_eq!(event.event_type(), "score_report");
        assert_eq!(event.timestamp(), report.reported_at);
        assert_eq!(event.file_name, "sample.exe");
        assert_eq!(event.sha256, "abcdef");
        assert_eq!(event.task_id, "42");
        assert_eq!(event.outcome, "done");
        assert_eq!(event.score, 7.5);
        assert!(event.reused_task);
        assert!(event.above_threshold);
    }

    #[test]
    fn test_timed_out_event_scores_zero() {
        let event = ScoreAuditEvent::from(&report(
            PollOutcome::TimedOut {
                phase: PollPhase::AwaitingReport,
                elapsed: Duration::from_secs(300),
            },
            false,
        ));

        assert_eq!(event.outcome, "timed_out");
        assert_eq!(event.score, 0.0);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["score"], 0.0);
        assert_eq!(json["path"], "/nsm/bro/extracted/sample.exe");
    }
}
