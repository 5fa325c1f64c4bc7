//! Poll outcomes and per-file score reports.
//!
//! `PollOutcome` is what the poller's state machine ends in; `ScoreReport`
//! ties an outcome back to the file it was computed for so the scan loop
//! can emit it.

use crate::core::types::{Fingerprint, Score, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// The polling phase a task was in when polling stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    /// Waiting for the task to leave the `pending` status.
    AwaitingQueueExit,
    /// Waiting for the report to carry a score.
    AwaitingReport,
}

impl std::fmt::Display for PollPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AwaitingQueueExit => f.write_str("awaiting_queue_exit"),
            Self::AwaitingReport => f.write_str("awaiting_report"),
        }
    }
}

/// Terminal state of one poll sequence.
///
/// Only `Done` carries a real score. Every other outcome collapses to a
/// score of `0.0` through [`PollOutcome::score`], but stays distinguishable
/// here so operators can tell "undetermined" from "benign".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PollOutcome {
    /// The report carried a score.
    Done {
        /// The reported score.
        score: Score,
    },

    /// The time budget for a phase ran out.
    TimedOut {
        /// Phase that ran out of time.
        phase: PollPhase,
        /// How long that phase had been running.
        #[serde(with = "duration_serde")]
        elapsed: Duration,
    },

    /// The sandbox answered with something that could not be interpreted.
    Failed {
        /// Phase in which the bad answer arrived.
        phase: PollPhase,
        /// Description of the bad answer.
        reason: String,
    },
}

impl PollOutcome {
    /// Returns the score to report: the real one for `Done`, `0.0` otherwise.
    pub fn score(&self) -> Score {
        match self {
            Self::Done { score } => *score,
            _ => Score::ZERO,
        }
    }

    /// Returns `true` if the sandbox actually produced a score.
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done { .. })
    }

    /// Returns `true` if a phase ran out of time.
    pub fn is_timed_out(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Returns `true` if polling stopped on an uninterpretable answer.
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Short label used in log fields.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Done { .. } => "done",
            Self::TimedOut { .. } => "timed_out",
            Self::Failed { .. } => "failed",
        }
    }
}

/// The score produced for one file in one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreReport {
    /// File name without directories.
    pub file_name: String,

    /// Full path of the file.
    pub path: PathBuf,

    /// Content fingerprint.
    pub fingerprint: Fingerprint,

    /// Task the score came from.
    pub task_id: TaskId,

    /// Whether the task was found by hash instead of submitted.
    pub reused_task: bool,

    /// How polling ended.
    pub outcome: PollOutcome,

    /// Whether the score met the configured threshold.
    pub above_threshold: bool,

    /// When the report was produced.
    pub reported_at: DateTime<Utc>,
}

impl ScoreReport {
    /// Returns the reported score.
    pub fn score(&self) -> Score {
        self.outcome.score()
    }
}

/// Serde helper for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_scores() {
        let done = PollOutcome::Done {
            score: Score::new(7.5).unwrap(),
        };
        assert_eq!(done.score().value(), 7.5);
        assert!(done.is_done());

        let timed_out = PollOutcome::TimedOut {
            phase: PollPhase::AwaitingReport,
            elapsed: Duration::from_secs(300),
        };
        assert_eq!(timed_out.score(), Score::ZERO);
        assert!(timed_out.is_timed_out());

        let failed = PollOutcome::Failed {
            phase: PollPhase::AwaitingQueueExit,
            reason: "missing task.status".into(),
        };
        assert_eq!(failed.score(), Score::ZERO);
        assert_eq!(failed.label(), "failed");
    }

    #[test]
    fn test_outcome_serializes_tagged() {
        let outcome = PollOutcome::TimedOut {
            phase: PollPhase::AwaitingReport,
            elapsed: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["type"], "timed_out");
        assert_eq!(json["phase"], "awaiting_report");
        assert_eq!(json["elapsed"], 1500);
    }
}
