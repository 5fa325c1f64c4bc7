//! Structured audit logging.
//!
//! Every file the scan loop touches leaves a trail on the
//! `sandbridge::audit` tracing target: skipped, resolved to a task, scored
//! (or degraded to `0.0`), or abandoned. Route that target to its own sink
//! with the subscriber's filter to keep a permanent record of scores.

mod events;

pub use events::{
    emit_cycle_completed, emit_file_abandoned, emit_file_skipped, emit_poll_degraded,
    emit_score_report, emit_task_resolved, AuditEvent, ScoreAuditEvent,
};
