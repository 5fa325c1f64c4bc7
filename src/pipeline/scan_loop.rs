//! The directory scan loop.

use crate::audit;
use crate::core::{
    ArcSandbox, FileHasher, FileRef, PollOutcome, SandboxError, ScoreReport,
};
use crate::pipeline::dedup::DedupResolver;
use crate::pipeline::poller::{Poller, PollerConfig};

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::Instrument;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;
use walkdir::WalkDir;

/// Configuration for the scan loop.
#[derive(Debug, Clone)]
pub struct ScanLoopConfig {
    /// Directory the network monitor extracts files into.
    pub watch_dir: PathBuf,

    /// Extensions that are never submitted (compared exactly).
    pub disallowed_extensions: Vec<String>,

    /// Pause after every cycle.
    pub cycle_interval: Duration,

    /// Maximum number of files processed at the same time.
    pub max_concurrent_files: usize,

    /// Scores at or above this value are flagged in reports.
    pub score_threshold: f64,
}

impl Default for ScanLoopConfig {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("/nsm/bro/extracted"),
            disallowed_extensions: vec!["zip".to_string()],
            cycle_interval: Duration::from_secs(60),
            max_concurrent_files: 1,
            score_threshold: 4.0,
        }
    }
}

impl ScanLoopConfig {
    /// Creates a configuration watching `watch_dir`, with defaults otherwise.
    pub fn new(watch_dir: impl Into<PathBuf>) -> Self {
        Self {
            watch_dir: watch_dir.into(),
            ..Self::default()
        }
    }

    /// Sets the disallowed extensions.
    pub fn with_disallowed_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disallowed_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the pause between cycles.
    pub fn with_cycle_interval(mut self, interval: Duration) -> Self {
        self.cycle_interval = interval;
        self
    }

    /// Sets the number of files processed concurrently.
    pub fn with_max_concurrent_files(mut self, max: usize) -> Self {
        self.max_concurrent_files = max.max(1);
        self
    }

    /// Sets the score threshold.
    pub fn with_score_threshold(mut self, threshold: f64) -> Self {
        self.score_threshold = threshold;
        self
    }
}

/// Counters for one pass over the watched directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSummary {
    /// Identifier used to correlate the cycle's log lines.
    pub cycle_id: Uuid,
    /// Regular files found.
    pub discovered: usize,
    /// Files skipped because of their extension.
    pub skipped: usize,
    /// Files for which the sandbox produced a score.
    pub scored: usize,
    /// Files whose polling ran out of time.
    pub timed_out: usize,
    /// Files whose polling stopped on an uninterpretable answer.
    pub failed: usize,
    /// Files abandoned because of an error (unreadable, unreachable sandbox, ...).
    pub errors: usize,
    /// Reports whose score met the threshold.
    pub above_threshold: usize,
    /// Wall time of the cycle.
    pub duration: Duration,
}

impl CycleSummary {
    fn new() -> Self {
        Self {
            cycle_id: Uuid::new_v4(),
            discovered: 0,
            skipped: 0,
            scored: 0,
            timed_out: 0,
            failed: 0,
            errors: 0,
            above_threshold: 0,
            duration: Duration::ZERO,
        }
    }

    /// Number of files that went through the pipeline and got a report.
    pub fn reported(&self) -> usize {
        self.scored + self.timed_out + self.failed
    }

    fn record(&mut self, report: &ScoreReport) {
        match report.outcome {
            PollOutcome::Done { .. } => self.scored += 1,
            PollOutcome::TimedOut { .. } => self.timed_out += 1,
            PollOutcome::Failed { .. } => self.failed += 1,
        }
        if report.above_threshold {
            self.above_threshold += 1;
        }
    }
}

/// Watches a directory and scores every eligible file in it, forever.
///
/// Each cycle re-enumerates the directory and re-queries the sandbox for
/// every file; nothing is remembered between cycles. Per-file failures are
/// logged and counted but never end a cycle or the loop.
#[derive(Debug)]
pub struct ScanLoop {
    hasher: FileHasher,
    resolver: DedupResolver,
    poller: Poller,
    config: ScanLoopConfig,
}

impl ScanLoop {
    /// Creates a scan loop over the given sandbox.
    pub fn new(sandbox: ArcSandbox, config: ScanLoopConfig, poller_config: PollerConfig) -> Self {
        Self {
            hasher: FileHasher::new(),
            resolver: DedupResolver::new(sandbox.clone()),
            poller: Poller::new(sandbox, poller_config),
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ScanLoopConfig {
        &self.config
    }

    /// Returns `true` if the file's extension is on the disallow list.
    ///
    /// Files without an extension are never disallowed.
    pub fn is_disallowed(&self, file: &FileRef) -> bool {
        file.extension().is_some_and(|ext| {
            self.config
                .disallowed_extensions
                .iter()
                .any(|denied| denied == ext)
        })
    }

    /// Runs cycles until the task is dropped.
    pub async fn run_forever(&self) {
        loop {
            let summary = self.run_cycle().await;
            audit::emit_cycle_completed(&summary, self.config.cycle_interval);
            tokio::time::sleep(self.config.cycle_interval).await;
        }
    }

    /// Runs one pass over the watched directory.
    pub async fn run_cycle(&self) -> CycleSummary {
        let summary = CycleSummary::new();
        let span = tracing::info_span!("cycle", cycle_id = %summary.cycle_id);
        self.cycle(summary).instrument(span).await
    }

    async fn cycle(&self, mut summary: CycleSummary) -> CycleSummary {
        let started = Instant::now();

        let paths = enumerate_files(self.config.watch_dir.clone()).await;
        summary.discovered = paths.len();

        let mut eligible = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(file) = FileRef::from_path(path.clone()) else {
                tracing::warn!(path = %path.display(), "Skipping path without a file name");
                summary.skipped += 1;
                continue;
            };

            if self.is_disallowed(&file) {
                audit::emit_file_skipped(&file, "disallowed extension");
                summary.skipped += 1;
                continue;
            }

            eligible.push(file);
        }

        let mut results = stream::iter(eligible)
            .map(|file| async move {
                let result = self.process_file(&file).await;
                (file, result)
            })
            .buffer_unordered(self.config.max_concurrent_files.max(1));

        while let Some((file, result)) = results.next().await {
            match result {
                Ok(report) => {
                    audit::emit_score_report(&report);
                    summary.record(&report);
                }
                Err(e) => {
                    audit::emit_file_abandoned(&file, &e);
                    summary.errors += 1;
                }
            }
        }

        summary.duration = started.elapsed();
        summary
    }

    /// Runs one file through hashing, dedup and polling.
    pub async fn process_file(&self, file: &FileRef) -> Result<ScoreReport, SandboxError> {
        tracing::debug!(
            file_name = %file.name(),
            extension = ?file.extension(),
            "Processing file"
        );

        let fingerprint = self.hasher.hash_file_async(file.path()).await?;
        let resolution = self
            .resolver
            .resolve(&fingerprint, file.path(), file.name())
            .await?;
        audit::emit_task_resolved(file, &fingerprint, &resolution);

        let task_id = resolution.task_id().clone();
        let outcome = self.poller.poll(&task_id).await?;
        let above_threshold = outcome.score().meets(self.config.score_threshold);

        Ok(ScoreReport {
            file_name: file.name().to_string(),
            path: file.path().to_path_buf(),
            fingerprint,
            task_id,
            reused_task: resolution.is_reused(),
            outcome,
            above_threshold,
            reported_at: Utc::now(),
        })
    }
}

/// Lists every regular file below `root`, off the async runtime.
async fn enumerate_files(root: PathBuf) -> Vec<PathBuf> {
    let walk_root = root.clone();
    match tokio::task::spawn_blocking(move || walk_files(&walk_root)).await {
        Ok(paths) => paths,
        Err(e) => {
            tracing::error!(root = %root.display(), error = %e, "Directory walk task failed");
            Vec::new()
        }
    }
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();

    for entry in WalkDir::new(root).min_depth(1).follow_links(false) {
        match entry {
            Ok(entry) if entry.file_type().is_file() => {
                let path = std::fs::canonicalize(entry.path())
                    .unwrap_or_else(|_| entry.path().to_path_buf());
                paths.push(path);
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    root = %root.display(),
                    path = ?e.path(),
                    error = %e,
                    "Skipping unreadable directory entry"
                );
            }
        }
    }

    paths
}
