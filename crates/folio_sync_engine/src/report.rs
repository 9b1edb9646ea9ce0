//! Run reports and aggregate statistics.

use crate::classify::{classify, ErrorKind};
use crate::error::SyncError;
use chrono::{DateTime, Utc};
use folio_sync_protocol::ConflictRecord;
use std::time::Duration;

/// Operation label used for run-level failures such as cancellation.
pub const RUN_OPERATION: &str = "sync";

/// One failure recorded during a run. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// Step that failed, e.g. `upload_article_<id>`.
    pub operation: String,
    /// Failure message.
    pub error: String,
    /// Taxonomy kind.
    pub kind: ErrorKind,
    /// Whether a later run could succeed.
    pub retryable: bool,
}

impl SyncFailure {
    /// Records `error` as the failure of `operation`.
    pub fn from_error(operation: impl Into<String>, error: &SyncError) -> Self {
        let classification = classify(error);
        Self {
            operation: operation.into(),
            error: error.to_string(),
            kind: classification.kind,
            retryable: classification.retryable,
        }
    }

    /// The failure appended when a run is cancelled.
    pub fn aborted() -> Self {
        Self::from_error(RUN_OPERATION, &SyncError::Aborted)
    }

    /// Returns true if this records a cancellation.
    pub fn is_abort(&self) -> bool {
        self.kind == ErrorKind::Aborted
    }
}

/// Final summary of one sync run. Produced exactly once per run.
#[derive(Debug, Clone)]
pub struct SyncReport {
    /// False if the run was aborted or failed structurally.
    pub success: bool,
    /// Articles uploaded, created locally, or overwritten locally.
    pub synced_count: u64,
    /// Conflicts detected, including ones left for manual resolution.
    pub conflict_count: u64,
    /// Number of entries in `errors`.
    pub error_count: u64,
    /// Failures in the order they happened.
    pub errors: Vec<SyncFailure>,
    /// Conflict records in the order they were resolved.
    pub conflicts: Vec<ConflictRecord>,
    /// Upload batches dispatched.
    pub upload_batches: usize,
    /// Download batches dispatched.
    pub download_batches: usize,
    /// Instant the run started.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if the run stopped on cancellation.
    pub fn was_aborted(&self) -> bool {
        self.errors.iter().any(SyncFailure::is_abort)
    }

    /// Returns the conflicts waiting for a caller decision.
    pub fn pending_conflicts(&self) -> impl Iterator<Item = &ConflictRecord> {
        self.conflicts.iter().filter(|c| c.is_pending())
    }
}

/// Counters aggregated across runs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncStats {
    /// Runs that passed the in-progress guard.
    pub runs_started: u64,
    /// Runs that finished with `success = true`.
    pub runs_succeeded: u64,
    /// Runs that failed structurally.
    pub runs_failed: u64,
    /// Runs stopped by cancellation.
    pub runs_aborted: u64,
    /// Total synced articles.
    pub articles_synced: u64,
    /// Total conflicts.
    pub conflicts_encountered: u64,
    /// Total recorded failures.
    pub errors_recorded: u64,
    /// Start instant of the last successful run.
    pub last_success_at: Option<DateTime<Utc>>,
    /// Message of the last failure, if the last run had any.
    pub last_error: Option<String>,
    /// Duration of the last run.
    pub last_duration: Option<Duration>,
}

impl SyncStats {
    /// Folds a finished run into the counters.
    pub fn record(&mut self, report: &SyncReport) {
        self.runs_started += 1;
        if report.success {
            self.runs_succeeded += 1;
            self.last_success_at = Some(report.started_at);
        } else if report.was_aborted() {
            self.runs_aborted += 1;
        } else {
            self.runs_failed += 1;
        }
        self.articles_synced += report.synced_count;
        self.conflicts_encountered += report.conflict_count;
        self.errors_recorded += report.error_count;
        self.last_error = report.errors.last().map(|f| f.error.clone());
        self.last_duration = Some(report.duration);
    }
}
