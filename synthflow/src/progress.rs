//! Run-scoped progress tracking.
//!
//! One tracker exists per pipeline run. Stage executors update it from
//! many concurrent call sites, so counters and the error log live behind
//! a mutex; a consistent [`ProgressSnapshot`] can be exported at any
//! time. Records are never merged across runs.

use crate::core::{ItemId, PipelineStage, Verdict};
use crate::errors::{FailureClass, StageFailure};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One entry in the run's error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    /// The item that failed.
    pub item_id: ItemId,
    /// The stage at which it failed.
    pub stage: PipelineStage,
    /// Failure classification for operator triage.
    pub class: FailureClass,
    /// Human-readable failure message.
    pub message: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct ProgressInner {
    stage_counts: BTreeMap<PipelineStage, usize>,
    approved: usize,
    needs_revision: usize,
    rejected: usize,
    committed: usize,
    failed: usize,
    held_back: usize,
    errors: Vec<ErrorRecord>,
}

/// Mutable, run-scoped record of counts-per-stage and errors.
#[derive(Debug)]
pub struct ProgressTracker {
    total_items: usize,
    inner: Mutex<ProgressInner>,
}

impl ProgressTracker {
    /// Creates a tracker for a run over `total_items` items.
    #[must_use]
    pub fn new(total_items: usize) -> Self {
        Self {
            total_items,
            inner: Mutex::new(ProgressInner::default()),
        }
    }

    /// The number of items in the run.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.total_items
    }

    /// Counts one item passing the given stage.
    pub fn record_stage_success(&self, stage: PipelineStage) {
        let mut inner = self.inner.lock();
        *inner.stage_counts.entry(stage).or_default() += 1;
    }

    /// Records a terminal per-item failure and appends to the error log.
    pub fn record_failure(&self, item_id: ItemId, stage: PipelineStage, failure: &StageFailure) {
        let mut inner = self.inner.lock();
        inner.failed += 1;
        inner.errors.push(ErrorRecord {
            item_id,
            stage,
            class: failure.class(),
            message: failure.to_string(),
            timestamp: Utc::now(),
        });
    }

    /// Counts a validation verdict.
    pub fn record_verdict(&self, verdict: Verdict) {
        let mut inner = self.inner.lock();
        match verdict {
            Verdict::Approved => inner.approved += 1,
            Verdict::NeedsRevision => inner.needs_revision += 1,
            Verdict::Rejected => inner.rejected += 1,
        }
    }

    /// Counts a needs-revision item held back from commit (terminal).
    pub fn record_held_back(&self) {
        self.inner.lock().held_back += 1;
    }

    /// Counts one committed item.
    pub fn record_committed(&self) {
        self.inner.lock().committed += 1;
    }

    /// Number of error records so far.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.inner.lock().errors.len()
    }

    /// Exports a consistent snapshot of the run's progress.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.inner.lock();
        let terminal = inner.failed + inner.rejected + inner.held_back + inner.committed;
        ProgressSnapshot {
            total_items: self.total_items,
            stage_counts: inner
                .stage_counts
                .iter()
                .map(|(stage, count)| (stage.to_string(), *count))
                .collect(),
            approved: inner.approved,
            needs_revision: inner.needs_revision,
            rejected: inner.rejected,
            committed: inner.committed,
            failed: inner.failed,
            error_count: inner.errors.len(),
            completion_percentage: percentage(terminal, self.total_items),
            success_rate: percentage(inner.committed, self.total_items),
            errors: inner.errors.clone(),
        }
    }
}

fn percentage(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        #[allow(clippy::cast_precision_loss)]
        {
            part as f64 / total as f64 * 100.0
        }
    }
}

/// Read-only export of a run's progress.
///
/// `completion_percentage` counts items that reached a terminal state;
/// `success_rate` counts committed items. Both are over the run's total.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Items accepted into the run.
    pub total_items: usize,
    /// Items that passed each stage, keyed by stage name.
    pub stage_counts: BTreeMap<String, usize>,
    /// Items the validator approved.
    pub approved: usize,
    /// Items the validator flagged for revision.
    pub needs_revision: usize,
    /// Items the validator rejected.
    pub rejected: usize,
    /// Items written to the persistent store.
    pub committed: usize,
    /// Items that failed at some stage.
    pub failed: usize,
    /// Number of error records.
    pub error_count: usize,
    /// Terminal items over total, as a percentage.
    pub completion_percentage: f64,
    /// Committed items over total, as a percentage.
    pub success_rate: f64,
    /// The ordered error log.
    pub errors: Vec<ErrorRecord>,
}
