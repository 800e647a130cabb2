//! The pipeline driver: sequences stages over a surviving item set.

use super::PipelineConfig;
use crate::core::{
    ItemId, ItemStatus, PipelineStage, Review, StageOutcome, Verdict, WorkItem,
};
use crate::errors::{PipelineError, StageFailure};
use crate::executor::StageExecutor;
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::resilience::{CircuitBreaker, ResilientCall};
use crate::services::{CommitService, RecordId, StageService, StorageSink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The five collaborators backing a pipeline, one per stage.
#[derive(Debug, Clone)]
pub struct StageSet {
    ingest: Arc<dyn StageService>,
    enrich: Arc<dyn StageService>,
    transform: Arc<dyn StageService>,
    validate: Arc<dyn StageService>,
    commit: Arc<dyn StageService>,
}

impl StageSet {
    /// Assembles a stage set from five collaborators.
    #[must_use]
    pub fn new(
        ingest: Arc<dyn StageService>,
        enrich: Arc<dyn StageService>,
        transform: Arc<dyn StageService>,
        validate: Arc<dyn StageService>,
        commit: Arc<dyn StageService>,
    ) -> Self {
        Self {
            ingest,
            enrich,
            transform,
            validate,
            commit,
        }
    }

    /// Assembles a stage set whose commit stage writes to `sink`.
    #[must_use]
    pub fn with_sink(
        ingest: Arc<dyn StageService>,
        enrich: Arc<dyn StageService>,
        transform: Arc<dyn StageService>,
        validate: Arc<dyn StageService>,
        sink: Arc<dyn StorageSink>,
    ) -> Self {
        Self::new(
            ingest,
            enrich,
            transform,
            validate,
            Arc::new(CommitService::new(sink)),
        )
    }

    fn service(&self, stage: PipelineStage) -> &dyn StageService {
        match stage {
            PipelineStage::Ingest => self.ingest.as_ref(),
            PipelineStage::Enrich => self.enrich.as_ref(),
            PipelineStage::Transform => self.transform.as_ref(),
            PipelineStage::Validate => self.validate.as_ref(),
            PipelineStage::Commit => self.commit.as_ref(),
        }
    }
}

/// One circuit breaker per stage.
///
/// Breaker state is process-lifetime: cloning the set shares the
/// underlying breakers, so a set reused across runs carries collaborator
/// health from one run into the next.
#[derive(Debug, Clone)]
pub struct BreakerSet {
    // Indexed by stage position; seeded for every stage at construction.
    breakers: [Arc<CircuitBreaker>; 5],
}

impl BreakerSet {
    /// Creates fresh closed breakers, one per stage, from the config's
    /// per-class settings.
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let breakers = PipelineStage::ALL.map(|stage| {
            Arc::new(CircuitBreaker::new(stage.as_str(), config.breaker_for(stage)))
        });
        Self { breakers }
    }

    /// The breaker for one stage.
    #[must_use]
    pub fn breaker(&self, stage: PipelineStage) -> Arc<CircuitBreaker> {
        Arc::clone(&self.breakers[stage as usize])
    }
}

/// An item successfully written to the persistent store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommittedItem {
    /// The item's stable identifier.
    pub item_id: ItemId,
    /// The identifier the store assigned, when the commit collaborator
    /// reported one.
    pub record_id: Option<RecordId>,
    /// The payload as committed.
    pub record: serde_json::Value,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every item was committed.
    Success,
    /// Some items were committed, some were not.
    Partial,
    /// Nothing was committed.
    Failed,
}

/// The result of a completed run.
///
/// Per-item failures never abort a run; they end up here, in the failed
/// set and the snapshot's error log.
#[derive(Debug)]
pub struct RunReport {
    status: RunStatus,
    committed: Vec<CommittedItem>,
    failed_items: Vec<WorkItem>,
    snapshot: ProgressSnapshot,
}

impl RunReport {
    /// How the run ended.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Items written to the persistent store.
    #[must_use]
    pub fn committed(&self) -> &[CommittedItem] {
        &self.committed
    }

    /// Items that failed at some stage, with the payload they carried
    /// when they failed. Feed these back into [`Pipeline::run_items`] to
    /// re-run exactly the failed set.
    #[must_use]
    pub fn failed_items(&self) -> &[WorkItem] {
        &self.failed_items
    }

    /// The run's progress snapshot, including the error log.
    #[must_use]
    pub fn snapshot(&self) -> &ProgressSnapshot {
        &self.snapshot
    }
}

/// Drives items through the five stages in order.
///
/// The surviving set shrinks as items fail or are verdict-excluded; each
/// stage runs over the whole surviving set before the next stage starts.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    stages: StageSet,
    breakers: BreakerSet,
    executor: StageExecutor,
}

impl Pipeline {
    /// Creates a pipeline with fresh breakers.
    #[must_use]
    pub fn new(config: PipelineConfig, stages: StageSet) -> Self {
        let breakers = BreakerSet::new(&config);
        Self::with_breakers(config, stages, breakers)
    }

    /// Creates a pipeline over an existing breaker set, sharing breaker
    /// state with other pipelines or earlier runs.
    #[must_use]
    pub fn with_breakers(config: PipelineConfig, stages: StageSet, breakers: BreakerSet) -> Self {
        let executor = StageExecutor::new(config.batch_size);
        Self {
            config,
            stages,
            breakers,
            executor,
        }
    }

    /// The breaker set this pipeline consults.
    #[must_use]
    pub fn breakers(&self) -> &BreakerSet {
        &self.breakers
    }

    /// Runs a batch of raw payloads, wrapping each in a fresh item.
    pub async fn run(
        &self,
        payloads: Vec<serde_json::Value>,
    ) -> Result<RunReport, PipelineError> {
        let items = payloads.into_iter().map(WorkItem::new).collect();
        self.run_items(items).await
    }

    /// Runs a batch of items through all five stages.
    ///
    /// Incoming status is ignored; every item starts from ingest, which
    /// is what makes re-running a failed set work. Returns an error only
    /// when there is nothing to do or a stage's collaborator rejected
    /// every item with an open circuit; all per-item failures are folded
    /// into the report.
    pub async fn run_items(&self, items: Vec<WorkItem>) -> Result<RunReport, PipelineError> {
        if items.is_empty() {
            return Err(PipelineError::NoItems);
        }

        let tracker = ProgressTracker::new(items.len());
        tracing::info!(total_items = items.len(), "starting pipeline run");

        let mut surviving: Vec<WorkItem> = items
            .into_iter()
            .map(|mut item| {
                item.set_status(ItemStatus::Pending);
                item
            })
            .collect();
        let mut failed: Vec<WorkItem> = Vec::new();

        for stage in [
            PipelineStage::Ingest,
            PipelineStage::Enrich,
            PipelineStage::Transform,
            PipelineStage::Validate,
        ] {
            if surviving.is_empty() {
                break;
            }
            let outcomes = self.execute_stage(stage, &surviving).await?;
            surviving = apply_outcomes(stage, surviving, outcomes, &tracker, &mut failed);
            tracing::debug!(
                stage = %stage,
                surviving = surviving.len(),
                failed = failed.len(),
                "stage complete"
            );
        }

        let eligible = self.apply_verdicts(surviving, &tracker, &mut failed);

        let mut committed = Vec::new();
        if !eligible.is_empty() {
            let mut outcomes = self.execute_stage(PipelineStage::Commit, &eligible).await?;
            for mut item in eligible {
                match outcomes.remove(&item.id()) {
                    Some(outcome) if outcome.is_success() => {
                        let record = outcome
                            .into_payload()
                            .unwrap_or(serde_json::Value::Null);
                        let record_id = record
                            .get("record_id")
                            .and_then(serde_json::Value::as_str)
                            .map(RecordId::new);
                        item.advance(PipelineStage::Commit, record.clone());
                        tracker.record_stage_success(PipelineStage::Commit);
                        tracker.record_committed();
                        committed.push(CommittedItem {
                            item_id: item.id(),
                            record_id,
                            record,
                        });
                    }
                    Some(outcome) => {
                        let failure = outcome.into_failure().unwrap_or_else(|| {
                            StageFailure::Internal("commit outcome carried no failure".into())
                        });
                        tracker.record_failure(item.id(), PipelineStage::Commit, &failure);
                        item.mark_failed();
                        failed.push(item);
                    }
                    None => {
                        let failure =
                            StageFailure::Internal("commit produced no outcome for item".into());
                        tracker.record_failure(item.id(), PipelineStage::Commit, &failure);
                        item.mark_failed();
                        failed.push(item);
                    }
                }
            }
        }

        let snapshot = tracker.snapshot();
        let status = if committed.len() == snapshot.total_items {
            RunStatus::Success
        } else if committed.is_empty() {
            RunStatus::Failed
        } else {
            RunStatus::Partial
        };
        tracing::info!(
            status = ?status,
            committed = committed.len(),
            failed = failed.len(),
            errors = snapshot.error_count,
            "pipeline run finished"
        );

        Ok(RunReport {
            status,
            committed,
            failed_items: failed,
            snapshot,
        })
    }

    /// Runs one stage over the surviving set.
    ///
    /// Aborts the run only when the stage's collaborator rejected every
    /// item with an open circuit; a mixed batch keeps going.
    async fn execute_stage(
        &self,
        stage: PipelineStage,
        items: &[WorkItem],
    ) -> Result<HashMap<ItemId, StageOutcome>, PipelineError> {
        let service = self.stages.service(stage);
        let guard = ResilientCall::new(
            self.breakers.breaker(stage),
            self.config.retry_for(stage).clone(),
            self.config.call_timeout,
        );
        let outcomes = self.executor.run_stage(stage, items, &guard, service).await;

        if !outcomes.is_empty() && outcomes.iter().all(StageOutcome::is_circuit_open) {
            tracing::error!(
                stage = %stage,
                items = outcomes.len(),
                "collaborator circuit open for every item, aborting run"
            );
            return Err(PipelineError::StageUnavailable { stage });
        }

        Ok(outcomes
            .into_iter()
            .map(|outcome| (outcome.item_id(), outcome))
            .collect())
    }

    /// Applies validation verdicts to the items that passed validate,
    /// returning the commit-eligible set.
    fn apply_verdicts(
        &self,
        survivors: Vec<WorkItem>,
        tracker: &ProgressTracker,
        failed: &mut Vec<WorkItem>,
    ) -> Vec<WorkItem> {
        let mut eligible = Vec::new();
        for mut item in survivors {
            if item.status() != ItemStatus::Validated {
                // A survivor that never passed validate cannot be silently
                // dropped; surface it in the report and the error log.
                let failure = StageFailure::Internal(format!(
                    "item reached verdict application with status {}",
                    item.status()
                ));
                tracker.record_failure(item.id(), PipelineStage::Validate, &failure);
                item.mark_failed();
                failed.push(item);
                continue;
            }
            let review = Review::from_payload(item.payload());
            let Some(verdict) = review.decide(&self.config.thresholds) else {
                let failure = StageFailure::Internal(
                    "validate payload carried neither a verdict nor a score".into(),
                );
                tracker.record_failure(item.id(), PipelineStage::Validate, &failure);
                item.mark_failed();
                failed.push(item);
                continue;
            };

            tracker.record_verdict(verdict);
            match verdict {
                Verdict::Approved => {
                    item.set_status(ItemStatus::Approved);
                    eligible.push(item);
                }
                Verdict::NeedsRevision => {
                    item.set_status(ItemStatus::NeedsRevision);
                    if self.config.commit_needs_revision {
                        eligible.push(item);
                    } else {
                        tracing::debug!(item_id = %item.id(), "needs revision, held back from commit");
                        tracker.record_held_back();
                    }
                }
                Verdict::Rejected => {
                    item.set_status(ItemStatus::Rejected);
                    tracing::debug!(item_id = %item.id(), "rejected by validation");
                }
            }
        }
        eligible
    }
}

/// Folds one stage's outcomes back into the item set: successes advance,
/// failures move to the failed set and the error log.
fn apply_outcomes(
    stage: PipelineStage,
    items: Vec<WorkItem>,
    mut outcomes: HashMap<ItemId, StageOutcome>,
    tracker: &ProgressTracker,
    failed: &mut Vec<WorkItem>,
) -> Vec<WorkItem> {
    let mut surviving = Vec::with_capacity(items.len());
    for mut item in items {
        match outcomes.remove(&item.id()) {
            Some(outcome) if outcome.is_success() => {
                let payload = outcome.into_payload().unwrap_or(serde_json::Value::Null);
                item.advance(stage, payload);
                tracker.record_stage_success(stage);
                surviving.push(item);
            }
            Some(outcome) => {
                let failure = outcome.into_failure().unwrap_or_else(|| {
                    StageFailure::Internal("failed outcome carried no failure".into())
                });
                tracker.record_failure(item.id(), stage, &failure);
                item.mark_failed();
                failed.push(item);
            }
            None => {
                let failure = StageFailure::Internal("stage produced no outcome for item".into());
                tracker.record_failure(item.id(), stage, &failure);
                item.mark_failed();
                failed.push(item);
            }
        }
    }
    surviving
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::FailureClass;
    use crate::testing::StaticService;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn stub_stages() -> StageSet {
        let stub = || -> Arc<dyn StageService> { Arc::new(StaticService::ok("stub", json!({}))) };
        StageSet::new(stub(), stub(), stub(), stub(), stub())
    }

    #[test]
    fn test_breaker_set_shares_instances() {
        let config = PipelineConfig::default();
        let set = BreakerSet::new(&config);
        let cloned = set.clone();

        // A clone hands out the same underlying breakers, so health
        // carries across pipelines built from the same set.
        for stage in PipelineStage::ALL {
            assert!(Arc::ptr_eq(&set.breaker(stage), &cloned.breaker(stage)));
            assert_eq!(set.breaker(stage).name(), stage.as_str());
        }

        assert_eq!(set.breaker(PipelineStage::Commit).config().failure_threshold, 3);
        assert_eq!(set.breaker(PipelineStage::Enrich).config().failure_threshold, 5);
    }

    #[test]
    fn test_unvalidated_survivor_is_reported_as_failed() {
        let pipeline = Pipeline::new(PipelineConfig::default(), stub_stages());
        let tracker = ProgressTracker::new(1);
        let mut failed = Vec::new();

        // Status Pending: the item never passed validate.
        let item = WorkItem::new(json!({}));
        let id = item.id();

        let eligible = pipeline.apply_verdicts(vec![item], &tracker, &mut failed);

        assert!(eligible.is_empty());
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id(), id);
        assert_eq!(failed[0].status(), ItemStatus::Failed);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.errors[0].class, FailureClass::Internal);
        assert_eq!(snapshot.errors[0].stage, PipelineStage::Validate);
    }
}
