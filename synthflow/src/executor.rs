//! Batched concurrent stage execution.

use crate::core::{PipelineStage, StageOutcome, WorkItem};
use crate::resilience::ResilientCall;
use crate::services::StageService;
use futures::future::join_all;

/// Applies the resilient call guard to every item in bounded-size
/// batches.
///
/// A batch's calls run concurrently and all settle before the next batch
/// starts, so total in-flight concurrency never exceeds the batch size —
/// which also bounds load on the collaborator. One item's failure is
/// captured as its own outcome and never cancels or blocks its siblings.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    batch_size: usize,
}

impl StageExecutor {
    /// Creates an executor with the given batch size (minimum 1).
    #[must_use]
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// The bounded concurrency per batch.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs every item through the stage's collaborator, one outcome per
    /// item. Input ordering is not guaranteed in the result; item
    /// identity is.
    pub async fn run_stage(
        &self,
        stage: PipelineStage,
        items: &[WorkItem],
        guard: &ResilientCall,
        service: &dyn StageService,
    ) -> Vec<StageOutcome> {
        let mut outcomes = Vec::with_capacity(items.len());
        for batch in items.chunks(self.batch_size) {
            tracing::debug!(
                stage = %stage,
                batch_len = batch.len(),
                "dispatching batch"
            );
            let calls = batch.iter().map(|item| async move {
                match guard.invoke(service, item).await {
                    Ok(payload) => StageOutcome::success(item.id(), stage, payload),
                    Err(failure) => {
                        tracing::debug!(
                            stage = %stage,
                            item_id = %item.id(),
                            class = failure.class().as_str(),
                            error = %failure,
                            "item failed"
                        );
                        StageOutcome::failed(item.id(), stage, failure)
                    }
                }
            });
            outcomes.extend(join_all(calls).await);
        }
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::OutcomeStatus;
    use crate::errors::CallError;
    use crate::resilience::{BreakerConfig, CircuitBreaker, RetryConfig};
    use crate::services::FnService;
    use crate::testing::StaticService;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_guard() -> ResilientCall {
        ResilientCall::new(
            Arc::new(CircuitBreaker::new(
                "test",
                BreakerConfig::service().with_failure_threshold(100),
            )),
            RetryConfig::service()
                .with_max_attempts(1)
                .with_initial_delay(Duration::from_millis(1)),
            Duration::from_millis(100),
        )
    }

    #[tokio::test]
    async fn test_one_outcome_per_item() {
        let items: Vec<WorkItem> = (0..7).map(|i| WorkItem::new(json!({"idx": i}))).collect();
        let service = StaticService::ok("svc", json!({"done": true}));
        let executor = StageExecutor::new(3);

        let outcomes = executor
            .run_stage(PipelineStage::Enrich, &items, &test_guard(), &service)
            .await;

        assert_eq!(outcomes.len(), 7);
        assert!(outcomes.iter().all(StageOutcome::is_success));
        assert_eq!(service.calls(), 7);

        // Every input identity is present exactly once.
        let mut ids: Vec<_> = outcomes.iter().map(StageOutcome::item_id).collect();
        ids.sort_by_key(ToString::to_string);
        ids.dedup();
        assert_eq!(ids.len(), 7);
    }

    #[tokio::test]
    async fn test_batch_isolation() {
        // Item 2 always fails; the rest succeed.
        let items: Vec<WorkItem> = (0..5).map(|i| WorkItem::new(json!({"idx": i}))).collect();
        let failing_id = items[2].id();

        let service = FnService::new("svc", move |item: WorkItem| async move {
            if item.payload()["idx"] == 2 {
                Err(CallError::InvalidPayload("broken item".into()))
            } else {
                Ok(json!({"idx": item.payload()["idx"]}))
            }
        });

        let outcomes = StageExecutor::new(5)
            .run_stage(PipelineStage::Transform, &items, &test_guard(), &service)
            .await;

        assert_eq!(outcomes.len(), 5);
        let failed: Vec<_> = outcomes
            .iter()
            .filter(|o| o.status() == OutcomeStatus::Failed)
            .collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].item_id(), failing_id);
    }

    #[tokio::test]
    async fn test_batches_bound_concurrency() {
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let in_flight_probe = Arc::clone(&in_flight);
        let peak_probe = Arc::clone(&peak);
        let service = FnService::new("svc", move |_item: WorkItem| {
            let in_flight = Arc::clone(&in_flight_probe);
            let peak = Arc::clone(&peak_probe);
            async move {
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(json!({}))
            }
        });

        let items: Vec<WorkItem> = (0..12).map(|i| WorkItem::new(json!({"idx": i}))).collect();
        StageExecutor::new(4)
            .run_stage(PipelineStage::Enrich, &items, &test_guard(), &service)
            .await;

        assert!(peak.load(Ordering::SeqCst) <= 4);
    }

    #[test]
    fn test_batch_size_floor() {
        assert_eq!(StageExecutor::new(0).batch_size(), 1);
    }
}
