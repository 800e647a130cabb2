//! The composed per-call resilience guard.

use super::{with_retry, CircuitBreaker, RetryConfig};
use crate::core::WorkItem;
use crate::errors::{CallError, StageFailure};
use crate::services::StageService;
use std::sync::Arc;
use std::time::Duration;

/// Composes a circuit breaker, a retry policy and a per-call timeout
/// around a single collaborator.
///
/// Used identically for every stage; only the breaker instance and the
/// retry/timeout parameters differ between collaborator classes.
#[derive(Debug, Clone)]
pub struct ResilientCall {
    breaker: Arc<CircuitBreaker>,
    retry: RetryConfig,
    call_timeout: Duration,
}

impl ResilientCall {
    /// Creates a guard over the given breaker.
    #[must_use]
    pub fn new(breaker: Arc<CircuitBreaker>, retry: RetryConfig, call_timeout: Duration) -> Self {
        Self {
            breaker,
            retry,
            call_timeout,
        }
    }

    /// The breaker this guard consults.
    #[must_use]
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Invokes the collaborator for one item with full resilience
    /// handling.
    ///
    /// An open circuit fails immediately with
    /// [`StageFailure::CircuitOpen`] and consumes no retry attempt.
    /// Otherwise each attempt runs under the call timeout (elapsing is a
    /// transient failure) and its outcome is reported to the breaker —
    /// a retry's failed attempt still counts toward the collaborator's
    /// consecutive failures.
    pub async fn invoke(
        &self,
        service: &dyn StageService,
        item: &WorkItem,
    ) -> Result<serde_json::Value, StageFailure> {
        self.breaker.acquire()?;

        let call_timeout = self.call_timeout;
        with_retry(
            &self.retry,
            service.name(),
            |succeeded| {
                if succeeded {
                    self.breaker.record_success();
                } else {
                    self.breaker.record_failure();
                }
            },
            || {
                let call = service.invoke(item);
                async move {
                    match tokio::time::timeout(call_timeout, call).await {
                        Ok(outcome) => outcome,
                        Err(_) => Err(CallError::Timeout(call_timeout)),
                    }
                }
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::BreakerConfig;
    use crate::testing::{FlakyService, StaticService};
    use serde_json::json;

    fn guard(breaker: Arc<CircuitBreaker>, max_attempts: usize) -> ResilientCall {
        ResilientCall::new(
            breaker,
            RetryConfig::service()
                .with_max_attempts(max_attempts)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2)),
            Duration::from_millis(50),
        )
    }

    fn service_breaker(threshold: u32) -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(
            "test-service",
            BreakerConfig::service().with_failure_threshold(threshold),
        ))
    }

    #[tokio::test]
    async fn test_success_passes_through() {
        let breaker = service_breaker(5);
        let service = StaticService::ok("gen", json!({"text": "hello"}));
        let item = WorkItem::new(json!({}));

        let result = guard(Arc::clone(&breaker), 3).invoke(&service, &item).await;

        assert_eq!(result.ok(), Some(json!({"text": "hello"})));
        assert_eq!(service.calls(), 1);
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_on_retry() {
        let breaker = service_breaker(5);
        let service = FlakyService::new("gen", 1, CallError::Connection("reset".into()));
        let item = WorkItem::new(json!({"n": 1}));

        let result = guard(Arc::clone(&breaker), 3).invoke(&service, &item).await;

        assert!(result.is_ok());
        assert_eq!(service.attempts_for(item.id()), 2);
        // The success reset the counter the failed attempt had bumped.
        assert_eq!(breaker.consecutive_failures(), 0);
    }

    #[tokio::test]
    async fn test_open_breaker_rejects_without_invoking() {
        let breaker = service_breaker(2);
        breaker.record_failure();
        breaker.record_failure();

        let service = StaticService::ok("gen", json!({}));
        let item = WorkItem::new(json!({}));

        let result = guard(breaker, 3).invoke(&service, &item).await;

        assert!(matches!(result, Err(StageFailure::CircuitOpen { .. })));
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn test_each_attempt_feeds_the_breaker() {
        let breaker = service_breaker(3);
        let service = StaticService::failing("gen", CallError::Connection("down".into()));
        let item = WorkItem::new(json!({}));
        let guard = guard(Arc::clone(&breaker), 2);

        // First call: two failed attempts recorded.
        let first = guard.invoke(&service, &item).await;
        assert!(matches!(first, Err(StageFailure::Exhausted { .. })));
        assert_eq!(breaker.consecutive_failures(), 2);
        assert_eq!(service.calls(), 2);

        // Second call: the first attempt trips the threshold mid-retry.
        let second = guard.invoke(&service, &item).await;
        assert!(matches!(second, Err(StageFailure::Exhausted { .. })));
        assert_eq!(service.calls(), 4);

        // Third call: rejected at the gate, collaborator untouched.
        let third = guard.invoke(&service, &item).await;
        assert!(matches!(third, Err(StageFailure::CircuitOpen { .. })));
        assert_eq!(service.calls(), 4);
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        let breaker = service_breaker(10);
        let service = StaticService::slow("gen", Duration::from_millis(200), json!({}));
        let item = WorkItem::new(json!({}));

        let guard = ResilientCall::new(
            breaker,
            RetryConfig::service()
                .with_max_attempts(2)
                .with_initial_delay(Duration::from_millis(1))
                .with_max_delay(Duration::from_millis(2)),
            Duration::from_millis(5),
        );

        let result = guard.invoke(&service, &item).await;
        match result {
            Err(StageFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, CallError::Timeout(_)));
            }
            other => panic!("expected Exhausted(Timeout), got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_spends_no_retries() {
        let breaker = service_breaker(5);
        let service = StaticService::failing("gen", CallError::InvalidPayload("bad".into()));
        let item = WorkItem::new(json!({}));

        let result = guard(Arc::clone(&breaker), 3).invoke(&service, &item).await;

        assert!(matches!(result, Err(StageFailure::Permanent(_))));
        assert_eq!(service.calls(), 1);
        // Permanent failures still count against collaborator health.
        assert_eq!(breaker.consecutive_failures(), 1);
    }
}
