//! Bounded retries with exponential backoff.
//!
//! Only transient failures are retried; permanent failures surface on the
//! first attempt. Exhausting the budget propagates the last failure
//! unchanged inside [`StageFailure::Exhausted`].

use crate::errors::{CallError, StageFailure};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Jitter applied on top of the capped backoff delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JitterStrategy {
    /// No jitter; delays are exactly the backoff curve.
    #[default]
    None,
    /// Random from 0 to the computed delay.
    Full,
    /// Half fixed, half random.
    Equal,
}

impl JitterStrategy {
    fn apply(self, delay_secs: f64) -> f64 {
        if delay_secs <= 0.0 {
            return 0.0;
        }
        match self {
            Self::None => delay_secs,
            Self::Full => rand::thread_rng().gen_range(0.0..=delay_secs),
            Self::Equal => {
                let half = delay_secs / 2.0;
                half + rand::thread_rng().gen_range(0.0..=half)
            }
        }
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts, including the initial one. At least one attempt
    /// is always made.
    pub max_attempts: usize,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Cap applied to every delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub exponential_base: f64,
    /// Jitter strategy; defaults to none.
    pub jitter: JitterStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::service()
    }
}

impl RetryConfig {
    /// Profile for generic external services: 3 attempts, 2s initial
    /// delay, 10s cap, base 2.
    #[must_use]
    pub fn service() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            exponential_base: 2.0,
            jitter: JitterStrategy::None,
        }
    }

    /// Profile for the persistent store: same attempt budget, tighter
    /// delays (1s initial, 5s cap).
    #[must_use]
    pub fn storage() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            exponential_base: 2.0,
            jitter: JitterStrategy::None,
        }
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the exponential base.
    #[must_use]
    pub fn with_exponential_base(mut self, base: f64) -> Self {
        self.exponential_base = base;
        self
    }

    /// Sets the jitter strategy.
    #[must_use]
    pub fn with_jitter(mut self, jitter: JitterStrategy) -> Self {
        self.jitter = jitter;
        self
    }

    /// The delay slept after the given 1-based attempt fails:
    /// `min(initial_delay * base^(attempt - 1), max_delay)`, then jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        let attempt = attempt.max(1);
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        let factor = self.exponential_base.powi((attempt - 1) as i32);
        let raw = self.initial_delay.as_secs_f64() * factor;
        let capped = raw.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(self.jitter.apply(capped))
    }
}

/// Drives `operation` with bounded retries.
///
/// `on_attempt` is invoked with the success flag of every individual
/// attempt — the circuit breaker hooks in here, since it reasons about
/// collaborator health independently of the caller's retry budget.
///
/// Transient failures are retried until the budget runs out; the final
/// one comes back as [`StageFailure::Exhausted`]. Permanent failures
/// return immediately as [`StageFailure::Permanent`] without consuming
/// further attempts.
pub async fn with_retry<T, F, Fut>(
    config: &RetryConfig,
    label: &str,
    mut on_attempt: impl FnMut(bool),
    mut operation: F,
) -> Result<T, StageFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let mut attempt = 0usize;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                on_attempt(true);
                return Ok(value);
            }
            Err(error) => {
                on_attempt(false);
                if !error.is_transient() {
                    tracing::debug!(
                        op = label,
                        attempt,
                        error = %error,
                        "permanent failure, not retrying"
                    );
                    return Err(StageFailure::Permanent(error));
                }
                if attempt >= config.max_attempts {
                    tracing::debug!(
                        op = label,
                        attempts = attempt,
                        error = %error,
                        "retry budget exhausted"
                    );
                    return Err(StageFailure::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }
                let delay = config.delay_for_attempt(attempt);
                tracing::debug!(
                    op = label,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "retrying after transient failure"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: usize) -> RetryConfig {
        RetryConfig::service()
            .with_max_attempts(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
    }

    #[test]
    fn test_backoff_shape() {
        let config = RetryConfig::service()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(10));

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_capped_at_max_delay() {
        let config = RetryConfig::service()
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs_f64(1.5));

        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs_f64(1.5));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs_f64(1.5));
    }

    #[test]
    fn test_delays_non_decreasing_and_bounded() {
        let config = RetryConfig::service()
            .with_initial_delay(Duration::from_secs(2))
            .with_max_delay(Duration::from_secs(10));

        let mut previous = Duration::ZERO;
        for attempt in 1..=8 {
            let delay = config.delay_for_attempt(attempt);
            assert!(delay >= previous);
            assert!(delay <= config.max_delay);
            previous = delay;
        }
    }

    #[test]
    fn test_full_jitter_stays_under_cap() {
        let config = RetryConfig::service()
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(JitterStrategy::Full);

        for _ in 0..20 {
            assert!(config.delay_for_attempt(1) <= Duration::from_millis(100));
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry(&fast(3), "op", |_| {}, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, CallError>(42)
            }
        })
        .await;

        assert_eq!(result.ok(), Some(42));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_bound_on_persistent_transient_failure() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = with_retry(&fast(3), "op", |_| {}, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CallError::Connection("refused".into()))
            }
        })
        .await;

        // Exactly max_attempts invocations, then the last failure surfaces.
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(StageFailure::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(last, CallError::Connection(_)));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result: Result<(), _> = with_retry(&fast(5), "op", |_| {}, || {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CallError::InvalidPayload("schema mismatch".into()))
            }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(StageFailure::Permanent(_))));
    }

    #[tokio::test]
    async fn test_recovery_after_transient_failures() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let result = with_retry(&fast(5), "op", |_| {}, || {
            let counter = Arc::clone(&counter);
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CallError::Timeout(Duration::from_millis(1)))
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.ok(), Some("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_every_attempt_is_observed() {
        let observed = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&observed);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);

        let _ = with_retry(
            &fast(3),
            "op",
            move |ok| sink.lock().push(ok),
            || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(CallError::Connection("reset".into()))
                    } else {
                        Ok(())
                    }
                }
            },
        )
        .await;

        assert_eq!(*observed.lock(), vec![false, false, true]);
    }
}
