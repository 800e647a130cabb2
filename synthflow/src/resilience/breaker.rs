//! Per-collaborator circuit breaker.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: collaborator assumed down, calls fail fast
//! - Half-open: recovery window elapsed, a single probe is in flight
//!
//! # Transitions
//! ```text
//! Closed → Open:      consecutive_failures reaches failure_threshold
//! Open → Half-open:   recovery_timeout elapsed since opened_at
//! Half-open → Closed: probe succeeds (failure counter resets)
//! Half-open → Open:   probe fails (opened_at resets to now)
//! ```
//!
//! One breaker exists per collaborator, created at process start and
//! shared across every item and every run in the process. All state
//! mutations happen as a group under one mutex.

use crate::errors::StageFailure;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Circuit breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Calls pass through.
    Closed,
    /// Calls are rejected without invoking the collaborator.
    Open,
    /// A single recovery probe is allowed through.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        };
        f.write_str(s)
    }
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a recovery probe.
    pub recovery_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self::service()
    }
}

impl BreakerConfig {
    /// Profile for generic external services: 5 failures, 60s recovery.
    #[must_use]
    pub fn service() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }

    /// Profile for the persistent store: 3 failures, 30s recovery.
    /// Storage failures are rarer and more consequential, so the breaker
    /// reacts faster and recovers faster.
    #[must_use]
    pub fn storage() -> Self {
        Self {
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the failure threshold.
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the recovery timeout.
    #[must_use]
    pub fn with_recovery_timeout(mut self, timeout: Duration) -> Self {
        self.recovery_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    // Invariant: Some whenever state is Open.
    opened_at: Option<Instant>,
}

/// Failure-tracking gate in front of one collaborator.
///
/// Items in the same batch share one instance and update it concurrently;
/// every read-modify-write happens under the mutex.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named collaborator.
    #[must_use]
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
            }),
        }
    }

    /// The collaborator this breaker guards.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The breaker's configuration.
    #[must_use]
    pub fn config(&self) -> BreakerConfig {
        self.config
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Current consecutive failure count.
    #[must_use]
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().consecutive_failures
    }

    /// Gate check before invoking the collaborator.
    ///
    /// Open with the recovery window still running rejects immediately;
    /// open with the window elapsed admits this caller as the half-open
    /// probe. While a probe is outstanding, further callers are rejected.
    pub fn acquire(&self) -> Result<(), StageFailure> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen => Err(self.rejection(Duration::ZERO)),
            CircuitState::Open => {
                let elapsed = inner
                    .opened_at
                    .map_or(self.config.recovery_timeout, |opened| opened.elapsed());
                if elapsed >= self.config.recovery_timeout {
                    inner.state = CircuitState::HalfOpen;
                    tracing::info!(
                        breaker = self.name.as_str(),
                        "recovery window elapsed, allowing probe call"
                    );
                    Ok(())
                } else {
                    Err(self.rejection(self.config.recovery_timeout - elapsed))
                }
            }
        }
    }

    /// Records a successful call. Closes the circuit and resets the
    /// failure counter regardless of the previous state — a success is
    /// direct evidence the collaborator is healthy.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!(
                breaker = self.name.as_str(),
                from = %inner.state,
                "call succeeded, closing circuit"
            );
        }
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.opened_at = None;
    }

    /// Records a failed call, opening the circuit at the threshold or on
    /// a failed half-open probe.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(breaker = self.name.as_str(), "probe failed, reopening circuit");
            }
            CircuitState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                tracing::warn!(
                    breaker = self.name.as_str(),
                    failures = inner.consecutive_failures,
                    threshold = self.config.failure_threshold,
                    "failure threshold reached, opening circuit"
                );
            }
            _ => {}
        }
    }

    fn rejection(&self, retry_after: Duration) -> StageFailure {
        StageFailure::CircuitOpen {
            service: self.name.clone(),
            retry_after,
        }
    }
}
