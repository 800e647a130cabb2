//! Error taxonomy for the synthflow engine.
//!
//! Three levels of failure are distinguished:
//!
//! - [`CallError`] — what a collaborator reports for a single invocation,
//!   split into transient and permanent classes.
//! - [`StageFailure`] — what the resilient call guard reports for one item
//!   after retries and circuit breaking have been applied.
//! - [`PipelineError`] — run-level failures from the pipeline driver.

use crate::core::PipelineStage;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// A failure returned by a collaborator call.
///
/// The transient variants (timeout, connection, rate limit) are eligible
/// for retry; the permanent variants are not — a payload the collaborator
/// rejected once will be rejected on every attempt.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// The call did not complete within its timeout budget.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The collaborator could not be reached.
    #[error("connection error: {0}")]
    Connection(String),

    /// The collaborator asked the caller to slow down.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The collaborator rejected the payload as structurally invalid.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

impl CallError {
    /// Returns true if retrying this failure could plausibly succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Connection(_) | Self::RateLimited(_)
        )
    }
}

/// Coarse failure classification recorded in the progress error log.
///
/// Lets an operator tell collaborator-down (`CircuitOpen`) apart from
/// item-bad (`Permanent`) without parsing error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureClass {
    /// Transient collaborator failure that exhausted its retry budget.
    Transient,
    /// Permanent failure; retrying would not have helped.
    Permanent,
    /// The circuit breaker rejected the call without invoking anything.
    CircuitOpen,
    /// The engine could not process the item at all.
    Internal,
}

impl FailureClass {
    /// Stable string form used in logs and exports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::Permanent => "permanent",
            Self::CircuitOpen => "circuit_open",
            Self::Internal => "internal",
        }
    }
}

/// A per-item failure produced by the resilient call guard.
#[derive(Debug, Clone, Error)]
pub enum StageFailure {
    /// Every retry attempt failed with a transient error.
    #[error("retries exhausted after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of attempts actually made.
        attempts: usize,
        /// The failure from the final attempt, propagated unchanged.
        last: CallError,
    },

    /// The collaborator failed permanently; no retries were attempted.
    #[error("permanent failure: {0}")]
    Permanent(CallError),

    /// The breaker rejected the call before the collaborator was invoked.
    #[error("circuit open for '{service}', retry after {retry_after:?}")]
    CircuitOpen {
        /// The collaborator whose circuit is open.
        service: String,
        /// Time remaining until a recovery probe is allowed.
        retry_after: Duration,
    },

    /// The engine itself could not process the item.
    #[error("internal error: {0}")]
    Internal(String),
}

impl StageFailure {
    /// Classifies the failure for the error log.
    #[must_use]
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Exhausted { .. } => FailureClass::Transient,
            Self::Permanent(_) => FailureClass::Permanent,
            Self::CircuitOpen { .. } => FailureClass::CircuitOpen,
            Self::Internal(_) => FailureClass::Internal,
        }
    }

    /// Returns true if the failure is a circuit-open rejection.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }
}

/// Run-level errors surfaced by the pipeline driver.
///
/// Per-item failures never appear here; they are folded into stage
/// outcomes and the progress record. A run fails as a whole only when a
/// stage's collaborator is unreachable for every item, or when there is
/// nothing to do.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Every item in a stage was rejected with an open circuit.
    #[error("stage '{stage}' unavailable: collaborator circuit open for every item")]
    StageUnavailable {
        /// The stage whose collaborator is unreachable.
        stage: PipelineStage,
    },

    /// The run was started with no items.
    #[error("no items to process")]
    NoItems,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(CallError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(CallError::Connection("reset".into()).is_transient());
        assert!(CallError::RateLimited("429".into()).is_transient());
        assert!(!CallError::InvalidPayload("bad schema".into()).is_transient());
        assert!(!CallError::NotFound("item 7".into()).is_transient());
    }

    #[test]
    fn test_stage_failure_class() {
        let exhausted = StageFailure::Exhausted {
            attempts: 3,
            last: CallError::Timeout(Duration::from_secs(1)),
        };
        assert_eq!(exhausted.class(), FailureClass::Transient);

        let permanent = StageFailure::Permanent(CallError::NotFound("x".into()));
        assert_eq!(permanent.class(), FailureClass::Permanent);

        let open = StageFailure::CircuitOpen {
            service: "enrich".into(),
            retry_after: Duration::from_secs(30),
        };
        assert_eq!(open.class(), FailureClass::CircuitOpen);
        assert!(open.is_circuit_open());

        let internal = StageFailure::Internal("no outcome".into());
        assert_eq!(internal.class(), FailureClass::Internal);
        assert!(!internal.is_circuit_open());
    }

    #[test]
    fn test_messages_carry_detail() {
        let failure = StageFailure::Exhausted {
            attempts: 3,
            last: CallError::Connection("refused".into()),
        };
        let message = failure.to_string();
        assert!(message.contains("3 attempts"));
        assert!(message.contains("refused"));

        let open = StageFailure::CircuitOpen {
            service: "storage".into(),
            retry_after: Duration::from_secs(30),
        };
        assert!(open.to_string().contains("storage"));
    }
}
