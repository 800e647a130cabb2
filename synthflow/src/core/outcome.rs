//! Per-item, per-stage outcomes.

use super::{ItemId, PipelineStage};
use crate::errors::StageFailure;
use serde::{Deserialize, Serialize};

/// How one item fared at one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// The collaborator call succeeded.
    Success,
    /// The call failed after resilience handling.
    Failed,
    /// The item was deliberately not processed at this stage.
    Skipped,
}

/// The result of running one item through one stage.
///
/// Created by the stage executor and consumed immediately by the driver
/// at the stage boundary; it is not retained beyond that except as a
/// progress record entry.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    item_id: ItemId,
    stage: PipelineStage,
    status: OutcomeStatus,
    payload: Option<serde_json::Value>,
    failure: Option<StageFailure>,
    skip_reason: Option<String>,
}

impl StageOutcome {
    /// A successful outcome carrying the stage's new payload.
    #[must_use]
    pub fn success(item_id: ItemId, stage: PipelineStage, payload: serde_json::Value) -> Self {
        Self {
            item_id,
            stage,
            status: OutcomeStatus::Success,
            payload: Some(payload),
            failure: None,
            skip_reason: None,
        }
    }

    /// A failed outcome carrying the tagged failure.
    #[must_use]
    pub fn failed(item_id: ItemId, stage: PipelineStage, failure: StageFailure) -> Self {
        Self {
            item_id,
            stage,
            status: OutcomeStatus::Failed,
            payload: None,
            failure: Some(failure),
            skip_reason: None,
        }
    }

    /// A skipped outcome with a reason.
    #[must_use]
    pub fn skipped(item_id: ItemId, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            item_id,
            stage,
            status: OutcomeStatus::Skipped,
            payload: None,
            failure: None,
            skip_reason: Some(reason.into()),
        }
    }

    /// The item this outcome belongs to.
    #[must_use]
    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    /// The stage that produced this outcome.
    #[must_use]
    pub fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// The outcome status.
    #[must_use]
    pub fn status(&self) -> OutcomeStatus {
        self.status
    }

    /// Returns true for successful outcomes.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Returns true if the failure was a circuit-open rejection.
    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        self.failure
            .as_ref()
            .is_some_and(StageFailure::is_circuit_open)
    }

    /// The failure, if any.
    #[must_use]
    pub fn failure(&self) -> Option<&StageFailure> {
        self.failure.as_ref()
    }

    /// The skip reason, if any.
    #[must_use]
    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    /// Consumes the outcome, yielding the success payload.
    #[must_use]
    pub fn into_payload(self) -> Option<serde_json::Value> {
        self.payload
    }

    /// Consumes the outcome, yielding the failure.
    #[must_use]
    pub fn into_failure(self) -> Option<StageFailure> {
        self.failure
    }
}
