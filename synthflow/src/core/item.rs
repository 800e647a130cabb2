//! Work items and their status state machine.

use super::PipelineStage;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque identifier of a work item, stable across all stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generates a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Where an item is in its lifecycle.
///
/// The happy path is `Pending → Ingested → Enriched → Transformed →
/// Validated → {Approved | NeedsRevision | Rejected}`; `Failed` is a sink
/// state reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// Accepted into a run, not yet processed.
    Pending,
    /// Passed the ingest stage.
    Ingested,
    /// Passed the enrich stage.
    Enriched,
    /// Passed the transform stage.
    Transformed,
    /// Passed the validate stage; verdict not yet applied.
    Validated,
    /// Validation approved the item.
    Approved,
    /// Validation flagged the item for revision.
    NeedsRevision,
    /// Validation rejected the item.
    Rejected,
    /// The item failed unrecoverably at some stage.
    Failed,
}

impl ItemStatus {
    /// The status an item takes after succeeding at `stage`.
    ///
    /// Commit returns `None`: committing does not change the verdict
    /// status the item already carries.
    #[must_use]
    pub fn after(stage: PipelineStage) -> Option<Self> {
        match stage {
            PipelineStage::Ingest => Some(Self::Ingested),
            PipelineStage::Enrich => Some(Self::Enriched),
            PipelineStage::Transform => Some(Self::Transformed),
            PipelineStage::Validate => Some(Self::Validated),
            PipelineStage::Commit => None,
        }
    }

    /// Returns true if no further processing can change this status.
    ///
    /// `NeedsRevision` is terminal unless the run is configured to commit
    /// needs-revision items anyway.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Approved | Self::NeedsRevision | Self::Rejected | Self::Failed
        )
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Ingested => "ingested",
            Self::Enriched => "enriched",
            Self::Transformed => "transformed",
            Self::Validated => "validated",
            Self::Approved => "approved",
            Self::NeedsRevision => "needs_revision",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One unit of work flowing through the pipeline.
///
/// The payload is opaque to the engine and is replaced wholesale at every
/// stage transition; only the stage that currently owns the item mutates
/// it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    id: ItemId,
    payload: serde_json::Value,
    status: ItemStatus,
}

impl WorkItem {
    /// Creates a pending item with a fresh identifier.
    #[must_use]
    pub fn new(payload: serde_json::Value) -> Self {
        Self {
            id: ItemId::new(),
            payload,
            status: ItemStatus::Pending,
        }
    }

    /// Creates a pending item with a caller-supplied identifier.
    ///
    /// Useful when re-running a failed set: the caller keeps the original
    /// ids so results can be correlated across runs.
    #[must_use]
    pub fn with_id(id: ItemId, payload: serde_json::Value) -> Self {
        Self {
            id,
            payload,
            status: ItemStatus::Pending,
        }
    }

    /// The item's stable identifier.
    #[must_use]
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// The current stage payload.
    #[must_use]
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    /// The item's lifecycle status.
    #[must_use]
    pub fn status(&self) -> ItemStatus {
        self.status
    }

    /// Records a successful pass through `stage`, replacing the payload.
    pub fn advance(&mut self, stage: PipelineStage, payload: serde_json::Value) {
        self.payload = payload;
        if let Some(status) = ItemStatus::after(stage) {
            self.status = status;
        }
    }

    /// Applies a verdict or other explicit status.
    pub fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }

    /// Moves the item to the failed sink state.
    pub fn mark_failed(&mut self) {
        self.status = ItemStatus::Failed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_starts_pending() {
        let item = WorkItem::new(json!({"question": "what is entropy?"}));
        assert_eq!(item.status(), ItemStatus::Pending);
        assert_eq!(item.payload()["question"], "what is entropy?");
    }

    #[test]
    fn test_advance_replaces_payload_and_status() {
        let mut item = WorkItem::new(json!({"seed": 1}));
        let id = item.id();

        item.advance(PipelineStage::Ingest, json!({"ingested": true}));
        assert_eq!(item.status(), ItemStatus::Ingested);
        assert_eq!(item.payload()["ingested"], true);
        assert!(item.payload().get("seed").is_none());

        item.advance(PipelineStage::Enrich, json!({"context": "..."}));
        assert_eq!(item.status(), ItemStatus::Enriched);

        // Identity is stable across transitions.
        assert_eq!(item.id(), id);
    }

    #[test]
    fn test_commit_does_not_change_status() {
        let mut item = WorkItem::new(json!({}));
        item.set_status(ItemStatus::Approved);
        item.advance(PipelineStage::Commit, json!({"record_id": "rec-1"}));
        assert_eq!(item.status(), ItemStatus::Approved);
    }

    #[test]
    fn test_terminal_states() {
        assert!(ItemStatus::Approved.is_terminal());
        assert!(ItemStatus::Rejected.is_terminal());
        assert!(ItemStatus::NeedsRevision.is_terminal());
        assert!(ItemStatus::Failed.is_terminal());
        assert!(!ItemStatus::Pending.is_terminal());
        assert!(!ItemStatus::Validated.is_terminal());
    }

    #[test]
    fn test_with_id_preserves_identity() {
        let original = WorkItem::new(json!({"n": 1}));
        let rerun = WorkItem::with_id(original.id(), json!({"n": 1}));
        assert_eq!(rerun.id(), original.id());
        assert_eq!(rerun.status(), ItemStatus::Pending);
    }
}
