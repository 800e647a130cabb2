//! The ordered stages of the production pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step in the pipeline, each backed by an external collaborator.
///
/// Stages always run in declaration order; an item never reaches a stage
/// until its call for the previous stage has fully settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Accept an item into the run and assign its identity.
    Ingest,
    /// Gather supporting context for the item.
    Enrich,
    /// Produce the item's output payload.
    Transform,
    /// Score the produced payload and reach a verdict.
    Validate,
    /// Write the approved payload to the persistent store.
    Commit,
}

impl PipelineStage {
    /// All stages in execution order.
    pub const ALL: [Self; 5] = [
        Self::Ingest,
        Self::Enrich,
        Self::Transform,
        Self::Validate,
        Self::Commit,
    ];

    /// Stable string form used in logs, breaker names and exports.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ingest => "ingest",
            Self::Enrich => "enrich",
            Self::Transform => "transform",
            Self::Validate => "validate",
            Self::Commit => "commit",
        }
    }

    /// The stage that follows this one, if any.
    #[must_use]
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Ingest => Some(Self::Enrich),
            Self::Enrich => Some(Self::Transform),
            Self::Transform => Some(Self::Validate),
            Self::Validate => Some(Self::Commit),
            Self::Commit => None,
        }
    }

    /// Returns true if this stage talks to the persistent store.
    ///
    /// Storage gets the stricter breaker and retry profile: its failures
    /// are rarer and more consequential than generic service failures.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Commit)
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
