//! Core domain model for the pipeline engine.
//!
//! This module contains the types that flow through the engine:
//! - The pipeline stage enum and item status state machine
//! - Work items and their identifiers
//! - Per-stage outcomes
//! - Validation reviews and verdicts

mod item;
mod outcome;
mod review;
mod stage;

pub use item::{ItemId, ItemStatus, WorkItem};
pub use outcome::{OutcomeStatus, StageOutcome};
pub use review::{Review, ReviewThresholds, Verdict};
pub use stage::PipelineStage;
