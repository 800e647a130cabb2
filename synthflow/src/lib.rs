//! # Synthflow
//!
//! A resilience-first orchestration engine for batch data production.
//!
//! Synthflow drives work items through a fixed five-stage pipeline
//! (ingest, enrich, transform, validate, commit), each stage backed by an
//! external collaborator, with:
//!
//! - **Bounded retries**: exponential backoff for transient failures only
//! - **Circuit breaking**: per-collaborator breakers that fail fast while
//!   a collaborator is down and probe for recovery
//! - **Failure containment**: one item's failure never aborts its batch
//! - **Verdict gating**: validation decides which items reach the store
//! - **Progress tracking**: live per-stage counts and a classified error
//!   log for every run
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use synthflow::prelude::*;
//!
//! let stages = StageSet::with_sink(ingest, enrich, transform, validate, sink);
//! let pipeline = Pipeline::new(PipelineConfig::default(), stages);
//!
//! let report = pipeline.run(payloads).await?;
//! println!("committed {} items", report.committed().len());
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod core;
pub mod errors;
pub mod executor;
pub mod pipeline;
pub mod progress;
pub mod resilience;
pub mod services;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        ItemId, ItemStatus, OutcomeStatus, PipelineStage, Review, ReviewThresholds,
        StageOutcome, Verdict, WorkItem,
    };
    pub use crate::errors::{CallError, FailureClass, PipelineError, StageFailure};
    pub use crate::executor::StageExecutor;
    pub use crate::pipeline::{
        BreakerSet, CommittedItem, Pipeline, PipelineConfig, RunReport, RunStatus, StageSet,
    };
    pub use crate::progress::{ErrorRecord, ProgressSnapshot, ProgressTracker};
    pub use crate::resilience::{
        with_retry, BreakerConfig, CircuitBreaker, CircuitState, JitterStrategy, ResilientCall,
        RetryConfig,
    };
    pub use crate::services::{
        CommitService, FnService, RecordId, StageService, StorageSink,
    };
}
