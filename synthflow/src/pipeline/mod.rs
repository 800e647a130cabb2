//! Pipeline assembly and the run driver.

mod config;
mod driver;

pub use config::PipelineConfig;
pub use driver::{BreakerSet, CommittedItem, Pipeline, RunReport, RunStatus, StageSet};
