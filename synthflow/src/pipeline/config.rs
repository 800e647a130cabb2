//! Run configuration.

use crate::core::ReviewThresholds;
use crate::resilience::{BreakerConfig, RetryConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable parameters for a pipeline.
///
/// Resilience settings come in two classes: generic external services
/// (ingest through validate) and the persistent store (commit). Defaults
/// match the standard deployment profiles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Items processed concurrently per stage batch.
    pub batch_size: usize,
    /// Timeout applied to every individual collaborator call.
    pub call_timeout: Duration,
    /// Retry policy for service-class stages.
    pub service_retry: RetryConfig,
    /// Retry policy for the commit stage.
    pub storage_retry: RetryConfig,
    /// Breaker settings for service-class stages.
    pub service_breaker: BreakerConfig,
    /// Breaker settings for the commit stage.
    pub storage_breaker: BreakerConfig,
    /// Whether needs-revision items are committed anyway.
    pub commit_needs_revision: bool,
    /// Score cutoffs for validators that report a score without a verdict.
    pub thresholds: ReviewThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            call_timeout: Duration::from_secs(30),
            service_retry: RetryConfig::service(),
            storage_retry: RetryConfig::storage(),
            service_breaker: BreakerConfig::service(),
            storage_breaker: BreakerConfig::storage(),
            commit_needs_revision: false,
            thresholds: ReviewThresholds::default(),
        }
    }
}

impl PipelineConfig {
    /// Sets the per-stage batch size.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Sets the retry policy for service-class stages.
    #[must_use]
    pub fn with_service_retry(mut self, retry: RetryConfig) -> Self {
        self.service_retry = retry;
        self
    }

    /// Sets the retry policy for the commit stage.
    #[must_use]
    pub fn with_storage_retry(mut self, retry: RetryConfig) -> Self {
        self.storage_retry = retry;
        self
    }

    /// Sets the breaker settings for service-class stages.
    #[must_use]
    pub fn with_service_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.service_breaker = breaker;
        self
    }

    /// Sets the breaker settings for the commit stage.
    #[must_use]
    pub fn with_storage_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.storage_breaker = breaker;
        self
    }

    /// Opts needs-revision items into the commit stage.
    #[must_use]
    pub fn with_commit_needs_revision(mut self, enabled: bool) -> Self {
        self.commit_needs_revision = enabled;
        self
    }

    /// Sets the review score cutoffs.
    #[must_use]
    pub fn with_thresholds(mut self, thresholds: ReviewThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// The retry policy for a stage's collaborator class.
    #[must_use]
    pub fn retry_for(&self, stage: crate::core::PipelineStage) -> &RetryConfig {
        if stage.is_storage() {
            &self.storage_retry
        } else {
            &self.service_retry
        }
    }

    /// The breaker settings for a stage's collaborator class.
    #[must_use]
    pub fn breaker_for(&self, stage: crate::core::PipelineStage) -> BreakerConfig {
        if stage.is_storage() {
            self.storage_breaker
        } else {
            self.service_breaker
        }
    }
}
