//! Resilience building blocks.
//!
//! This module provides:
//! - Bounded retries with exponential backoff ([`with_retry`])
//! - Per-collaborator circuit breaking ([`CircuitBreaker`])
//! - The composed per-call guard ([`ResilientCall`])

mod breaker;
mod guard;
mod retry;

pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use guard::ResilientCall;
pub use retry::{with_retry, JitterStrategy, RetryConfig};
