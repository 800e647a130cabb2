//! Collaborator call contracts.
//!
//! The engine's boundary is a small set of async traits. Stage content —
//! what a collaborator actually produces — lives entirely behind
//! [`StageService`]; the orchestration code never inspects the payload's
//! shape (the validate verdict extraction in the driver is the one
//! documented exception).

use crate::core::WorkItem;
use crate::errors::CallError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// An external collaborator backing one pipeline stage.
#[async_trait]
pub trait StageService: Send + Sync + fmt::Debug {
    /// The collaborator's name, used in logs and breaker identity.
    fn name(&self) -> &str;

    /// Processes one item, producing the stage's new payload.
    async fn invoke(&self, item: &WorkItem) -> Result<serde_json::Value, CallError>;
}

/// An async closure adapter for [`StageService`].
///
/// The closure receives the item by value so the returned future carries
/// no borrow of the caller's data.
pub struct FnService<F, Fut>
where
    F: Fn(WorkItem) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, CallError>> + Send,
{
    name: String,
    func: F,
    _marker: PhantomData<fn() -> Fut>,
}

impl<F, Fut> FnService<F, Fut>
where
    F: Fn(WorkItem) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, CallError>> + Send,
{
    /// Creates a new closure-backed collaborator.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
            _marker: PhantomData,
        }
    }
}

impl<F, Fut> fmt::Debug for FnService<F, Fut>
where
    F: Fn(WorkItem) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, CallError>> + Send,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnService").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F, Fut> StageService for FnService<F, Fut>
where
    F: Fn(WorkItem) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<serde_json::Value, CallError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, item: &WorkItem) -> Result<serde_json::Value, CallError> {
        (self.func)(item.clone()).await
    }
}

/// Identifier assigned by the persistent store on a successful write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Wraps a store-assigned identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The persistent store behind the commit stage.
#[async_trait]
pub trait StorageSink: Send + Sync + fmt::Debug {
    /// Writes one record, returning its assigned identifier.
    async fn write(&self, record: &serde_json::Value) -> Result<RecordId, CallError>;
}

/// Adapts a [`StorageSink`] to the [`StageService`] contract so the
/// commit stage runs through the same executor and guard as every other
/// stage (with the stricter storage breaker and retry profile).
#[derive(Debug)]
pub struct CommitService {
    name: String,
    sink: Arc<dyn StorageSink>,
}

impl CommitService {
    /// Wraps a storage sink as the commit collaborator.
    #[must_use]
    pub fn new(sink: Arc<dyn StorageSink>) -> Self {
        Self {
            name: "commit-storage".to_string(),
            sink,
        }
    }
}

#[async_trait]
impl StageService for CommitService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, item: &WorkItem) -> Result<serde_json::Value, CallError> {
        let record_id = self.sink.write(item.payload()).await?;
        Ok(serde_json::json!({
            "record_id": record_id,
            "record": item.payload(),
        }))
    }
}
