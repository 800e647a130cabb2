//! In-memory collaborator and storage doubles.

use crate::core::{ItemId, WorkItem};
use crate::errors::CallError;
use crate::services::{RecordId, StageService, StorageSink};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// A collaborator with one fixed response, a call counter and an optional
/// artificial latency.
#[derive(Debug)]
pub struct StaticService {
    name: String,
    result: Mutex<Result<Value, CallError>>,
    latency: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticService {
    /// A collaborator that always succeeds with `payload`.
    #[must_use]
    pub fn ok(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            result: Mutex::new(Ok(payload)),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A collaborator that always fails with `error`.
    #[must_use]
    pub fn failing(name: impl Into<String>, error: CallError) -> Self {
        Self {
            name: name.into(),
            result: Mutex::new(Err(error)),
            latency: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// A collaborator that sleeps for `latency` before succeeding.
    #[must_use]
    pub fn slow(name: impl Into<String>, latency: Duration, payload: Value) -> Self {
        Self {
            name: name.into(),
            result: Mutex::new(Ok(payload)),
            latency: Some(latency),
            calls: AtomicUsize::new(0),
        }
    }

    /// Replaces the response for subsequent calls.
    pub fn set_result(&self, result: Result<Value, CallError>) {
        *self.result.lock() = result;
    }

    /// How many times the collaborator was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageService for StaticService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _item: &WorkItem) -> Result<Value, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.result.lock().clone()
    }
}

/// A collaborator that fails each item's first `failures_per_item`
/// attempts, then succeeds.
///
/// Attempt counts are tracked per item so concurrent items do not share
/// a failure budget.
#[derive(Debug)]
pub struct FlakyService {
    name: String,
    failures_per_item: usize,
    error: CallError,
    attempts: Mutex<HashMap<ItemId, usize>>,
}

impl FlakyService {
    /// Creates a collaborator that fails `failures_per_item` times per
    /// item with `error` before succeeding.
    #[must_use]
    pub fn new(name: impl Into<String>, failures_per_item: usize, error: CallError) -> Self {
        Self {
            name: name.into(),
            failures_per_item,
            error,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Attempts made so far for one item.
    #[must_use]
    pub fn attempts_for(&self, item_id: ItemId) -> usize {
        self.attempts.lock().get(&item_id).copied().unwrap_or(0)
    }
}

#[async_trait]
impl StageService for FlakyService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, item: &WorkItem) -> Result<Value, CallError> {
        let attempt = {
            let mut attempts = self.attempts.lock();
            let entry = attempts.entry(item.id()).or_insert(0);
            *entry += 1;
            *entry
        };
        if attempt <= self.failures_per_item {
            Err(self.error.clone())
        } else {
            Ok(json!({
                "item_id": item.id(),
                "attempts": attempt,
            }))
        }
    }
}

/// A collaborator that plays back a scripted sequence of responses, then
/// repeats a default.
#[derive(Debug)]
pub struct ScriptedService {
    name: String,
    script: Mutex<VecDeque<Result<Value, CallError>>>,
    default: Result<Value, CallError>,
    calls: AtomicUsize,
}

impl ScriptedService {
    /// Creates a collaborator that consumes `script` one call at a time
    /// and answers `default` once the script is exhausted.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        script: Vec<Result<Value, CallError>>,
        default: Result<Value, CallError>,
    ) -> Self {
        Self {
            name: name.into(),
            script: Mutex::new(script.into()),
            default,
            calls: AtomicUsize::new(0),
        }
    }

    /// How many times the collaborator was invoked.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StageService for ScriptedService {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, _item: &WorkItem) -> Result<Value, CallError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.default.clone())
    }
}

/// An in-memory [`StorageSink`] with injectable failures.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Value>>,
    fail_queue: Mutex<VecDeque<CallError>>,
}

impl MemorySink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in write order.
    #[must_use]
    pub fn records(&self) -> Vec<Value> {
        self.records.lock().clone()
    }

    /// Queues an error; each queued error fails exactly one future write.
    pub fn fail_next(&self, error: CallError) {
        self.fail_queue.lock().push_back(error);
    }
}

#[async_trait]
impl StorageSink for MemorySink {
    async fn write(&self, record: &Value) -> Result<RecordId, CallError> {
        if let Some(error) = self.fail_queue.lock().pop_front() {
            return Err(error);
        }
        let mut records = self.records.lock();
        records.push(record.clone());
        Ok(RecordId::new(format!("rec-{}", records.len())))
    }
}
