//! Runs a full pipeline over in-memory collaborators.
//!
//! The enrich collaborator fails transiently at random to show retries
//! and the progress error log in action:
//!
//! ```text
//! cargo run --example run_pipeline
//! RUST_LOG=synthflow=debug cargo run --example run_pipeline
//! ```

use anyhow::Result;
use rand::Rng;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use synthflow::prelude::*;
use synthflow::testing::MemorySink;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("synthflow=info")),
        )
        .init();

    let ingest = Arc::new(FnService::new("ingest", |item: WorkItem| async move {
        Ok(json!({
            "topic": item.payload()["topic"],
            "accepted": true,
        }))
    }));

    // Fails roughly one call in four with a transient error; the retry
    // layer absorbs most of these.
    let enrich = Arc::new(FnService::new("enrich", |item: WorkItem| async move {
        if rand::thread_rng().gen_bool(0.25) {
            return Err(CallError::Connection("context service hiccup".into()));
        }
        let mut payload = item.payload().clone();
        payload["context"] = json!("supporting material");
        Ok(payload)
    }));

    let transform = Arc::new(FnService::new("transform", |item: WorkItem| async move {
        let mut payload = item.payload().clone();
        payload["answer"] = json!(format!("an answer about {}", payload["topic"]));
        Ok(payload)
    }));

    let validate = Arc::new(FnService::new("validate", |item: WorkItem| async move {
        let mut payload = item.payload().clone();
        payload["score"] = json!(rand::thread_rng().gen_range(0.5..1.0));
        Ok(payload)
    }));

    let sink = Arc::new(MemorySink::new());
    let stages = StageSet::with_sink(
        ingest,
        enrich,
        transform,
        validate,
        Arc::clone(&sink) as Arc<dyn StorageSink>,
    );

    let config = PipelineConfig::default()
        .with_batch_size(5)
        .with_call_timeout(Duration::from_secs(5))
        .with_service_retry(
            RetryConfig::service()
                .with_initial_delay(Duration::from_millis(50))
                .with_max_delay(Duration::from_millis(500)),
        );
    let pipeline = Pipeline::new(config, stages);

    let topics = [
        "entropy", "monsoons", "photosynthesis", "tectonics", "superconductors",
        "tides", "enzymes", "glaciers", "semaphores", "ferrofluids",
    ];
    let payloads = topics.iter().map(|topic| json!({"topic": topic})).collect();

    let report = pipeline.run(payloads).await?;

    println!("run status: {:?}", report.status());
    println!(
        "committed {} of {} items ({} records in the store)",
        report.committed().len(),
        report.snapshot().total_items,
        sink.records().len(),
    );
    for failed in report.failed_items() {
        println!("failed item: {}", failed.id());
    }
    println!(
        "snapshot: {}",
        serde_json::to_string_pretty(report.snapshot())?
    );

    Ok(())
}
