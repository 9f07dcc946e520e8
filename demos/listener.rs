//! Runs the ingestion pipeline against a live change stream.
//!
//! Configured from the `FEED_*` environment variables. Without
//! `FEED_QUEUE_URL` batches go to an in-memory queue and are only logged.
//!
//!     FEED_STREAM_URL=ws://127.0.0.1:8080/changes RUST_LOG=info cargo run --example listener

use std::sync::Arc;
use std::time::Duration;

use feed_indexer::{HttpJobQueue, IngestPipeline, JobQueue, MemoryQueue, PipelineConfig};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // wss:// and https:// both need a process-wide crypto provider
    let _ = rustls::crypto::ring::default_provider().install_default();

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let dry_run = config.queue_url.is_none();
    let memory = Arc::new(MemoryQueue::new());
    let queue: Arc<dyn JobQueue> = match &config.queue_url {
        Some(url) => Arc::new(
            HttpJobQueue::new(url, config.queue_timeout).expect("Invalid queue URL"),
        ),
        None => {
            info!("FEED_QUEUE_URL not set, batches stay in memory");
            memory.clone()
        }
    };

    let mut pipeline = IngestPipeline::new(config, queue);
    if let Err(e) = pipeline.start() {
        error!("Failed to start: {}", e);
        return;
    }

    let mut report = tokio::time::interval(Duration::from_secs(10));
    report.tick().await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = report.tick() => {
                let status = pipeline.status().await;
                info!("{}", status);
                if dry_run {
                    info!("{} jobs accepted so far", memory.job_count().await);
                }
            }
        }
    }

    pipeline.stop().await;
    match serde_json::to_string_pretty(&pipeline.status().await) {
        Ok(json) => println!("{}", json),
        Err(e) => error!("Could not render status: {}", e),
    }
}
