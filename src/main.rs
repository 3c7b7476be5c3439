//! Payment Risk Engine - Main Entry Point
//!
//! Answers payment requests received over NATS with a risk decision.
//! Requests are processed in parallel, bounded by the configured worker count.

use anyhow::{Context, Result};
use futures::StreamExt;
use payment_risk_engine::{
    config::AppConfig,
    consumer::RequestConsumer,
    metrics::{MetricsReporter, PipelineMetrics},
    pipeline::DecisionPipeline,
    producer::DecisionPublisher,
    types::{GatewayResponse, RejectionResponse, TransactionRequest},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str, format: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("payment_risk_engine={level}")))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if format == "pretty" {
        builder.pretty().init();
    } else {
        builder.json().init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config/config.toml".to_string());
    let config = AppConfig::load_from_path(&config_path)?;
    init_tracing(&config.logging.level, &config.logging.format)?;

    info!(path = %config_path, "Starting Payment Risk Engine");
    info!(
        low = config.decision.low,
        medium = config.decision.medium,
        high = config.decision.high,
        critical = config.decision.critical,
        "Decision bands"
    );

    let metrics = Arc::new(PipelineMetrics::new());
    let pipeline = Arc::new(DecisionPipeline::from_config(&config)?.with_metrics(metrics.clone()));

    let client = async_nats::connect(&config.nats.url).await?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = RequestConsumer::new(client.clone(), &config.nats.request_subject);
    let publisher = Arc::new(DecisionPublisher::new(client.clone(), &config.nats.decision_subject));

    let num_workers = config.pipeline.workers.max(1);
    info!(
        workers = num_workers,
        requests = consumer.subject(),
        decisions = publisher.subject(),
        "Starting request processing loop"
    );

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let processed_count = Arc::new(AtomicU64::new(0));

    let reporter = MetricsReporter::new(metrics.clone(), config.pipeline.metrics_interval_secs);
    tokio::spawn(reporter.start());

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore.clone().acquire_owned().await?;

        let pipeline = pipeline.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let processed_count = processed_count.clone();

        tokio::spawn(async move {
            let response = match serde_json::from_slice::<TransactionRequest>(&message.payload) {
                Ok(request) => pipeline.respond(&request),
                Err(e) => {
                    warn!(error = %e, "Failed to deserialize payment request");
                    metrics.record_rejection("malformed_request");
                    GatewayResponse::Rejected(RejectionResponse::malformed(&message.payload, e))
                }
            };

            if let Err(e) = publisher.publish(&response, message.reply.as_ref()).await {
                error!(
                    transaction_id = %response.transaction_id(),
                    error = %e,
                    "Failed to publish decision"
                );
            }

            let count = processed_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let stats = metrics.get_processing_stats();
                info!(
                    processed = count,
                    throughput = format!("{:.1} tx/s", metrics.get_throughput()),
                    avg_latency_us = stats.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Risk engine shutting down...");
    metrics.print_summary();

    Ok(())
}
