//! Observability module for edgefetch.
//!
//! Logging goes through `tracing`; counters go through the `metrics` facade
//! and are exported by whatever recorder the embedding process installs.

pub mod histograms;

pub use self::histograms::{edge_fetch_timer, resolution_timer, LatencyTimer};

use crate::config::ObservabilityConfig;
use crate::error::{FetchError, Result};
use metrics::counter;
use ::tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize logging.
pub fn init(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json())
            .try_init()
            .map_err(|e| FetchError::Internal(format!("Failed to init logging: {}", e)))?;
    } else {
        subscriber
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| FetchError::Internal(format!("Failed to init logging: {}", e)))?;
    }

    info!("Observability initialized");
    Ok(())
}

/// Record an edge fetch attempt and its outcome.
pub fn record_edge_fetch(outcome: &str, bytes: usize) {
    counter!("edgefetch_edge_fetches_total", "outcome" => outcome.to_string()).increment(1);
    if bytes > 0 {
        counter!("edgefetch_bytes_retrieved_total", "source" => "edge").increment(bytes as u64);
    }
}

/// Record a gateway fetch.
pub fn record_gateway_fetch(success: bool, bytes: usize) {
    counter!(
        "edgefetch_gateway_fetches_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
    if bytes > 0 {
        counter!("edgefetch_bytes_retrieved_total", "source" => "gateway").increment(bytes as u64);
    }
}

/// Record a pool resolution against the locator.
pub fn record_resolution(success: bool) {
    counter!(
        "edgefetch_resolutions_total",
        "outcome" => if success { "success" } else { "failure" }
    )
    .increment(1);
}

/// Record the fate of an outcome report.
pub fn record_report(status: &str) {
    counter!("edgefetch_reports_total", "status" => status.to_string()).increment(1);
}

/// Record a batch item leaving the fetcher.
pub fn record_batch_item(success: bool) {
    if success {
        counter!("edgefetch_batch_items_emitted_total").increment(1);
    } else {
        counter!("edgefetch_batch_items_failed_total").increment(1);
    }
}
