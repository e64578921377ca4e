//! Latency histogram metrics for edgefetch.

use metrics::histogram;
use std::time::{Duration, Instant};

/// Record the latency of one edge fetch.
pub fn record_edge_latency(outcome: &str, duration: Duration) {
    histogram!(
        "edgefetch_edge_fetch_duration_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// A latency timer that records into a histogram when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
    label: Option<(&'static str, String)>,
}

impl LatencyTimer {
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
            label: None,
        }
    }

    pub fn with_label(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.label = Some((key, value.into()));
        self
    }

    /// Elapsed time without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record now and consume the timer.
    pub fn record(self) {
        drop(self);
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let seconds = self.start.elapsed().as_secs_f64();
        match self.label.take() {
            Some((key, value)) => histogram!(self.metric_name, key => value).record(seconds),
            None => histogram!(self.metric_name).record(seconds),
        }
    }
}

/// Timer for a locator pool resolution.
pub fn resolution_timer() -> LatencyTimer {
    LatencyTimer::new("edgefetch_resolution_duration_seconds")
}

/// Timer for one edge retrieval, pool resolution included.
pub fn edge_fetch_timer(strategy: &str) -> LatencyTimer {
    LatencyTimer::new("edgefetch_block_duration_seconds").with_label("strategy", strategy)
}
