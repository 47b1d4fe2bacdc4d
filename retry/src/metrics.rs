//! Prometheus metrics for holdback

use crate::error::{Result, RetryError};
use prometheus::{
    Counter, CounterVec, Encoder, HistogramVec, TextEncoder, register_counter,
    register_counter_vec, register_histogram_vec,
};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics instance
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Outcome label for a message sent to its retry queue
pub const OUTCOME_RETRIED: &str = "retried";

/// Outcome label for a message sent to its dead-letter queue
pub const OUTCOME_DEAD_LETTERED: &str = "dead_lettered";

/// All holdback metrics
pub struct Metrics {
    // ─────────────────────────────────────────────────────────────────────────
    // Recovery
    // ─────────────────────────────────────────────────────────────────────────
    /// Recovery decisions (by consumer queue, outcome)
    pub recoveries: CounterVec,

    /// Delay applied to retried messages in seconds (by consumer queue)
    pub retry_delay_seconds: HistogramVec,

    /// Recoveries that failed to republish (by consumer queue)
    pub recovery_failures: CounterVec,

    // ─────────────────────────────────────────────────────────────────────────
    // Topology
    // ─────────────────────────────────────────────────────────────────────────
    /// Retry topologies declared
    pub topology_declared: Counter,
}

impl Metrics {
    /// Initialize metrics (call once at startup)
    ///
    /// Returns error if metric registration fails.
    pub fn init() -> Result<&'static Metrics> {
        if let Some(metrics) = METRICS.get() {
            return Ok(metrics);
        }

        let metrics = Metrics {
            recoveries: register_counter_vec!(
                "holdback_recoveries_total",
                "Failed messages routed by the recovery router",
                &["queue", "outcome"]
            )
            .map_err(|e| RetryError::Metrics(format!("recoveries: {e}")))?,

            retry_delay_seconds: register_histogram_vec!(
                "holdback_retry_delay_seconds",
                "Holding-queue delay applied to retried messages",
                &["queue"],
                // Buckets: 100ms to 1h
                vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]
            )
            .map_err(|e| RetryError::Metrics(format!("retry_delay_seconds: {e}")))?,

            recovery_failures: register_counter_vec!(
                "holdback_recovery_failures_total",
                "Recoveries whose republish failed",
                &["queue"]
            )
            .map_err(|e| RetryError::Metrics(format!("recovery_failures: {e}")))?,

            topology_declared: register_counter!(
                "holdback_topology_declared_total",
                "Retry topologies declared"
            )
            .map_err(|e| RetryError::Metrics(format!("topology_declared: {e}")))?,
        };

        // Set the metrics (only succeeds once)
        let _ = METRICS.set(metrics);

        METRICS
            .get()
            .ok_or_else(|| RetryError::Metrics("Failed to initialize metrics".to_string()))
    }

    /// Get the global metrics instance
    ///
    /// Returns None if metrics haven't been initialized yet.
    pub fn get() -> Option<&'static Metrics> {
        METRICS.get()
    }

    /// Record a message sent to its retry queue
    pub fn record_retried(&self, queue: &str, delay: Duration) {
        self.recoveries
            .with_label_values(&[queue, OUTCOME_RETRIED])
            .inc();
        self.retry_delay_seconds
            .with_label_values(&[queue])
            .observe(delay.as_secs_f64());
    }

    /// Record a message sent to its dead-letter queue
    pub fn record_dead_lettered(&self, queue: &str) {
        self.recoveries
            .with_label_values(&[queue, OUTCOME_DEAD_LETTERED])
            .inc();
    }

    /// Record a failed republish
    pub fn record_failure(&self, queue: &str) {
        self.recovery_failures.with_label_values(&[queue]).inc();
    }

    /// Record a declared topology
    pub fn record_topology_declared(&self) {
        self.topology_declared.inc();
    }
}

/// Gather all metrics and encode as Prometheus text format
pub fn gather() -> String {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    if encoder.encode(&metric_families, &mut buffer).is_ok() {
        String::from_utf8(buffer).unwrap_or_default()
    } else {
        String::new()
    }
}
