//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Pipeline metrics registry
pub struct Metrics {
    registry: Registry,

    // Operation engine
    pub operations_enqueued: IntCounter,
    pub operations_succeeded: IntCounter,
    pub operations_failed: IntCounter,
    pub operations_cancelled: IntCounter,
    pub operations_running: IntGauge,

    // Fee proxy cache
    pub fee_cache_hits: IntCounter,
    pub fee_cache_misses: IntCounter,
    pub fee_cache_evictions: IntCounter,
    pub fee_cache_entries: IntGauge,

    // Transactions
    pub extrinsics_signed: IntCounter,
    pub signing_failures: IntCounter,
    pub transactions_submitted: IntCounter,
    pub builder_errors: IntCounterVec,

    // Histograms
    pub operation_latency: Histogram,
    pub rpc_latency: Histogram,
}

impl Metrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let operations_enqueued = IntCounter::with_opts(Opts::new(
            "operations_enqueued_total",
            "Number of operations handed to the worker pool",
        ))?;

        let operations_succeeded = IntCounter::with_opts(Opts::new(
            "operations_succeeded_total",
            "Number of operations finished with a value",
        ))?;

        let operations_failed = IntCounter::with_opts(Opts::new(
            "operations_failed_total",
            "Number of operations finished with an error",
        ))?;

        let operations_cancelled = IntCounter::with_opts(Opts::new(
            "operations_cancelled_total",
            "Number of operations cancelled before finishing",
        ))?;

        let operations_running = IntGauge::with_opts(Opts::new(
            "operations_running",
            "Number of operation bodies currently executing",
        ))?;

        let fee_cache_hits = IntCounter::with_opts(Opts::new(
            "fee_cache_hits_total",
            "Fee requests answered from a loaded cache entry",
        ))?;

        let fee_cache_misses = IntCounter::with_opts(Opts::new(
            "fee_cache_misses_total",
            "Fee requests that started a new estimation",
        ))?;

        let fee_cache_evictions = IntCounter::with_opts(Opts::new(
            "fee_cache_evictions_total",
            "Loaded fee entries evicted to respect the cache capacity",
        ))?;

        let fee_cache_entries =
            IntGauge::with_opts(Opts::new("fee_cache_entries", "Current fee cache size"))?;

        let extrinsics_signed = IntCounter::with_opts(Opts::new(
            "extrinsics_signed_total",
            "Number of transactions signed and encoded",
        ))?;

        let signing_failures = IntCounter::with_opts(Opts::new(
            "signing_failures_total",
            "Number of per-index signing or encoding failures",
        ))?;

        let transactions_submitted = IntCounter::with_opts(Opts::new(
            "transactions_submitted_total",
            "Number of transactions accepted by the node",
        ))?;

        let builder_errors = IntCounterVec::new(
            Opts::new("builder_errors_total", "Transaction builder errors by category"),
            &["category"],
        )?;

        let operation_latency = Histogram::with_opts(
            HistogramOpts::new("operation_latency_seconds", "Operation body execution time")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
        )?;

        let rpc_latency = Histogram::with_opts(
            HistogramOpts::new("rpc_latency_seconds", "RPC call latency")
                .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        registry.register(Box::new(operations_enqueued.clone()))?;
        registry.register(Box::new(operations_succeeded.clone()))?;
        registry.register(Box::new(operations_failed.clone()))?;
        registry.register(Box::new(operations_cancelled.clone()))?;
        registry.register(Box::new(operations_running.clone()))?;
        registry.register(Box::new(fee_cache_hits.clone()))?;
        registry.register(Box::new(fee_cache_misses.clone()))?;
        registry.register(Box::new(fee_cache_evictions.clone()))?;
        registry.register(Box::new(fee_cache_entries.clone()))?;
        registry.register(Box::new(extrinsics_signed.clone()))?;
        registry.register(Box::new(signing_failures.clone()))?;
        registry.register(Box::new(transactions_submitted.clone()))?;
        registry.register(Box::new(builder_errors.clone()))?;
        registry.register(Box::new(operation_latency.clone()))?;
        registry.register(Box::new(rpc_latency.clone()))?;

        Ok(Self {
            registry,
            operations_enqueued,
            operations_succeeded,
            operations_failed,
            operations_cancelled,
            operations_running,
            fee_cache_hits,
            fee_cache_misses,
            fee_cache_evictions,
            fee_cache_entries,
            extrinsics_signed,
            signing_failures,
            transactions_submitted,
            builder_errors,
            operation_latency,
            rpc_latency,
        })
    }

    /// Get the registry for exporting
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Count a builder error under its category label
    pub fn record_builder_error(&self, category: &str) {
        self.builder_errors.with_label_values(&[category]).inc();
    }

    /// Render all metrics in the Prometheus text format
    pub fn export_text(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(err) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::warn!(error = %err, "Failed to encode metrics");
            return String::new();
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring step duration
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn observe_duration(&self, histogram: &Histogram) {
        histogram.observe(self.elapsed_secs());
    }

    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_creation() {
        let metrics = Metrics::new().unwrap();
        metrics.operations_enqueued.inc();
        metrics.record_builder_error("signing");
        assert_eq!(metrics.operations_enqueued.get(), 1);
        assert_eq!(
            metrics.builder_errors.with_label_values(&["signing"]).get(),
            1
        );
    }

    #[test]
    fn test_export_contains_metric_names() {
        let metrics = Metrics::new().unwrap();
        metrics.fee_cache_hits.inc();
        let text = metrics.export_text();
        assert!(text.contains("fee_cache_hits_total"));
    }
}
