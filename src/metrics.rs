//! Metrics collection and export module

use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::time::Instant;

/// Lifecycle metrics registry
pub struct Metrics {
    registry: Registry,

    // Counters
    pub estimates_requested: IntCounterVec,
    pub estimates_failed: IntCounterVec,
    pub estimates_superseded: IntCounter,
    pub submissions_total: IntCounterVec,
    pub submissions_rejected: IntCounterVec,
    pub submits_skipped: IntCounterVec,
    pub confirmations_total: IntCounterVec,
    pub failures_total: IntCounterVec,

    // Gauges
    pub in_flight: IntGauge,

    // Histograms
    pub estimate_latency: Histogram,
    pub confirmation_latency: Histogram,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let estimates_requested = IntCounterVec::new(
            Opts::new("txflow_estimates_requested_total", "Estimation triggers issued"),
            &["action"],
        )?;

        let estimates_failed = IntCounterVec::new(
            Opts::new("txflow_estimates_failed_total", "Estimations that ended in an error"),
            &["action", "category"],
        )?;

        let estimates_superseded = IntCounter::with_opts(Opts::new(
            "txflow_estimates_superseded_total",
            "Estimation results discarded for a newer trigger",
        ))?;

        let submissions_total = IntCounterVec::new(
            Opts::new("txflow_submissions_total", "Submissions accepted by the ledger client"),
            &["action"],
        )?;

        let submissions_rejected = IntCounterVec::new(
            Opts::new(
                "txflow_submissions_rejected_total",
                "Submissions refused by the ledger client",
            ),
            &["action"],
        )?;

        let submits_skipped = IntCounterVec::new(
            Opts::new("txflow_submits_skipped_total", "Submit calls ignored by the guard"),
            &["action", "reason"],
        )?;

        let confirmations_total = IntCounterVec::new(
            Opts::new("txflow_confirmations_total", "Confirmed transactions"),
            &["action"],
        )?;

        let failures_total = IntCounterVec::new(
            Opts::new("txflow_failures_total", "Transactions failed after submission"),
            &["action"],
        )?;

        let in_flight = IntGauge::with_opts(Opts::new(
            "txflow_in_flight",
            "Transactions waiting for confirmation",
        ))?;

        let estimate_latency = Histogram::with_opts(
            HistogramOpts::new("txflow_estimate_latency_seconds", "Gas estimation latency")
                .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        )?;

        let confirmation_latency = Histogram::with_opts(
            HistogramOpts::new(
                "txflow_confirmation_latency_seconds",
                "Time from submission to terminal event",
            )
            .buckets(vec![0.5, 1.0, 2.0, 5.0, 15.0, 30.0, 60.0, 300.0]),
        )?;

        registry.register(Box::new(estimates_requested.clone()))?;
        registry.register(Box::new(estimates_failed.clone()))?;
        registry.register(Box::new(estimates_superseded.clone()))?;
        registry.register(Box::new(submissions_total.clone()))?;
        registry.register(Box::new(submissions_rejected.clone()))?;
        registry.register(Box::new(submits_skipped.clone()))?;
        registry.register(Box::new(confirmations_total.clone()))?;
        registry.register(Box::new(failures_total.clone()))?;
        registry.register(Box::new(in_flight.clone()))?;
        registry.register(Box::new(estimate_latency.clone()))?;
        registry.register(Box::new(confirmation_latency.clone()))?;

        Ok(Self {
            registry,
            estimates_requested,
            estimates_failed,
            estimates_superseded,
            submissions_total,
            submissions_rejected,
            submits_skipped,
            confirmations_total,
            failures_total,
            in_flight,
            estimate_latency,
            confirmation_latency,
        })
    }

    /// Render all metrics in the prometheus text format
    pub fn render(&self) -> anyhow::Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

/// Global metrics instance
pub fn metrics() -> &'static Metrics {
    static METRICS: once_cell::sync::Lazy<Metrics> =
        once_cell::sync::Lazy::new(|| Metrics::new().expect("Failed to initialize metrics"));
    &METRICS
}

/// Timer helper for measuring operation duration
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
        histogram.observe(self.start.elapsed().as_secs_f64());
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
