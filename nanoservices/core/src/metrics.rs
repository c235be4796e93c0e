//! Prometheus metrics for pipeline runs.
//!
//! All metrics live in a dedicated registry so `gather_text` only renders
//! what this crate records.

use once_cell::sync::Lazy;
use prometheus::{
    CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};

static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

static RUNS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let counter = CounterVec::new(
        Opts::new("stageflow_runs_total", "Completed pipeline runs"),
        &["pipeline"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

static FAILURES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    let counter = CounterVec::new(
        Opts::new("stageflow_failures_total", "Failed pipeline runs"),
        &["pipeline"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

static RUN_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new("stageflow_run_duration_ms", "Pipeline run duration")
            .buckets(vec![10.0, 100.0, 1_000.0, 10_000.0, 60_000.0, 600_000.0]),
        &["pipeline"],
    )
    .unwrap();
    REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

static ROWS_WRITTEN: Lazy<CounterVec> = Lazy::new(|| {
    let counter = CounterVec::new(
        Opts::new("stageflow_rows_written_total", "Rows written per stage"),
        &["pipeline", "stage"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

static JOIN_DRIFT: Lazy<CounterVec> = Lazy::new(|| {
    let counter = CounterVec::new(
        Opts::new(
            "stageflow_join_drift_total",
            "Joins whose output row count differed from the driving table",
        ),
        &["table"],
    )
    .unwrap();
    REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

pub fn inc_run(pipeline: &str) {
    RUNS_TOTAL.with_label_values(&[pipeline]).inc();
}

pub fn inc_failure(pipeline: &str) {
    FAILURES_TOTAL.with_label_values(&[pipeline]).inc();
}

pub fn observe_duration(pipeline: &str, duration_ms: f64) {
    RUN_DURATION_MS
        .with_label_values(&[pipeline])
        .observe(duration_ms);
}

pub fn add_rows(pipeline: &str, stage: &str, rows: u64) {
    ROWS_WRITTEN
        .with_label_values(&[pipeline, stage])
        .inc_by(rows as f64);
}

pub fn inc_join_drift(table: &str) {
    JOIN_DRIFT.with_label_values(&[table]).inc();
}

/// Render all metrics in the Prometheus text exposition format.
pub fn gather_text() -> String {
    let mut buf = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buf) {
        tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buf).unwrap_or_default()
}
