#![allow(clippy::expect_used)] // it is safe to unwrap static metrics

use std::iter::repeat;
use std::ops::Mul;
use std::time::Duration;

use clippy_utilities::NumericCast;
use lazy_static::lazy_static;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry};
use tracing::error;

use crate::reconcile::ReconcileError;

/// Returns a vector of exponentially spaced time buckets, for duration histograms.
fn exponential_time_bucket(start: f64, factor: f64, count: usize) -> Vec<f64> {
    repeat(factor)
        .enumerate()
        .take(count)
        .map(|(i, f)| start.mul(f.powi(i.numeric_cast())))
        .collect::<Vec<_>>()
}

lazy_static! {
    pub(crate) static ref REGISTRY: Registry = Registry::new();
    static ref RECONCILE_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mounter_pod_reconcile_duration_seconds",
            "Duration of the attachment reconciler's reconcile loop in seconds",
        )
        .buckets(exponential_time_bucket(0.1, 2.0, 10))
    )
    .expect("failed to create mounter_pod_reconcile_duration_seconds histogram");
    static ref RECONCILE_OUTCOME: IntCounterVec = IntCounterVec::new(
        Opts::new(
            "mounter_pod_reconcile_outcome_count",
            "Outcomes of the attachment reconciler's reconcile loop"
        ),
        &["outcome"]
    )
    .expect("failed to create mounter_pod_reconcile_outcome_count counter");
    static ref CLEANER_PASS_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "mounter_pod_cleaner_pass_duration_seconds",
            "Duration of a stale-attachment cleaner pass in seconds",
        )
        .buckets(exponential_time_bucket(0.1, 2.0, 10))
    )
    .expect("failed to create mounter_pod_cleaner_pass_duration_seconds histogram");
}

/// Register every metric with the process-wide registry. Call once at startup.
pub fn init() {
    REGISTRY
        .register(Box::new(RECONCILE_DURATION.clone()))
        .expect("failed to register mounter_pod_reconcile_duration_seconds histogram");
    REGISTRY
        .register(Box::new(RECONCILE_OUTCOME.clone()))
        .expect("failed to register mounter_pod_reconcile_outcome_count counter");
    REGISTRY
        .register(Box::new(CLEANER_PASS_DURATION.clone()))
        .expect("failed to register mounter_pod_cleaner_pass_duration_seconds histogram");
}

/// Record one reconcile's duration and outcome.
pub fn observe_reconcile<T>(duration: Duration, outcome: &std::result::Result<T, ReconcileError>) {
    RECONCILE_DURATION.observe(duration.as_secs_f64());
    let label = match outcome {
        Ok(_) => "success",
        Err(ReconcileError::Kube(_)) => "kube_error",
        Err(ReconcileError::Builder(_)) => "builder_error",
        Err(ReconcileError::MissingField(_)) => "missing_field",
    };
    RECONCILE_OUTCOME.with_label_values(&[label]).inc();
}

/// Record one cleaner pass's duration.
pub fn observe_cleaner_pass(duration: Duration) {
    CLEANER_PASS_DURATION.observe(duration.as_secs_f64());
}

/// `/metrics` handler: Prometheus text exposition of this registry plus the process defaults.
#[allow(clippy::unused_async)] // required by axum's handler signature
pub(crate) async fn metrics() -> String {
    let mut buf1 = Vec::new();
    let encoder = prometheus::TextEncoder::new();
    let metric_families = REGISTRY.gather();
    if let Err(err) = encoder.encode(&metric_families, &mut buf1) {
        error!("failed to encode custom metrics: {}", err);
        return String::new();
    }
    let mut res = String::from_utf8(buf1).unwrap_or_default();
    let mut buf2 = Vec::new();
    if let Err(err) = encoder.encode(&prometheus::gather(), &mut buf2) {
        error!("failed to encode prometheus metrics: {}", err);
        return String::new();
    }
    res.push_str(&String::from_utf8_lossy(&buf2));
    res
}
