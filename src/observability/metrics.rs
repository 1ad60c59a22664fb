//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `multicluster_reconciliations_total{result}` - Keys processed, by outcome (success/retry/given_up)
//! - `multicluster_reconciliation_duration_seconds` - Duration of a single key's processing
//! - `multicluster_remote_clusters` - Current number of registered remote clusters
//! - `multicluster_cluster_events_total{event}` - Membership changes (added/updated/removed)
//! - `multicluster_cluster_id_conflicts_total` - Cluster IDs claimed by a second secret
//! - `multicluster_client_build_errors_total` - Credentials that failed to produce a client
//! - `multicluster_callback_errors_total{callback}` - Handler callbacks that returned an error
//! - `multicluster_requeues_total` - Rate-limited requeues after a failed key
//! - `multicluster_keys_given_up_total` - Keys dropped after exhausting retries
//! - `multicluster_queue_depth` - Keys waiting in the reconcile queue

use anyhow::Result;
use prometheus::{Histogram, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::LazyLock;
use std::time::Duration;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "multicluster_reconciliations_total",
            "Total number of processed reconcile keys by result",
        ),
        &["result"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "multicluster_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REMOTE_CLUSTERS: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "multicluster_remote_clusters",
        "Current number of registered remote clusters",
    )
    .expect("Failed to create REMOTE_CLUSTERS metric - this should never happen")
});

static CLUSTER_EVENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "multicluster_cluster_events_total",
            "Total number of cluster membership changes by event",
        ),
        &["event"],
    )
    .expect("Failed to create CLUSTER_EVENTS_TOTAL metric - this should never happen")
});

static CLUSTER_ID_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "multicluster_cluster_id_conflicts_total",
        "Total number of cluster IDs rejected because another secret owns them",
    )
    .expect("Failed to create CLUSTER_ID_CONFLICTS_TOTAL metric - this should never happen")
});

static CLIENT_BUILD_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "multicluster_client_build_errors_total",
        "Total number of remote cluster credentials that failed to build a client",
    )
    .expect("Failed to create CLIENT_BUILD_ERRORS_TOTAL metric - this should never happen")
});

static CALLBACK_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "multicluster_callback_errors_total",
            "Total number of cluster handler errors by callback",
        ),
        &["callback"],
    )
    .expect("Failed to create CALLBACK_ERRORS_TOTAL metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "multicluster_requeues_total",
        "Total number of rate-limited requeues",
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static KEYS_GIVEN_UP_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "multicluster_keys_given_up_total",
        "Total number of keys dropped after exhausting retries",
    )
    .expect("Failed to create KEYS_GIVEN_UP_TOTAL metric - this should never happen")
});

static QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "multicluster_queue_depth",
        "Current number of keys waiting in the reconcile queue",
    )
    .expect("Failed to create QUEUE_DEPTH metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REMOTE_CLUSTERS.clone()))?;
    REGISTRY.register(Box::new(CLUSTER_EVENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLUSTER_ID_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLIENT_BUILD_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CALLBACK_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(KEYS_GIVEN_UP_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_DEPTH.clone()))?;

    Ok(())
}

pub fn increment_reconciliations(result: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[result]).inc();
}

pub fn observe_reconciliation_duration(duration: Duration) {
    RECONCILIATION_DURATION.observe(duration.as_secs_f64());
}

pub fn set_remote_clusters(count: usize) {
    REMOTE_CLUSTERS.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_cluster_events(event: &str) {
    CLUSTER_EVENTS_TOTAL.with_label_values(&[event]).inc();
}

pub fn increment_cluster_conflicts() {
    CLUSTER_ID_CONFLICTS_TOTAL.inc();
}

pub fn increment_client_build_errors() {
    CLIENT_BUILD_ERRORS_TOTAL.inc();
}

pub fn increment_callback_errors(callback: &str) {
    CALLBACK_ERRORS_TOTAL.with_label_values(&[callback]).inc();
}

pub fn increment_requeues() {
    REQUEUES_TOTAL.inc();
}

pub fn increment_given_up() {
    KEYS_GIVEN_UP_TOTAL.inc();
}

pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(i64::try_from(depth).unwrap_or(i64::MAX));
}
