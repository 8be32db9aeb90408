// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the meshimport controller.
//!
//! All metrics carry the namespace prefix `meshimport_`.
//!
//! # Metrics Categories
//!
//! - **Event Metrics** - Queue events processed, their duration and retries
//! - **Cluster Metrics** - Registered remote clusters and registration outcomes
//! - **ServiceImport Metrics** - Writes to `ServiceImport` objects
//! - **Error Metrics** - Errors by category
//! - **Leader Election Metrics** - Leadership transitions and current state
//!
//! # Example
//!
//! ```rust,no_run
//! use meshimport::metrics::record_event_success;
//!
//! record_event_success("service_export", std::time::Duration::from_millis(12));
//! ```

use prometheus::{
    CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all meshimport metrics
const METRICS_NAMESPACE: &str = "meshimport";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
///
/// All metrics are registered in this registry and exposed via `/metrics` endpoint.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Event Metrics
// ============================================================================

/// Total number of queue events processed by event type and outcome
///
/// Labels:
/// - `event_type`: `cluster_registration`, `cluster_update`, `cluster_deletion`,
///   `service_export`, `service_unexport`
/// - `outcome`: `success`, `error`, `requeue`, `dropped`, `skipped`, `superseded`
pub static EVENTS_PROCESSED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_events_processed_total"),
        "Total number of queue events processed by event type and outcome",
    );
    let counter = CounterVec::new(opts, &["event_type", "outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Duration of event processing in seconds
///
/// Labels:
/// - `event_type`: Kind of event
pub static EVENT_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_event_duration_seconds"),
        "Duration of queue event processing in seconds by event type",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    let histogram = HistogramVec::new(opts, &["event_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(histogram.clone()))
        .unwrap();
    histogram
});

/// Total number of requeue operations
///
/// Labels:
/// - `event_type`: Kind of event
/// - `reason`: `conflict`, `transient`, `configuration`
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of event requeues by event type and reason",
    );
    let counter = CounterVec::new(opts, &["event_type", "reason"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Number of events waiting in the queue
pub static QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_queue_depth"),
        "Number of events waiting in the queue",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Cluster Metrics
// ============================================================================

/// Number of remote clusters with a live connection
pub static REGISTERED_CLUSTERS: LazyLock<Gauge> = LazyLock::new(|| {
    let gauge = Gauge::new(
        format!("{METRICS_NAMESPACE}_registered_clusters"),
        "Number of remote clusters with a live connection",
    )
    .unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

/// Total number of remote cluster registration attempts
///
/// Labels:
/// - `outcome`: `success`, `error`
pub static CLUSTER_REGISTRATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_cluster_registrations_total"),
        "Total number of remote cluster registration attempts by outcome",
    );
    let counter = CounterVec::new(opts, &["outcome"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// ServiceImport Metrics
// ============================================================================

/// Total number of writes to `ServiceImport` objects
///
/// Labels:
/// - `operation`: `create`, `add_cluster`, `remove_cluster`
pub static SERVICE_IMPORT_WRITES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_service_import_writes_total"),
        "Total number of ServiceImport writes by operation",
    );
    let counter = CounterVec::new(opts, &["operation"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by event type and error category
///
/// Labels:
/// - `event_type`: Kind of event
/// - `error_type`: Category of error (`conflict`, `api_error`, `secret_not_found`, ...)
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by event type and error category",
    );
    let counter = CounterVec::new(opts, &["event_type", "error_type"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Total number of leader election events
///
/// Labels:
/// - `status`: Event type (`acquired`, `lost`)
pub static LEADER_ELECTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_elections_total"),
        "Total number of leader election events by status",
    );
    let counter = CounterVec::new(opts, &["status"]).unwrap();
    METRICS_REGISTRY
        .register(Box::new(counter.clone()))
        .unwrap();
    counter
});

/// Current leader election status
///
/// Labels:
/// - `identity`: Lease holder identity of this replica
///
/// Value: 1 if leader, 0 if follower
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Current leader election status (1 = leader, 0 = follower)",
    );
    let gauge = GaugeVec::new(opts, &["identity"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successfully processed event
pub fn record_event_success(event_type: &str, duration: Duration) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, "success"])
        .inc();
    EVENT_DURATION_SECONDS
        .with_label_values(&[event_type])
        .observe(duration.as_secs_f64());
}

/// Record a failed event
///
/// # Arguments
/// * `event_type` - The kind of event
/// * `error_type` - Category of error (e.g., `conflict`, `api_error`)
/// * `duration` - Duration of processing before failure
pub fn record_event_error(event_type: &str, error_type: &str, duration: Duration) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, "error"])
        .inc();
    EVENT_DURATION_SECONDS
        .with_label_values(&[event_type])
        .observe(duration.as_secs_f64());
    ERRORS_TOTAL
        .with_label_values(&[event_type, error_type])
        .inc();
}

/// Record an event put back on the queue for retry
pub fn record_event_requeue(event_type: &str, reason: &str) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, "requeue"])
        .inc();
    REQUEUE_TOTAL.with_label_values(&[event_type, reason]).inc();
}

/// Record an event abandoned after exhausting its retries
pub fn record_event_dropped(event_type: &str) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, "dropped"])
        .inc();
}

/// Record an event discarded because this replica is not leading
pub fn record_event_skipped(event_type: &str) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, "skipped"])
        .inc();
}

/// Record a retry discarded because a newer event for the same object was applied
pub fn record_event_superseded(event_type: &str) {
    EVENTS_PROCESSED_TOTAL
        .with_label_values(&[event_type, "superseded"])
        .inc();
}

/// Update the queue depth gauge
#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

/// Update the registered clusters gauge
#[allow(clippy::cast_precision_loss)]
pub fn set_registered_clusters(count: usize) {
    REGISTERED_CLUSTERS.set(count as f64);
}

/// Record a remote cluster registration attempt
///
/// # Arguments
/// * `outcome` - `success` or `error`
pub fn record_cluster_registration(outcome: &str) {
    CLUSTER_REGISTRATIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();
}

/// Record a write to a `ServiceImport`
pub fn record_service_import_write(operation: &str) {
    SERVICE_IMPORT_WRITES_TOTAL
        .with_label_values(&[operation])
        .inc();
}

/// Record leader election acquired
pub fn record_leader_elected(identity: &str) {
    LEADER_ELECTIONS_TOTAL
        .with_label_values(&["acquired"])
        .inc();
    LEADER_STATUS.with_label_values(&[identity]).set(1.0);
}

/// Record leader election lost
pub fn record_leader_lost(identity: &str) {
    LEADER_ELECTIONS_TOTAL.with_label_values(&["lost"]).inc();
    LEADER_STATUS.with_label_values(&[identity]).set(0.0);
}

/// Gather and encode all metrics in Prometheus text format
///
/// # Errors
/// Returns error if encoding fails
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}
