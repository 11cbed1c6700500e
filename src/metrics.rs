// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the ingress controller.
//!
//! Every metric carries the `apisix_ingress_` prefix and is registered in
//! [`METRICS_REGISTRY`], which the health server exposes on `/metrics`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - root objects processed by the engine
//! - **Admin API Metrics** - calls against data-plane admin APIs
//! - **Data-Plane Metrics** - synced objects per gateway group
//! - **Leader Election Metrics** - leadership state changes
//!
//! # Example
//!
//! ```rust,no_run
//! use apisix_ingress::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("HTTPRoute", std::time::Duration::from_millis(12));
//! ```

use prometheus::{
    core::Collector, CounterVec, Encoder, Gauge, GaugeVec, HistogramOpts, HistogramVec, Opts,
    Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all metrics (prometheus-safe)
const METRICS_NAMESPACE: &str = "apisix_ingress";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// Register `metric` and hand it back. Only called from the statics below,
/// each of which is initialised once.
fn registered<M: Collector + Clone + 'static>(metric: prometheus::Result<M>) -> M {
    let metric = metric.expect("metric options are valid");
    METRICS_REGISTRY
        .register(Box::new(metric.clone()))
        .expect("metric names are unique");
    metric
}

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Reconciliations by root kind and outcome (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by root kind and status",
    );
    registered(CounterVec::new(opts, &["resource_type", "status"]))
});

/// Duration of one root reconciliation (translate and sync) in seconds
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by root kind",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]);
    registered(HistogramVec::new(opts, &["resource_type"]))
});

/// Requeues by root kind and reason (`sync_failed`, `group_unavailable`)
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of requeue operations by root kind and reason",
    );
    registered(CounterVec::new(opts, &["resource_type", "reason"]))
});

/// Translation failures by root kind
pub static TRANSLATION_ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_translation_errors_total"),
        "Total number of translation failures by root kind",
    );
    registered(CounterVec::new(opts, &["resource_type"]))
});

/// Root keys waiting in the work queue
pub static QUEUE_DEPTH: LazyLock<Gauge> = LazyLock::new(|| {
    registered(Gauge::new(
        format!("{METRICS_NAMESPACE}_queue_depth"),
        "Number of root objects waiting to be reconciled",
    ))
});

/// Status writes by root kind and result
pub static STATUS_UPDATES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_status_updates_total"),
        "Total number of status patches by kind and result",
    );
    registered(CounterVec::new(opts, &["resource_type", "result"]))
});

// ============================================================================
// Admin API Metrics
// ============================================================================

/// Admin API calls by object kind, operation (`put`, `delete`, `list`) and result
pub static ADMIN_OPERATIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_admin_operations_total"),
        "Total number of admin API calls by object kind, operation and result",
    );
    registered(CounterVec::new(opts, &["object_kind", "operation", "result"]))
});

/// Admin API call latency including in-call retries
pub static ADMIN_OPERATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_admin_operation_duration_seconds"),
        "Duration of admin API calls in seconds by operation",
    )
    .buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0]);
    registered(HistogramVec::new(opts, &["operation"]))
});

// ============================================================================
// Data-Plane Metrics
// ============================================================================

/// Objects currently synced per gateway group and object kind
pub static SYNCED_OBJECTS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_synced_objects"),
        "Number of data-plane objects in the last synced snapshot",
    );
    registered(GaugeVec::new(opts, &["gateway_group", "object_kind"]))
});

/// Orphans removed by full resyncs
pub static ORPHANS_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_orphans_deleted_total"),
        "Total number of managed data-plane objects deleted because nothing declares them",
    );
    registered(CounterVec::new(opts, &["gateway_group", "object_kind"]))
});

// ============================================================================
// Watch Metrics
// ============================================================================

/// Watch events applied to the cache (`apply`, `delete`, `relist`, `error`)
pub static WATCH_EVENTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_watch_events_total"),
        "Total number of watch events by resource kind and event",
    );
    registered(CounterVec::new(opts, &["resource_type", "event"]))
});

// ============================================================================
// Leader Election Metrics
// ============================================================================

/// Leadership transitions (`acquired`, `lost`)
pub static LEADER_ELECTIONS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_elections_total"),
        "Total number of leadership changes by event",
    );
    registered(CounterVec::new(opts, &["status"]))
});

/// 1 while this replica holds the lease
pub static LEADER_STATUS: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_leader_status"),
        "Whether this replica is the leader (1) or not (0)",
    );
    registered(GaugeVec::new(opts, &["pod_name"]))
});

// ============================================================================
// Recording Helpers
// ============================================================================

pub fn record_reconciliation_success(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "success"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

pub fn record_reconciliation_error(resource_type: &str, duration: Duration) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "error"])
        .inc();
    RECONCILIATION_DURATION_SECONDS
        .with_label_values(&[resource_type])
        .observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue
///
/// # Arguments
/// * `resource_type` - Root kind
/// * `reason` - `sync_failed` or `group_unavailable`
pub fn record_reconciliation_requeue(resource_type: &str, reason: &str) {
    RECONCILIATION_TOTAL
        .with_label_values(&[resource_type, "requeue"])
        .inc();
    REQUEUE_TOTAL
        .with_label_values(&[resource_type, reason])
        .inc();
}

pub fn record_translation_error(resource_type: &str) {
    TRANSLATION_ERRORS_TOTAL
        .with_label_values(&[resource_type])
        .inc();
}

#[allow(clippy::cast_precision_loss)]
pub fn set_queue_depth(depth: usize) {
    QUEUE_DEPTH.set(depth as f64);
}

pub fn record_status_update(resource_type: &str, success: bool) {
    let result = if success { "success" } else { "error" };
    STATUS_UPDATES_TOTAL
        .with_label_values(&[resource_type, result])
        .inc();
}

/// Record one admin API call
///
/// # Arguments
/// * `object_kind` - Admin path segment (`routes`, `upstreams`, ...)
/// * `operation` - `put`, `delete` or `list`
/// * `success` - Whether the call eventually succeeded
/// * `duration` - Time spent including retries
pub fn record_admin_operation(object_kind: &str, operation: &str, success: bool, duration: Duration) {
    let result = if success { "success" } else { "error" };
    ADMIN_OPERATIONS_TOTAL
        .with_label_values(&[object_kind, operation, result])
        .inc();
    ADMIN_OPERATION_DURATION_SECONDS
        .with_label_values(&[operation])
        .observe(duration.as_secs_f64());
}

#[allow(clippy::cast_precision_loss)]
pub fn set_synced_objects(gateway_group: &str, object_kind: &str, count: usize) {
    SYNCED_OBJECTS
        .with_label_values(&[gateway_group, object_kind])
        .set(count as f64);
}

pub fn record_orphan_deleted(gateway_group: &str, object_kind: &str) {
    ORPHANS_DELETED_TOTAL
        .with_label_values(&[gateway_group, object_kind])
        .inc();
}

pub fn record_watch_event(resource_type: &str, event: &str) {
    WATCH_EVENTS_TOTAL
        .with_label_values(&[resource_type, event])
        .inc();
}

pub fn record_leader_elected(pod_name: &str) {
    LEADER_ELECTIONS_TOTAL
        .with_label_values(&["acquired"])
        .inc();
    LEADER_STATUS.with_label_values(&[pod_name]).set(1.0);
}

pub fn record_leader_lost(pod_name: &str) {
    LEADER_ELECTIONS_TOTAL.with_label_values(&["lost"]).inc();
    LEADER_STATUS.with_label_values(&[pod_name]).set(0.0);
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

#[cfg(test)]
#[path = "metrics_tests.rs"]
mod metrics_tests;
