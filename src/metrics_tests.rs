// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `metrics.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::time::Duration;

    #[test]
    fn test_record_reconciliation_success() {
        record_reconciliation_success("MetricsTestRoute", Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&["MetricsTestRoute", "success"]);
        assert!(counter.get() > 0.0);
        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&["MetricsTestRoute"]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn test_record_requeue_counts_reason() {
        record_reconciliation_requeue("MetricsTestIngress", "group_unavailable");
        let counter = REQUEUE_TOTAL.with_label_values(&["MetricsTestIngress", "group_unavailable"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_record_admin_operation() {
        record_admin_operation("metrics_test_routes", "put", false, Duration::from_millis(20));
        let counter =
            ADMIN_OPERATIONS_TOTAL.with_label_values(&["metrics_test_routes", "put", "error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn test_synced_objects_gauge_is_set_not_added() {
        set_synced_objects("metrics-test-group", "routes", 5);
        set_synced_objects("metrics-test-group", "routes", 3);
        let gauge = SYNCED_OBJECTS.with_label_values(&["metrics-test-group", "routes"]);
        assert!((gauge.get() - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_gather_metrics() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));
        let text = gather_metrics().unwrap();
        assert!(text.contains("apisix_ingress_reconciliations_total"));
    }
}
