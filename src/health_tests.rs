// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `health.rs`

#[cfg(test)]
mod tests {
    use super::super::{metrics_handler, readyz, serve};
    use crate::cache::{ResourceCache, ResourceKind};
    use crate::metrics;
    use axum::extract::State;
    use axum::http::StatusCode;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_readyz_waits_for_every_expected_kind() {
        let cache = Arc::new(ResourceCache::new());
        cache.expect_kinds(&[ResourceKind::Service, ResourceKind::HTTPRoute]);

        let response = readyz(State(cache.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        cache.mark_synced(ResourceKind::Service);
        let response = readyz(State(cache.clone())).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

        cache.mark_synced(ResourceKind::HTTPRoute);
        let response = readyz(State(cache)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_serves_registry() {
        metrics::record_watch_event("Service", "apply");
        let response = metrics_handler().await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; version=0.0.4; charset=utf-8"
        );
    }

    #[tokio::test]
    async fn test_serve_fails_on_invalid_address() {
        let cache = Arc::new(ResourceCache::new());
        let result = serve("not-an-address", cache, async {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_serve_stops_on_shutdown() {
        let cache = Arc::new(ResourceCache::new());
        let result = serve("127.0.0.1:0", cache, async {}).await;
        assert!(result.is_ok());
    }
}
