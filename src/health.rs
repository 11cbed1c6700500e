// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Probe and metrics endpoints.
//!
//! - `/healthz` answers as long as the process runs
//! - `/readyz` answers 200 once every watched kind finished its first list
//! - `/metrics` serves the Prometheus registry

use crate::cache::ResourceCache;
use crate::metrics::gather_metrics;
use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info};

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(cache): State<Arc<ResourceCache>>) -> Response {
    if cache.is_ready() {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "cache not synced").into_response()
    }
}

async fn metrics_handler() -> Response {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

pub fn router(cache: Arc<ResourceCache>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(cache)
}

/// Serve the probe endpoints on `bind_address` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve<F>(bind_address: &str, cache: Arc<ResourceCache>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("failed to bind health server to {bind_address}"))?;
    info!(address = %bind_address, "Starting health and metrics server");
    axum::serve(listener, router(cache))
        .with_graceful_shutdown(shutdown)
        .await
        .context("health server failed")
}

#[cfg(test)]
#[path = "health_tests.rs"]
mod health_tests;
