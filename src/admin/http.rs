// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP implementation of [`AdminApi`].
//!
//! # Retry Behavior
//!
//! - Each attempt carries the configured per-call timeout
//! - Retries on HTTP 429, 500, 502, 503, 504, timeouts and connection errors
//! - Successive attempts rotate through the endpoints of the gateway group
//! - Fails immediately on other 4xx errors
//! - Gives up after `max_attempts` attempts

use super::{collection_url, object_url, parse_list, AdminApi, RemoteObject};
use crate::config::AdminConfig;
use crate::constants::ADMIN_KEY_HEADER;
use crate::dataplane::ObjectKind;
use crate::errors::AdminApiError;
use crate::metrics::record_admin_operation;
use crate::retry::admin_backoff;
use crate::router::GatewayGroup;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client as HttpClient, Method, StatusCode};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// reqwest-backed admin API client shared by every gateway group.
///
/// The client holds no per-group state: endpoints and the admin key are
/// taken from the [`GatewayGroup`] on each call, so a `GatewayProxy` update
/// takes effect on the next call.
#[derive(Clone, Debug)]
pub struct HttpAdminClient {
    client: HttpClient,
    timeout: Duration,
    max_attempts: u32,
}

impl HttpAdminClient {
    /// Build a client from the admin settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn new(config: &AdminConfig) -> Result<Self> {
        let client = HttpClient::builder()
            .build()
            .context("Failed to build admin API HTTP client")?;
        Ok(Self::with_client(client, config.timeout, config.max_attempts))
    }

    #[must_use]
    pub fn with_client(client: HttpClient, timeout: Duration, max_attempts: u32) -> Self {
        Self {
            client,
            timeout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run one admin call with retry and endpoint failover.
    async fn call(
        &self,
        group: &GatewayGroup,
        method: Method,
        kind: ObjectKind,
        id: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Option<Value>, AdminApiError> {
        if group.endpoints.is_empty() {
            return Err(AdminApiError::NoEndpoints);
        }

        let mut backoff = admin_backoff();
        let start_time = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let endpoint = group
                .endpoints
                .get(attempt as usize % group.endpoints.len())
                .ok_or(AdminApiError::NoEndpoints)?;
            attempt += 1;

            match self
                .send_once(group, endpoint, method.clone(), kind, id, body)
                .await
            {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(
                            group = %group.id,
                            method = %method,
                            kind = %kind,
                            attempt = attempt,
                            elapsed = ?start_time.elapsed(),
                            "Admin API call succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) if !e.is_retryable() => {
                    error!(
                        group = %group.id,
                        method = %method,
                        kind = %kind,
                        id = id.unwrap_or_default(),
                        error = %e,
                        "Non-retryable admin API error, failing immediately"
                    );
                    return Err(e);
                }
                Err(e) if attempt >= self.max_attempts => {
                    error!(
                        group = %group.id,
                        method = %method,
                        kind = %kind,
                        id = id.unwrap_or_default(),
                        attempt = attempt,
                        elapsed = ?start_time.elapsed(),
                        error = %e,
                        "Admin API attempts exhausted, giving up"
                    );
                    return Err(e);
                }
                Err(e) => {
                    let retry_after = backoff.next_backoff().unwrap_or(backoff.policy().max);
                    warn!(
                        group = %group.id,
                        method = %method,
                        kind = %kind,
                        endpoint = %endpoint,
                        attempt = attempt,
                        retry_after = ?retry_after,
                        error = %e,
                        "Retryable admin API error, will retry"
                    );
                    tokio::time::sleep(retry_after).await;
                }
            }
        }
    }

    /// One HTTP exchange without retry.
    async fn send_once(
        &self,
        group: &GatewayGroup,
        endpoint: &str,
        method: Method,
        kind: ObjectKind,
        id: Option<&str>,
        body: Option<&Value>,
    ) -> Result<Option<Value>, AdminApiError> {
        let url = match id {
            Some(id) => object_url(endpoint, kind, id),
            None => collection_url(endpoint, kind),
        };
        debug!(method = %method, url = %url, "Admin API request");

        let mut request = self
            .client
            .request(method.clone(), &url)
            .timeout(self.timeout);
        if let Some(key) = &group.admin_key {
            request = request.header(ADMIN_KEY_HEADER, key);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|e| transport_error(&e))?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            // Deleting a missing object and listing an empty collection both succeed
            if method == Method::DELETE {
                return Ok(None);
            }
            if method == Method::GET && id.is_none() {
                return Ok(Some(Value::Null));
            }
        }

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdminApiError::Http {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        if method == Method::GET {
            let value = response
                .json::<Value>()
                .await
                .map_err(|e| AdminApiError::Decode(e.to_string()))?;
            return Ok(Some(value));
        }
        Ok(None)
    }
}

#[async_trait]
impl AdminApi for HttpAdminClient {
    async fn put(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
        id: &str,
        body: &Value,
    ) -> Result<(), AdminApiError> {
        let start = Instant::now();
        let result = self
            .call(group, Method::PUT, kind, Some(id), Some(body))
            .await
            .map(|_| ());
        record_admin_operation(kind.admin_path(), "put", result.is_ok(), start.elapsed());
        result
    }

    async fn delete(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
        id: &str,
    ) -> Result<(), AdminApiError> {
        let start = Instant::now();
        let result = self
            .call(group, Method::DELETE, kind, Some(id), None)
            .await
            .map(|_| ());
        record_admin_operation(kind.admin_path(), "delete", result.is_ok(), start.elapsed());
        result
    }

    async fn list(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
    ) -> Result<Vec<RemoteObject>, AdminApiError> {
        let start = Instant::now();
        let result = self
            .call(group, Method::GET, kind, None, None)
            .await
            .and_then(|body| parse_list(&body.unwrap_or(Value::Null)));
        record_admin_operation(kind.admin_path(), "list", result.is_ok(), start.elapsed());
        result
    }
}

fn transport_error(err: &reqwest::Error) -> AdminApiError {
    if err.is_timeout() {
        AdminApiError::Timeout
    } else {
        AdminApiError::Connection(err.to_string())
    }
}

/// The admin API reports failures as `{"error_msg": "..."}`.
fn error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("error_msg").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| text.trim().to_string())
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod http_tests;
