// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data-plane admin API client.
//!
//! [`AdminApi`] is the seam between the sync executor and a data plane. The
//! production implementation is [`HttpAdminClient`]; [`MemoryAdmin`] keeps
//! objects in memory and counts calls so the executor and engine can be
//! exercised without a data plane.
//!
//! Every call is idempotent: `put` creates or replaces the object with the
//! given id, `delete` of a missing object succeeds.

pub mod http;
pub mod memory;

pub use http::HttpAdminClient;
pub use memory::MemoryAdmin;

use crate::constants::ADMIN_API_PREFIX;
use crate::dataplane::ObjectKind;
use crate::errors::AdminApiError;
use crate::router::GatewayGroup;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

/// An object as listed by the admin API.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteObject {
    pub id: String,
    pub labels: BTreeMap<String, String>,
    pub value: Value,
}

/// Idempotent operations against the admin API of one gateway group.
#[async_trait]
pub trait AdminApi: Send + Sync {
    /// Create or replace `kind/id` with `body`.
    async fn put(
        &self,
        group: &GatewayGroup,
        kind: ObjectKind,
        id: &str,
        body: &Value,
    ) -> Result<(), AdminApiError>;

    /// Delete `kind/id`; a missing object is not an error.
    async fn delete(&self, group: &GatewayGroup, kind: ObjectKind, id: &str)
        -> Result<(), AdminApiError>;

    /// Every object of `kind` currently held by the data plane.
    async fn list(&self, group: &GatewayGroup, kind: ObjectKind)
        -> Result<Vec<RemoteObject>, AdminApiError>;
}

/// URL of the collection of `kind` under `endpoint`.
#[must_use]
pub fn collection_url(endpoint: &str, kind: ObjectKind) -> String {
    format!(
        "{}{ADMIN_API_PREFIX}/{}",
        endpoint.trim_end_matches('/'),
        kind.admin_path()
    )
}

/// URL of one object under `endpoint`.
#[must_use]
pub fn object_url(endpoint: &str, kind: ObjectKind, id: &str) -> String {
    format!("{}/{id}", collection_url(endpoint, kind))
}

/// Decode a list response.
///
/// The admin API answers `{"total": n, "list": [{"key": ..., "value": {...}}]}`;
/// an empty collection may come back as `{}` or `{"list": {}}`. The id is taken
/// from `value.id`, then `value.username` for consumers, then the last segment
/// of `key`.
///
/// # Errors
///
/// Returns [`AdminApiError::Decode`] when an entry carries no usable id.
pub fn parse_list(body: &Value) -> Result<Vec<RemoteObject>, AdminApiError> {
    let Some(entries) = body.get("list").and_then(Value::as_array) else {
        return Ok(Vec::new());
    };

    entries
        .iter()
        .map(|entry| {
            let value = entry.get("value").cloned().unwrap_or(Value::Null);
            let id = value
                .get("id")
                .and_then(id_string)
                .or_else(|| value.get("username").and_then(id_string))
                .or_else(|| {
                    entry
                        .get("key")
                        .and_then(Value::as_str)
                        .and_then(|key| key.rsplit('/').next())
                        .filter(|segment| !segment.is_empty())
                        .map(str::to_string)
                })
                .ok_or_else(|| AdminApiError::Decode(format!("list entry without id: {entry}")))?;
            let labels = value
                .get("labels")
                .and_then(Value::as_object)
                .map(|labels| {
                    labels
                        .iter()
                        .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                        .collect()
                })
                .unwrap_or_default();
            Ok(RemoteObject { id, labels, value })
        })
        .collect()
}

/// Ids are strings in current data planes but integers in older ones.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod mod_tests;
