// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Data-plane object model.
//!
//! The translator produces [`DesiredObject`]s; the sync executor diffs them
//! against what was last pushed and drives the admin API. Payload structs
//! serialize to exactly the JSON bodies the admin API expects, with absent
//! optional fields omitted so the data plane applies its own defaults.

pub mod id;
pub mod plugins;

pub use plugins::{PluginMap, PluginRegistry, ValidatedPlugin};

use crate::cache::ObjectKey;
use crate::labels::{
    DP_MANAGED_BY, DP_SOURCE_KIND, DP_SOURCE_NAME, DP_SOURCE_NAMESPACE, MANAGED_BY_CONTROLLER,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Identifier of a gateway group (one data-plane cluster).
pub type GroupId = String;

/// Admin API object kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ObjectKind {
    Upstream,
    Ssl,
    PluginConfig,
    Route,
    StreamRoute,
    Consumer,
    GlobalRule,
    PluginMetadata,
}

/// Apply phase of a kind. Dependencies are referenced by id from dependents,
/// so they are created first and deleted last.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Dependency,
    Dependent,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 8] = [
        Self::Upstream,
        Self::Ssl,
        Self::PluginConfig,
        Self::Route,
        Self::StreamRoute,
        Self::Consumer,
        Self::GlobalRule,
        Self::PluginMetadata,
    ];

    /// Path segment under `/apisix/admin`.
    #[must_use]
    pub fn admin_path(self) -> &'static str {
        match self {
            Self::Route => "routes",
            Self::Upstream => "upstreams",
            Self::Ssl => "ssls",
            Self::Consumer => "consumers",
            Self::GlobalRule => "global_rules",
            Self::StreamRoute => "stream_routes",
            Self::PluginConfig => "plugin_configs",
            Self::PluginMetadata => "plugin_metadata",
        }
    }

    #[must_use]
    pub fn phase(self) -> Phase {
        match self {
            Self::Upstream | Self::Ssl | Self::PluginConfig => Phase::Dependency,
            Self::Route
            | Self::StreamRoute
            | Self::Consumer
            | Self::GlobalRule
            | Self::PluginMetadata => Phase::Dependent,
        }
    }

    /// Plugin metadata is addressed by plugin name and cannot be listed.
    #[must_use]
    pub fn is_listable(self) -> bool {
        !matches!(self, Self::PluginMetadata)
    }

    /// Whether objects of this kind carry ownership labels.
    #[must_use]
    pub fn is_labeled(self) -> bool {
        !matches!(self, Self::GlobalRule | Self::PluginMetadata)
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.admin_path())
    }
}

/// Ownership labels for an object produced from `source`.
#[must_use]
pub fn source_labels(kind: &str, namespace: &str, name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (DP_MANAGED_BY.to_string(), MANAGED_BY_CONTROLLER.to_string()),
        (DP_SOURCE_KIND.to_string(), kind.to_string()),
        (DP_SOURCE_NAMESPACE.to_string(), namespace.to_string()),
        (DP_SOURCE_NAME.to_string(), name.to_string()),
    ])
}

/// Ownership labels for an object produced from a watched object.
#[must_use]
pub fn labels_for(key: &ObjectKey) -> BTreeMap<String, String> {
    source_labels(key.kind.as_str(), &key.namespace, &key.name)
}

/// Whether remote labels mark an object as ours.
#[must_use]
pub fn is_managed(labels: &BTreeMap<String, String>) -> bool {
    labels.get(DP_MANAGED_BY).map(String::as_str) == Some(MANAGED_BY_CONTROLLER)
}

// ============================================================================
// Payloads
// ============================================================================

/// Upstream timeouts in seconds.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct Timeout {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connect: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read: Option<f64>,
}

impl Timeout {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connect.is_none() && self.send.is_none() && self.read.is_none()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RoutePayload {
    pub id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub uris: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub methods: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub remote_addrs: Vec<String>,
    /// Each entry is one `[subject, op, value]` expression array
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub vars: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plugin_config_id: Option<String>,
    #[serde(skip_serializing_if = "PluginMap::is_empty")]
    pub plugins: PluginMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_websocket: Option<bool>,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct UpstreamNode {
    pub host: String,
    pub port: i32,
    pub weight: i32,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct UpstreamPayload {
    pub id: String,
    pub name: String,
    pub labels: BTreeMap<String, String>,
    /// Always serialized; an empty list is a valid upstream
    pub nodes: Vec<UpstreamNode>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub lb_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Timeout>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pass_host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SslClient {
    pub ca: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SslPayload {
    pub id: String,
    pub labels: BTreeMap<String, String>,
    pub cert: String,
    pub key: String,
    pub snis: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<SslClient>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ConsumerPayload {
    pub username: String,
    pub labels: BTreeMap<String, String>,
    pub plugins: PluginMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct GlobalRulePayload {
    pub id: String,
    pub plugins: PluginMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct StreamRoutePayload {
    pub id: String,
    pub labels: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_port: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sni: Option<String>,
    pub upstream_id: String,
    #[serde(skip_serializing_if = "PluginMap::is_empty")]
    pub plugins: PluginMap,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PluginConfigPayload {
    pub id: String,
    pub labels: BTreeMap<String, String>,
    pub plugins: PluginMap,
}

/// Body of a desired object.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Payload {
    Route(RoutePayload),
    Upstream(UpstreamPayload),
    Ssl(SslPayload),
    Consumer(ConsumerPayload),
    GlobalRule(GlobalRulePayload),
    StreamRoute(StreamRoutePayload),
    PluginConfig(PluginConfigPayload),
    PluginMetadata(Value),
}

impl Payload {
    #[must_use]
    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::Route(_) => ObjectKind::Route,
            Self::Upstream(_) => ObjectKind::Upstream,
            Self::Ssl(_) => ObjectKind::Ssl,
            Self::Consumer(_) => ObjectKind::Consumer,
            Self::GlobalRule(_) => ObjectKind::GlobalRule,
            Self::StreamRoute(_) => ObjectKind::StreamRoute,
            Self::PluginConfig(_) => ObjectKind::PluginConfig,
            Self::PluginMetadata(_) => ObjectKind::PluginMetadata,
        }
    }
}

/// One object the data plane of `group` should hold.
#[derive(Clone, Debug, PartialEq)]
pub struct DesiredObject {
    pub kind: ObjectKind,
    pub id: String,
    pub group: GroupId,
    pub payload: Payload,
    /// Root objects that require this object
    pub source_refs: BTreeSet<ObjectKey>,
}

impl DesiredObject {
    #[must_use]
    pub fn new(id: String, group: &str, payload: Payload, source: &ObjectKey) -> Self {
        Self {
            kind: payload.kind(),
            id,
            group: group.to_string(),
            payload,
            source_refs: BTreeSet::from([source.clone()]),
        }
    }

    /// JSON body sent to the admin API.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON.
    pub fn body(&self) -> serde_json::Result<Value> {
        serde_json::to_value(&self.payload)
    }
}
