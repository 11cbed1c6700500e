// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `apisix.apache.org/v1alpha1` policy and infrastructure resources.

use super::{ApisixStatus, Condition, LoadBalancer, ParentReference, UpstreamTimeout};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A plugin entry of a `PluginConfig` or `GatewayProxy`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPlugin {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
}

fn default_enabled() -> bool {
    true
}

// ============================================================================
// PluginConfig
// ============================================================================

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v1alpha1",
    kind = "PluginConfig",
    namespaced,
    doc = "PluginConfig is a plugin set referenced by Gateway API ExtensionRef filters."
)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfigSpec {
    #[serde(default)]
    pub plugins: Vec<PolicyPlugin>,
}

// ============================================================================
// Policy Attachment
// ============================================================================

/// Target of a policy: a route (optionally one named rule) or a `Service` port.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyTargetReference {
    #[serde(default)]
    pub group: String,
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_name: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyAncestorStatus {
    pub ancestor_ref: ParentReference,
    pub controller_name: String,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    #[serde(default)]
    pub ancestors: Vec<PolicyAncestorStatus>,
}

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v1alpha1",
    kind = "HTTPRoutePolicy",
    namespaced,
    doc = "HTTPRoutePolicy adds match conditions and a priority to the routes it targets."
)]
#[kube(status = "PolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct HTTPRoutePolicySpec {
    pub target_refs: Vec<PolicyTargetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    /// Data-plane `vars` expressions appended to the targeted routes
    #[serde(default)]
    pub vars: Vec<Vec<Value>>,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v1alpha1",
    kind = "BackendTrafficPolicy",
    namespaced,
    doc = "BackendTrafficPolicy sets upstream behaviour for the Services it targets."
)]
#[kube(status = "PolicyStatus")]
#[serde(rename_all = "camelCase")]
pub struct BackendTrafficPolicySpec {
    pub target_refs: Vec<PolicyTargetReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<UpstreamTimeout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,
}

// ============================================================================
// GatewayProxy
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretKeySelector {
    pub name: String,
    pub key: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminKeyValueFrom {
    pub secret_key_ref: SecretKeySelector,
}

/// Admin key given inline or read from a `Secret` in the proxy's namespace.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminKeyAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_from: Option<AdminKeyValueFrom>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneAuth {
    /// Only `AdminKey` is supported
    #[serde(default)]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_key: Option<AdminKeyAuth>,
}

/// Admin API reached through a `Service` instead of fixed endpoints.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneService {
    pub name: String,
    pub port: i32,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneProvider {
    #[serde(default)]
    pub endpoints: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<ControlPlaneService>,
    #[serde(default)]
    pub auth: ControlPlaneAuth,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct GatewayProxyProvider {
    /// Only `ControlPlane` is supported
    #[serde(default)]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_plane: Option<ControlPlaneProvider>,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v1alpha1",
    kind = "GatewayProxy",
    namespaced,
    doc = "GatewayProxy names the admin API, credentials and global plugins of one data-plane gateway group."
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct GatewayProxySpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<GatewayProxyProvider>,
    #[serde(default)]
    pub plugins: Vec<PolicyPlugin>,
    #[serde(default)]
    pub plugin_metadata: BTreeMap<String, Value>,
}
