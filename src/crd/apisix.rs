// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `apisix.apache.org/v2` custom resources.
//!
//! # Example: Weighted ApisixRoute
//!
//! ```rust,no_run
//! use apisix_ingress::crd::{ApisixRouteBackend, ApisixRouteHttp, ApisixRouteHttpMatch, ApisixRouteSpec};
//! use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
//!
//! let spec = ApisixRouteSpec {
//!     ingress_class_name: Some("apisix".into()),
//!     http: vec![ApisixRouteHttp {
//!         name: "canary".into(),
//!         r#match: ApisixRouteHttpMatch {
//!             paths: vec!["/api/*".into()],
//!             ..Default::default()
//!         },
//!         backends: vec![
//!             ApisixRouteBackend::new("api-v1", IntOrString::Int(80), Some(90)),
//!             ApisixRouteBackend::new("api-v2", IntOrString::Int(80), Some(10)),
//!         ],
//!         ..Default::default()
//!     }],
//!     stream: vec![],
//! };
//! ```

use super::{ApisixStatus, SecretReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// ============================================================================
// ApisixRoute
// ============================================================================

/// Where the subject of a match expression is read from.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub enum ExprScope {
    Header,
    Query,
    Cookie,
    Path,
    Variable,
    PostArg,
}

/// Comparison operator of a match expression.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
pub enum ExprOperator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    In,
    NotIn,
    RegexMatch,
    RegexMatchCaseInsensitive,
    RegexNotMatch,
    RegexNotMatchCaseInsensitive,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExprSubject {
    pub scope: ExprScope,
    #[serde(default)]
    pub name: String,
}

/// One `exprs` entry: `subject op value` or `subject op set`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteExpr {
    pub subject: ExprSubject,
    pub op: ExprOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub set: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteHttpMatch {
    #[serde(default)]
    pub paths: Vec<String>,
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default)]
    pub hosts: Vec<String>,
    #[serde(default)]
    pub remote_addrs: Vec<String>,
    #[serde(default)]
    pub exprs: Vec<ApisixRouteExpr>,
}

/// Upstream timeouts as Go-style duration strings.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamTimeout {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResolveGranularity {
    #[default]
    Endpoint,
    Service,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteBackend {
    pub service_name: String,
    pub service_port: IntOrString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_granularity: Option<ResolveGranularity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
}

impl ApisixRouteBackend {
    #[must_use]
    pub fn new(service_name: &str, service_port: IntOrString, weight: Option<i32>) -> Self {
        Self {
            service_name: service_name.to_string(),
            service_port,
            resolve_granularity: None,
            weight,
            subset: None,
        }
    }
}

/// Plugin attached to an `ApisixRoute` rule.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRoutePlugin {
    pub name: String,
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<Value>,
    /// Secret whose keys are merged into `config`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteAuthKeyAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteAuthentication {
    #[serde(default)]
    pub enable: bool,
    /// `basicAuth`, `keyAuth`, `jwtAuth`, `hmacAuth`, `ldapAuth`
    #[serde(default)]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_auth: Option<ApisixRouteAuthKeyAuth>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteHttp {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<UpstreamTimeout>,
    #[serde(default)]
    pub r#match: ApisixRouteHttpMatch,
    #[serde(default)]
    pub websocket: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin_config_name: Option<String>,
    #[serde(default)]
    pub backends: Vec<ApisixRouteBackend>,
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<ApisixRouteAuthentication>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteStreamMatch {
    pub ingress_port: i32,
    /// SNI matched on TLS-terminated stream routes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteStreamBackend {
    pub service_name: String,
    pub service_port: IntOrString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolve_granularity: Option<ResolveGranularity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subset: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteStream {
    pub name: String,
    /// `TCP` or `UDP`
    pub protocol: String,
    pub r#match: ApisixRouteStreamMatch,
    pub backend: ApisixRouteStreamBackend,
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
}

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixRoute",
    namespaced,
    shortname = "ar",
    doc = "ApisixRoute declares HTTP and stream routes with expression matching and weighted backends.",
    printcolumn = r#"{"name":"Hosts","type":"string","jsonPath":".spec.http[*].match.hosts"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApisixRouteSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub http: Vec<ApisixRouteHttp>,
    #[serde(default)]
    pub stream: Vec<ApisixRouteStream>,
}

// ============================================================================
// ApisixUpstream
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    /// `roundrobin`, `chash`, `ewma` or `least_conn`
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

/// Upstream settings shared by the whole `ApisixUpstream` and its port overrides.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixUpstreamConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_balancer: Option<LoadBalancer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<UpstreamTimeout>,
    /// Passed through to the data plane as `checks`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pass_host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_host: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixUpstreamSubset {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PortLevelSettings {
    pub port: i32,
    #[serde(flatten)]
    pub config: ApisixUpstreamConfig,
}

#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixUpstream",
    namespaced,
    shortname = "au",
    doc = "ApisixUpstream decorates the Service of the same name with upstream settings and subsets."
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApisixUpstreamSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(flatten)]
    pub config: ApisixUpstreamConfig,
    #[serde(default)]
    pub subsets: Vec<ApisixUpstreamSubset>,
    #[serde(default)]
    pub port_level_settings: Vec<PortLevelSettings>,
}

// ============================================================================
// ApisixTls
// ============================================================================

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixMutualTlsClientConfig {
    pub ca_secret: SecretReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i32>,
}

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixTls",
    namespaced,
    shortname = "atls",
    doc = "ApisixTls serves the certificate stored in a Secret for a set of SNIs."
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApisixTlsSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    pub hosts: Vec<String>,
    pub secret: SecretReference,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<ApisixMutualTlsClientConfig>,
}

// ============================================================================
// ApisixConsumer
// ============================================================================

/// One authentication method: inline values or a `Secret` in the same namespace.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixConsumerAuth {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_ref: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub value: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixConsumerAuthParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<ApisixConsumerAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_auth: Option<ApisixConsumerAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwt_auth: Option<ApisixConsumerAuth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hmac_auth: Option<ApisixConsumerAuth>,
}

impl ApisixConsumerAuthParameter {
    /// Configured methods paired with their data-plane plugin names.
    #[must_use]
    pub fn methods(&self) -> Vec<(&'static str, &ApisixConsumerAuth)> {
        [
            ("basic-auth", self.basic_auth.as_ref()),
            ("key-auth", self.key_auth.as_ref()),
            ("jwt-auth", self.jwt_auth.as_ref()),
            ("hmac-auth", self.hmac_auth.as_ref()),
        ]
        .into_iter()
        .filter_map(|(plugin, auth)| auth.map(|auth| (plugin, auth)))
        .collect()
    }
}

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixConsumer",
    namespaced,
    shortname = "ac",
    doc = "ApisixConsumer declares a data-plane consumer and its credentials."
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApisixConsumerSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    pub auth_parameter: ApisixConsumerAuthParameter,
}

// ============================================================================
// ApisixPluginConfig
// ============================================================================

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixPluginConfig",
    namespaced,
    shortname = "apc",
    doc = "ApisixPluginConfig is a reusable set of plugins referenced by routes."
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApisixPluginConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_class_name: Option<String>,
    #[serde(default)]
    pub plugins: Vec<ApisixRoutePlugin>,
}

// ============================================================================
// ApisixClusterConfig
// ============================================================================

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PrometheusConfig {
    #[serde(default)]
    pub enable: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SkywalkingConfig {
    #[serde(default)]
    pub enable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_ratio: Option<f64>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMonitoring {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prometheus: Option<PrometheusConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skywalking: Option<SkywalkingConfig>,
}

#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "apisix.apache.org",
    version = "v2",
    kind = "ApisixClusterConfig",
    shortname = "acc",
    doc = "ApisixClusterConfig enables cluster-wide monitoring plugins on the default gateway group."
)]
#[kube(status = "ApisixStatus")]
#[serde(rename_all = "camelCase")]
pub struct ApisixClusterConfigSpec {
    #[serde(default)]
    pub monitoring: ClusterMonitoring,
}
