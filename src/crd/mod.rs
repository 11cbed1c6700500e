// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions consumed by the controller.
//!
//! # Resource Types
//!
//! ## APISIX CRDs (`apisix.apache.org/v2`)
//!
//! - [`ApisixRoute`] - HTTP and stream routes with expression matching
//! - [`ApisixUpstream`] - Upstream settings and named subsets for a `Service`
//! - [`ApisixTls`] - Certificates served for a set of SNIs
//! - [`ApisixConsumer`] - Consumers and their credentials
//! - [`ApisixPluginConfig`] - Reusable plugin sets
//! - [`ApisixClusterConfig`] - Cluster-wide monitoring plugins
//!
//! ## Policy CRDs (`apisix.apache.org/v1alpha1`)
//!
//! - [`GatewayProxy`] - Admin endpoint, credentials and global plugins of a gateway group
//! - [`PluginConfig`] - Plugin sets referenced by Gateway API `ExtensionRef` filters
//! - [`HTTPRoutePolicy`] - Extra match conditions and priority attached to routes
//! - [`BackendTrafficPolicy`] - Upstream settings attached to `Service` objects
//!
//! ## Gateway API (`gateway.networking.k8s.io`)
//!
//! [`GatewayClass`], [`Gateway`], [`HTTPRoute`], [`GRPCRoute`], [`TCPRoute`],
//! [`TLSRoute`] and [`UDPRoute`] are modelled here with the subset of fields the
//! translator understands, so the controller does not depend on a separately
//! versioned Gateway API crate.

pub mod apisix;
pub mod gateway;
pub mod policy;

pub use apisix::*;
pub use gateway::*;
pub use policy::*;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Condition represents an observation of a resource's current state.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition, e.g. `Accepted`, `ResolvedRefs`, `Programmed`.
    pub r#type: String,

    /// Status of the condition: True, False, or Unknown.
    pub status: String,

    /// Brief CamelCase reason for the condition's last transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message indicating details about the transition.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Generation of the object the condition was computed from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Last time the condition transitioned from one status to another (RFC3339 format).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<String>,
}

/// Status shared by the APISIX CRDs and `GatewayProxy`.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApisixStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Reference to a `Secret`, optionally in another namespace.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

/// Reference to an object in the same namespace.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocalObjectReference {
    #[serde(default)]
    pub group: String,
    #[serde(default)]
    pub kind: String,
    pub name: String,
}
