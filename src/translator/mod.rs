// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Root object → desired data-plane objects.
//!
//! Translation is a pure function of the cached cluster state: it never calls
//! the API server or the admin API and never blocks. A root either translates
//! completely or fails with a [`TranslationError`]; partial output is never
//! returned, so a misconfigured object keeps its previously synced objects.
//!
//! | Root | Produces |
//! |------|----------|
//! | `HTTPRoute`, `GRPCRoute`, `Ingress`, `ApisixRoute` | routes, upstreams, SSLs, stream routes |
//! | `TCPRoute`, `UDPRoute`, `TLSRoute` | stream routes, upstreams |
//! | `Gateway` | listener SSLs |
//! | `GatewayProxy`, `ApisixClusterConfig` | global rules, plugin metadata |
//! | `ApisixTls`, `ApisixConsumer`, `ApisixPluginConfig` | SSL, consumer, plugin config |

pub mod apisix_resources;
pub mod apisix_route;
pub mod backends;
pub mod filters;
pub mod gateway;
pub mod grpcroute;
pub mod httproute;
pub mod ingress;
pub mod matching;
pub mod stream;

use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
use crate::crd::{
    ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls, GRPCRoute,
    Gateway, GatewayProxy, HTTPRoute, ParentReference, TCPRoute, TLSRoute, UDPRoute,
    UpstreamTimeout,
};
use crate::dataplane::{DesiredObject, ObjectKind, PluginMap, PluginRegistry, Timeout};
use crate::duration::parse_duration;
use crate::errors::{TranslationError, TranslationReason};
use crate::router::{GatewayGroup, GroupRouter, ParentAttachment};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::api::networking::v1::Ingress;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Read-only inputs of one translation.
pub struct TranslateContext<'a> {
    pub cache: &'a ResourceCache,
    pub router: &'a GroupRouter,
    pub group: &'a GatewayGroup,
    pub registry: &'a PluginRegistry,
}

impl TranslateContext<'_> {
    /// Parents of a route that resolve to the group being translated.
    #[must_use]
    pub fn group_attachments(
        &self,
        route_namespace: &str,
        parent_refs: &[ParentReference],
    ) -> Vec<ParentAttachment> {
        self.router
            .attached_gateways(route_namespace, parent_refs)
            .into_iter()
            .filter(|attachment| {
                matches!(
                    self.router.resolve_gateway(&attachment.gateway),
                    Ok(Some(group)) if group.id == self.group.id
                )
            })
            .collect()
    }

    /// Validate a scratch plugin map.
    ///
    /// # Errors
    ///
    /// Returns a [`TranslationError`] wrapping the first rejected plugin.
    pub fn plugins(
        &self,
        root: &ObjectKey,
        scratch: BTreeMap<String, Value>,
    ) -> Result<PluginMap, TranslationError> {
        self.registry
            .validate_all(scratch)
            .map_err(|e| TranslationError::new(root, e.into()))
    }

    /// Fetch a `Secret` that a root depends on.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationReason::SecretNotFound`] if it is not cached.
    pub fn secret(
        &self,
        root: &ObjectKey,
        namespace: &str,
        name: &str,
    ) -> Result<std::sync::Arc<Secret>, TranslationError> {
        self.cache.get::<Secret>(namespace, name).ok_or_else(|| {
            TranslationError::new(
                root,
                TranslationReason::SecretNotFound {
                    namespace: namespace.to_string(),
                    name: name.to_string(),
                },
            )
        })
    }
}

/// Translate one root object for one gateway group.
///
/// A root missing from the cache translates to nothing.
///
/// # Errors
///
/// Returns [`TranslationError`] if any part of the root cannot be translated.
pub fn translate(
    root: &ObjectKey,
    ctx: &TranslateContext<'_>,
) -> Result<Vec<DesiredObject>, TranslationError> {
    let mut out = Translation::new(root, &ctx.group.id);
    let ns = root.namespace.as_str();
    let name = root.name.as_str();
    match root.kind {
        ResourceKind::HTTPRoute => {
            if let Some(route) = ctx.cache.get::<HTTPRoute>(ns, name) {
                httproute::translate_http_route(ctx, root, &route, &mut out)?;
            }
        }
        ResourceKind::GRPCRoute => {
            if let Some(route) = ctx.cache.get::<GRPCRoute>(ns, name) {
                grpcroute::translate_grpc_route(ctx, root, &route, &mut out)?;
            }
        }
        ResourceKind::TCPRoute => {
            if let Some(route) = ctx.cache.get::<TCPRoute>(ns, name) {
                stream::translate_tcp_route(ctx, root, &route, &mut out)?;
            }
        }
        ResourceKind::UDPRoute => {
            if let Some(route) = ctx.cache.get::<UDPRoute>(ns, name) {
                stream::translate_udp_route(ctx, root, &route, &mut out)?;
            }
        }
        ResourceKind::TLSRoute => {
            if let Some(route) = ctx.cache.get::<TLSRoute>(ns, name) {
                stream::translate_tls_route(ctx, root, &route, &mut out)?;
            }
        }
        ResourceKind::Gateway => {
            if let Some(gw) = ctx.cache.get::<Gateway>(ns, name) {
                gateway::translate_gateway(ctx, root, &gw, &mut out)?;
            }
        }
        ResourceKind::GatewayProxy => {
            if let Some(proxy) = ctx.cache.get::<GatewayProxy>(ns, name) {
                gateway::translate_gateway_proxy(ctx, root, &proxy, &mut out)?;
            }
        }
        ResourceKind::Ingress => {
            if let Some(ingress) = ctx.cache.get::<Ingress>(ns, name) {
                ingress::translate_ingress(ctx, root, &ingress, &mut out)?;
            }
        }
        ResourceKind::ApisixRoute => {
            if let Some(route) = ctx.cache.get::<ApisixRoute>(ns, name) {
                apisix_route::translate_apisix_route(ctx, root, &route, &mut out)?;
            }
        }
        ResourceKind::ApisixTls => {
            if let Some(tls) = ctx.cache.get::<ApisixTls>(ns, name) {
                apisix_resources::translate_apisix_tls(ctx, root, &tls, &mut out)?;
            }
        }
        ResourceKind::ApisixConsumer => {
            if let Some(consumer) = ctx.cache.get::<ApisixConsumer>(ns, name) {
                apisix_resources::translate_apisix_consumer(ctx, root, &consumer, &mut out)?;
            }
        }
        ResourceKind::ApisixPluginConfig => {
            if let Some(config) = ctx.cache.get::<ApisixPluginConfig>(ns, name) {
                apisix_resources::translate_apisix_plugin_config(ctx, root, &config, &mut out)?;
            }
        }
        ResourceKind::ApisixClusterConfig => {
            if let Some(config) = ctx.cache.get::<ApisixClusterConfig>(ns, name) {
                apisix_resources::translate_cluster_config(ctx, root, &config, &mut out)?;
            }
        }
        _ => {}
    }
    Ok(out.into_objects())
}

/// Desired objects of one root, deduplicated by `(kind, id)`.
pub struct Translation {
    root: ObjectKey,
    group: String,
    objects: BTreeMap<(ObjectKind, String), DesiredObject>,
}

impl Translation {
    #[must_use]
    pub fn new(root: &ObjectKey, group: &str) -> Self {
        Self {
            root: root.clone(),
            group: group.to_string(),
            objects: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &ObjectKey {
        &self.root
    }

    #[must_use]
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Add an object; a second object with the same identity is dropped.
    pub fn push(&mut self, object: DesiredObject) {
        self.objects
            .entry((object.kind, object.id.clone()))
            .or_insert(object);
    }

    #[must_use]
    pub fn into_objects(self) -> Vec<DesiredObject> {
        self.objects.into_values().collect()
    }
}

// ============================================================================
// Shared Helpers
// ============================================================================

/// Parse a duration field into seconds.
///
/// # Errors
///
/// Returns [`TranslationReason::InvalidField`] for malformed durations.
pub fn seconds(root: &ObjectKey, field: &str, value: &str) -> Result<f64, TranslationError> {
    parse_duration(value)
        .map(|d| d.as_secs_f64())
        .map_err(|e| {
            TranslationError::new(
                root,
                TranslationReason::InvalidField {
                    field: field.to_string(),
                    message: e.to_string(),
                },
            )
        })
}

/// Convert CRD timeouts into a payload timeout; `None` when nothing is set.
///
/// # Errors
///
/// Returns [`TranslationReason::InvalidField`] for malformed durations.
pub fn timeout(root: &ObjectKey, value: &UpstreamTimeout) -> Result<Option<Timeout>, TranslationError> {
    let parse = |field: &str, raw: &Option<String>| {
        raw.as_deref().map(|v| seconds(root, field, v)).transpose()
    };
    let timeout = Timeout {
        connect: parse("timeout.connect", &value.connect)?,
        send: parse("timeout.send", &value.send)?,
        read: parse("timeout.read", &value.read)?,
    };
    Ok((!timeout.is_empty()).then_some(timeout))
}

/// Every key of a `Secret` as a string-valued JSON map.
#[must_use]
pub fn secret_values(secret: &Secret) -> Map<String, Value> {
    let mut values = Map::new();
    if let Some(data) = &secret.data {
        for (key, bytes) in data {
            values.insert(
                key.clone(),
                Value::String(String::from_utf8_lossy(&bytes.0).into_owned()),
            );
        }
    }
    if let Some(data) = &secret.string_data {
        for (key, value) in data {
            values.insert(key.clone(), Value::String(value.clone()));
        }
    }
    values
}

/// Readable object name `{namespace}_{name}_{suffix}`.
#[must_use]
pub fn object_name(root: &ObjectKey, suffix: &str) -> String {
    if suffix.is_empty() {
        format!("{}_{}", root.namespace, root.name)
    } else {
        format!("{}_{}_{suffix}", root.namespace, root.name)
    }
}
