// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Backends: upstream identity, node resolution, settings overlay and
//! weighted traffic splitting.
//!
//! Exactly one upstream exists per `(Service, port, subset, granularity)` in a
//! group; every route that references the same tuple shares it by id.

use super::{timeout, TranslateContext, Translation};
use crate::cache::ObjectKey;
use crate::constants::{DEFAULT_NODE_WEIGHT, ENDPOINT_SLICE_SERVICE_LABEL, NO_BACKEND_STATUS_CODE};
use crate::crd::{
    ApisixUpstream, ApisixUpstreamConfig, BackendTrafficPolicy, LoadBalancer, ResolveGranularity,
    UpstreamTimeout,
};
use crate::dataplane::id::object_id;
use crate::dataplane::{source_labels, DesiredObject, Payload, UpstreamNode, UpstreamPayload};
use crate::errors::{TranslationError, TranslationReason};
use k8s_openapi::api::core::v1::{Pod, Service, ServicePort};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::ResourceExt;
use serde_json::{json, Value};

/// How a backend names its service port.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortRef {
    Number(i32),
    Name(String),
}

impl From<&IntOrString> for PortRef {
    fn from(value: &IntOrString) -> Self {
        match value {
            IntOrString::Int(n) => Self::Number(*n),
            IntOrString::String(s) => Self::Name(s.clone()),
        }
    }
}

/// A backend reference before resolution.
#[derive(Clone, Debug)]
pub struct BackendSpec {
    pub namespace: String,
    pub service: String,
    pub port: PortRef,
    pub subset: Option<String>,
    pub granularity: ResolveGranularity,
    /// gRPC backends default to the `grpc` scheme and get their own upstream
    pub grpc: bool,
}

/// Identity of one shared upstream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpstreamIdentity {
    pub namespace: String,
    pub service: String,
    pub port: i32,
    pub subset: Option<String>,
    pub granularity: ResolveGranularity,
    pub grpc: bool,
}

impl UpstreamIdentity {
    #[must_use]
    pub fn id(&self) -> String {
        let port = self.port.to_string();
        let granularity = match self.granularity {
            ResolveGranularity::Endpoint => "endpoint",
            ResolveGranularity::Service => "service",
        };
        object_id(&[
            "Service",
            &self.namespace,
            &self.service,
            &port,
            self.subset.as_deref().unwrap_or_default(),
            granularity,
            if self.grpc { "grpc" } else { "" },
        ])
    }

    #[must_use]
    pub fn name(&self) -> String {
        let mut name = format!("{}_{}_{}", self.namespace, self.service, self.port);
        if let Some(subset) = &self.subset {
            name.push('_');
            name.push_str(subset);
        }
        if self.granularity == ResolveGranularity::Service {
            name.push_str("_service");
        }
        name
    }
}

fn service_not_found(root: &ObjectKey, spec: &BackendSpec) -> TranslationError {
    TranslationError::new(
        root,
        TranslationReason::ServiceNotFound {
            namespace: spec.namespace.clone(),
            name: spec.service.clone(),
        },
    )
}

fn find_port<'a>(service: &'a Service, port: &PortRef) -> Option<&'a ServicePort> {
    let ports = service.spec.as_ref()?.ports.as_ref()?;
    match port {
        PortRef::Number(n) => ports.iter().find(|p| p.port == *n),
        PortRef::Name(name) => ports.iter().find(|p| p.name.as_deref() == Some(name.as_str())),
    }
}

/// Resolve a backend into its upstream, pushing the upstream into `out`.
///
/// Returns the upstream id.
///
/// # Errors
///
/// Returns [`TranslationError`] when the service, port or subset does not exist.
pub fn resolve_upstream(
    ctx: &TranslateContext<'_>,
    spec: &BackendSpec,
    out: &mut Translation,
) -> Result<String, TranslationError> {
    let root = out.root().clone();
    let service = ctx
        .cache
        .get::<Service>(&spec.namespace, &spec.service)
        .ok_or_else(|| service_not_found(&root, spec))?;
    let service_spec = service.spec.clone().unwrap_or_default();
    let external_name = (service_spec.type_.as_deref() == Some("ExternalName"))
        .then(|| service_spec.external_name.clone())
        .flatten();

    let service_port = find_port(&service, &spec.port);
    let port_number = match (service_port, &spec.port, &external_name) {
        (Some(port), _, _) => port.port,
        (None, PortRef::Number(n), Some(_)) => *n,
        (None, port, _) => {
            return Err(TranslationError::new(
                &root,
                TranslationReason::ServicePortNotFound {
                    namespace: spec.namespace.clone(),
                    name: spec.service.clone(),
                    port: match port {
                        PortRef::Number(n) => n.to_string(),
                        PortRef::Name(name) => name.clone(),
                    },
                },
            ))
        }
    };

    let identity = UpstreamIdentity {
        namespace: spec.namespace.clone(),
        service: spec.service.clone(),
        port: port_number,
        subset: spec.subset.clone(),
        granularity: spec.granularity,
        grpc: spec.grpc,
    };

    let apisix_upstream = ctx
        .cache
        .get::<ApisixUpstream>(&spec.namespace, &spec.service);
    let subset_labels = match &spec.subset {
        Some(subset) => {
            let labels = apisix_upstream
                .as_ref()
                .and_then(|au| au.spec.subsets.iter().find(|s| s.name == *subset))
                .map(|s| s.labels.clone());
            match labels {
                Some(labels) => Some(labels),
                None => {
                    return Err(TranslationError::new(
                        &root,
                        TranslationReason::SubsetNotFound {
                            namespace: spec.namespace.clone(),
                            name: spec.service.clone(),
                            subset: subset.clone(),
                        },
                    ))
                }
            }
        }
        None => None,
    };

    let mut nodes = match &external_name {
        Some(host) => vec![UpstreamNode {
            host: host.clone(),
            port: port_number,
            weight: DEFAULT_NODE_WEIGHT,
        }],
        None => {
            let cluster_ip = service_spec
                .cluster_ip
                .clone()
                .filter(|ip| !ip.is_empty() && ip != "None");
            match (spec.granularity, cluster_ip, &subset_labels) {
                (ResolveGranularity::Service, Some(ip), None) => vec![UpstreamNode {
                    host: ip,
                    port: port_number,
                    weight: DEFAULT_NODE_WEIGHT,
                }],
                _ => endpoint_nodes(ctx, spec, service_port, subset_labels.as_ref()),
            }
        }
    };
    nodes.sort();
    nodes.dedup();

    let mut payload = UpstreamPayload {
        id: identity.id(),
        name: identity.name(),
        labels: source_labels("Service", &spec.namespace, &spec.service),
        nodes,
        ..UpstreamPayload::default()
    };

    for policy in ctx.cache.list_namespaced::<BackendTrafficPolicy>(&spec.namespace) {
        let targets_service = policy.spec.target_refs.iter().any(|t| {
            t.group.is_empty()
                && t.kind == "Service"
                && t.name == spec.service
                && t.section_name.as_ref().is_none_or(|section| {
                    service_port.and_then(|p| p.name.as_ref()) == Some(section)
                })
        });
        if targets_service {
            let config = ApisixUpstreamConfig {
                scheme: policy.spec.scheme.clone(),
                load_balancer: policy.spec.load_balancer.clone(),
                retries: policy.spec.retries,
                timeout: policy.spec.timeout.clone(),
                health_check: None,
                pass_host: policy.spec.pass_host.clone(),
                upstream_host: policy.spec.upstream_host.clone(),
            };
            overlay(&root, &mut payload, &config)?;
        }
    }
    if let Some(au) = &apisix_upstream {
        overlay(&root, &mut payload, &au.spec.config)?;
        if let Some(settings) = au
            .spec
            .port_level_settings
            .iter()
            .find(|s| s.port == port_number)
        {
            overlay(&root, &mut payload, &settings.config)?;
        }
    }
    if payload.scheme.is_none() {
        payload.scheme = service_port
            .and_then(|p| p.app_protocol.as_deref())
            .and_then(scheme_for_app_protocol)
            .or(spec.grpc.then(|| "grpc".to_string()));
    }

    let id = payload.id.clone();
    out.push(DesiredObject::new(
        id.clone(),
        out.group(),
        Payload::Upstream(payload),
        &root,
    ));
    Ok(id)
}

fn endpoint_nodes(
    ctx: &TranslateContext<'_>,
    spec: &BackendSpec,
    service_port: Option<&ServicePort>,
    subset_labels: Option<&std::collections::BTreeMap<String, String>>,
) -> Vec<UpstreamNode> {
    let port_name = service_port.and_then(|p| p.name.clone()).unwrap_or_default();
    let mut nodes = Vec::new();
    for slice in ctx.cache.list_namespaced::<EndpointSlice>(&spec.namespace) {
        if slice.labels().get(ENDPOINT_SLICE_SERVICE_LABEL) != Some(&spec.service) {
            continue;
        }
        let Some(port) = slice
            .ports
            .as_ref()
            .and_then(|ports| {
                ports
                    .iter()
                    .find(|p| p.name.clone().unwrap_or_default() == port_name)
            })
            .and_then(|p| p.port)
        else {
            continue;
        };
        for endpoint in &slice.endpoints {
            let ready = endpoint
                .conditions
                .as_ref()
                .and_then(|c| c.ready)
                .unwrap_or(true);
            if !ready {
                continue;
            }
            if let Some(labels) = subset_labels {
                let pod_labels = endpoint
                    .target_ref
                    .as_ref()
                    .filter(|r| r.kind.as_deref() == Some("Pod"))
                    .and_then(|r| r.name.as_deref())
                    .and_then(|name| ctx.cache.get::<Pod>(&spec.namespace, name))
                    .map(|pod| pod.labels().clone());
                let matches = pod_labels.is_some_and(|pod_labels| {
                    labels.iter().all(|(k, v)| pod_labels.get(k) == Some(v))
                });
                if !matches {
                    continue;
                }
            }
            for address in &endpoint.addresses {
                nodes.push(UpstreamNode {
                    host: address.clone(),
                    port,
                    weight: DEFAULT_NODE_WEIGHT,
                });
            }
        }
    }
    nodes
}

fn scheme_for_app_protocol(app_protocol: &str) -> Option<String> {
    match app_protocol {
        "http" | "https" | "grpc" | "grpcs" | "tcp" | "udp" | "tls" => Some(app_protocol.to_string()),
        "kubernetes.io/h2c" => Some("grpc".to_string()),
        "kubernetes.io/ws" => Some("http".to_string()),
        "kubernetes.io/wss" => Some("https".to_string()),
        _ => None,
    }
}

fn overlay(
    root: &ObjectKey,
    payload: &mut UpstreamPayload,
    config: &ApisixUpstreamConfig,
) -> Result<(), TranslationError> {
    if let Some(scheme) = &config.scheme {
        payload.scheme = Some(scheme.clone());
    }
    if let Some(LoadBalancer { r#type, hash_on, key }) = &config.load_balancer {
        payload.lb_type = Some(r#type.clone());
        payload.hash_on = hash_on.clone();
        payload.key = key.clone();
    }
    if let Some(retries) = config.retries {
        payload.retries = Some(retries);
    }
    if let Some(value) = &config.timeout {
        if let Some(parsed) = timeout(root, value)? {
            payload.timeout = Some(parsed);
        }
    }
    if let Some(checks) = &config.health_check {
        payload.checks = Some(checks.clone());
    }
    if let Some(pass_host) = &config.pass_host {
        payload.pass_host = Some(pass_host.clone());
    }
    if let Some(upstream_host) = &config.upstream_host {
        payload.upstream_host = Some(upstream_host.clone());
    }
    Ok(())
}

/// The same timeout for connect, send and read.
#[must_use]
pub fn uniform_timeout(value: &str) -> UpstreamTimeout {
    UpstreamTimeout {
        connect: Some(value.to_string()),
        send: Some(value.to_string()),
        read: Some(value.to_string()),
    }
}

// ============================================================================
// Weighted Backends
// ============================================================================

/// A resolved backend and its traffic weight.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedUpstream {
    pub upstream_id: String,
    pub weight: i32,
}

/// `traffic-split` configuration for more than one backend.
///
/// The first backend is the route's own upstream and appears as the entry
/// without `upstream_id`. Zero weights stay listed.
#[must_use]
pub fn traffic_split(backends: &[WeightedUpstream]) -> Option<Value> {
    let (first, rest) = backends.split_first()?;
    if rest.is_empty() {
        return None;
    }
    let mut weighted: Vec<Value> = rest
        .iter()
        .map(|b| json!({"upstream_id": b.upstream_id, "weight": b.weight}))
        .collect();
    weighted.push(json!({"weight": first.weight}));
    Some(json!({"rules": [{"weighted_upstreams": weighted}]}))
}

/// Plugin answering every request with 500 when a rule has no usable backend.
#[must_use]
pub fn no_backend_abort() -> Value {
    json!({"abort": {"http_status": NO_BACKEND_STATUS_CODE}})
}

/// Whether traffic can reach any backend.
#[must_use]
pub fn has_live_backend(backends: &[WeightedUpstream]) -> bool {
    backends.iter().any(|b| b.weight > 0)
}

#[cfg(test)]
#[path = "backends_tests.rs"]
mod backends_tests;
