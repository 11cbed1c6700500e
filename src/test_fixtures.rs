// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Builders for Kubernetes objects shared by unit tests.

use crate::cache::{ObjectKey, ResourceCache};
use crate::errors::StatusError;
use crate::status::StatusWriter;
use async_trait::async_trait;
use crate::config::OperatingMode;
use crate::crd::{ApisixRoute, Gateway, GatewayClass, GatewayProxy, HTTPRoute};
use crate::dataplane::{DesiredObject, ObjectKind, Payload, PluginRegistry, RoutePayload};
use crate::errors::TranslationError;
use crate::router::{GatewayGroup, GroupRouter, RouterSettings};
use crate::translator::{translate, TranslateContext};
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};

pub const CONTROLLER: &str = "apisix.apache.org/apisix-ingress-controller";

pub fn object<K: DeserializeOwned>(value: Value) -> K {
    serde_json::from_value(value).expect("fixture must deserialize")
}

fn metadata(namespace: &str, name: &str) -> Value {
    json!({
        "name": name,
        "namespace": namespace,
        "generation": 1,
        "creationTimestamp": "2025-01-01T00:00:00Z",
    })
}

/// `ClusterIP` service; ports are `(name, port, targetPort)`.
pub fn service(namespace: &str, name: &str, ports: &[(&str, i32, i32)]) -> Service {
    let ports: Vec<Value> = ports
        .iter()
        .map(|(port_name, port, target)| {
            json!({"name": port_name, "port": port, "targetPort": target, "protocol": "TCP"})
        })
        .collect();
    object(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata(namespace, name),
        "spec": {"clusterIP": "10.96.0.10", "ports": ports},
    }))
}

/// Endpoint slice of `service`; endpoints are `(ip, ready, pod name)`.
pub fn endpoint_slice(
    namespace: &str,
    name: &str,
    service: &str,
    ports: &[(&str, i32)],
    endpoints: &[(&str, bool, &str)],
) -> EndpointSlice {
    let ports: Vec<Value> = ports
        .iter()
        .map(|(port_name, port)| json!({"name": port_name, "port": port, "protocol": "TCP"}))
        .collect();
    let endpoints: Vec<Value> = endpoints
        .iter()
        .map(|(ip, ready, pod)| {
            json!({
                "addresses": [ip],
                "conditions": {"ready": ready},
                "targetRef": {"kind": "Pod", "namespace": namespace, "name": pod},
            })
        })
        .collect();
    let mut meta = metadata(namespace, name);
    meta["labels"] = json!({"kubernetes.io/service-name": service});
    object(json!({
        "apiVersion": "discovery.k8s.io/v1",
        "kind": "EndpointSlice",
        "metadata": meta,
        "addressType": "IPv4",
        "ports": ports,
        "endpoints": endpoints,
    }))
}

pub fn pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    let mut meta = metadata(namespace, name);
    meta["labels"] = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), json!(v)))
        .collect::<serde_json::Map<_, _>>()
        .into();
    object(json!({"apiVersion": "v1", "kind": "Pod", "metadata": meta}))
}

/// Secret with plain-text values (encoded as the API server would).
pub fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    let mut secret: Secret = object(json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": metadata(namespace, name),
    }));
    secret.data = Some(
        data.iter()
            .map(|(k, v)| ((*k).to_string(), k8s_openapi::ByteString(v.as_bytes().to_vec())))
            .collect(),
    );
    secret
}

pub fn ingress_class(name: &str, params: Option<(&str, &str)>) -> IngressClass {
    let mut spec = json!({"controller": CONTROLLER});
    if let Some((namespace, proxy)) = params {
        spec["parameters"] = json!({
            "apiGroup": "apisix.apache.org",
            "kind": "GatewayProxy",
            "name": proxy,
            "namespace": namespace,
            "scope": "Namespace",
        });
    }
    object(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "IngressClass",
        "metadata": {"name": name, "generation": 1},
        "spec": spec,
    }))
}

pub fn ingress(namespace: &str, name: &str, class: &str, spec_rules: Value) -> Ingress {
    object(json!({
        "apiVersion": "networking.k8s.io/v1",
        "kind": "Ingress",
        "metadata": metadata(namespace, name),
        "spec": {"ingressClassName": class, "rules": spec_rules},
    }))
}

pub fn gateway_class(name: &str) -> GatewayClass {
    object(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": {"name": name, "generation": 1},
        "spec": {"controllerName": CONTROLLER},
    }))
}

/// Gateway with one HTTP listener on port 80, optionally bound to a `GatewayProxy`.
pub fn gateway(namespace: &str, name: &str, class: &str, proxy: Option<&str>) -> Gateway {
    let mut spec = json!({
        "gatewayClassName": class,
        "listeners": [{"name": "http", "port": 80, "protocol": "HTTP",
                       "allowedRoutes": {"namespaces": {"from": "All"}}}],
    });
    if let Some(proxy) = proxy {
        spec["infrastructure"] = json!({
            "parametersRef": {"group": "apisix.apache.org", "kind": "GatewayProxy", "name": proxy}
        });
    }
    object(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "Gateway",
        "metadata": metadata(namespace, name),
        "spec": spec,
    }))
}

pub fn gateway_proxy(namespace: &str, name: &str, endpoints: &[&str], key: &str) -> GatewayProxy {
    object(json!({
        "apiVersion": "apisix.apache.org/v1alpha1",
        "kind": "GatewayProxy",
        "metadata": metadata(namespace, name),
        "spec": {
            "provider": {
                "type": "ControlPlane",
                "controlPlane": {
                    "endpoints": endpoints,
                    "auth": {"type": "AdminKey", "adminKey": {"value": key}},
                },
            },
        },
    }))
}

pub fn http_route(namespace: &str, name: &str, spec: Value) -> HTTPRoute {
    object(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": metadata(namespace, name),
        "spec": spec,
    }))
}

pub fn apisix_route(namespace: &str, name: &str, spec: Value) -> ApisixRoute {
    object(json!({
        "apiVersion": "apisix.apache.org/v2",
        "kind": "ApisixRoute",
        "metadata": metadata(namespace, name),
        "spec": spec,
    }))
}

// ============================================================================
// Translation Harness
// ============================================================================

/// The statically configured gateway group.
pub fn default_group() -> GatewayGroup {
    GatewayGroup {
        id: "default".into(),
        endpoints: vec!["http://apisix-admin:9180".into()],
        admin_key: Some("edd1c9f034335f136f87ad84b625c8f1".into()),
        proxy: None,
    }
}

/// Cache, router and plugin registry wired the way the engine wires them.
pub struct Harness {
    pub cache: Arc<ResourceCache>,
    pub router: Arc<GroupRouter>,
    pub group: GatewayGroup,
    pub registry: PluginRegistry,
}

impl Harness {
    pub fn new() -> Self {
        let cache = Arc::new(ResourceCache::new());
        let router = Arc::new(GroupRouter::new(
            cache.clone(),
            RouterSettings {
                controller_name: CONTROLLER.into(),
                ingress_class: "apisix".into(),
                mode: OperatingMode::All,
                default_group: Some(default_group()),
            },
        ));
        Self {
            cache,
            router,
            group: default_group(),
            registry: PluginRegistry::default(),
        }
    }

    /// Translate for another group than the default one.
    pub fn with_group(mut self, group: GatewayGroup) -> Self {
        self.group = group;
        self
    }

    pub fn ctx(&self) -> TranslateContext<'_> {
        TranslateContext {
            cache: &self.cache,
            router: &self.router,
            group: &self.group,
            registry: &self.registry,
        }
    }

    pub fn translate(&self, root: &ObjectKey) -> Result<Vec<DesiredObject>, TranslationError> {
        translate(root, &self.ctx())
    }

    /// A gateway class and an HTTP gateway `default/gw` owned by this controller.
    pub fn with_gateway(self) -> Self {
        self.cache.apply(gateway_class("apisix"));
        self.cache.apply(gateway("default", "gw", "apisix", None));
        self
    }

    /// Service `default/{name}` port 80 backed by two ready endpoints.
    pub fn with_backend(self, name: &str) -> Self {
        let (pod_a, pod_b) = (format!("{name}-a"), format!("{name}-b"));
        self.cache.apply(service("default", name, &[("http", 80, 8080)]));
        self.cache.apply(endpoint_slice(
            "default",
            &format!("{name}-1"),
            name,
            &[("http", 8080)],
            &[("10.0.1.1", true, pod_a.as_str()), ("10.0.1.2", true, pod_b.as_str())],
        ));
        self
    }
}

/// Route payloads of a translation, in id order.
pub fn routes(objects: &[DesiredObject]) -> Vec<&RoutePayload> {
    objects
        .iter()
        .filter_map(|o| match &o.payload {
            Payload::Route(route) => Some(route),
            _ => None,
        })
        .collect()
}

pub fn count(objects: &[DesiredObject], kind: ObjectKind) -> usize {
    objects.iter().filter(|o| o.kind == kind).count()
}

// ============================================================================
// Status
// ============================================================================

/// [`StatusWriter`] that keeps every patch in memory.
#[derive(Default)]
pub struct RecordingStatusWriter {
    patches: Mutex<Vec<(ObjectKey, Value)>>,
    failing: Mutex<bool>,
}

impl RecordingStatusWriter {
    pub fn patches(&self) -> Vec<(ObjectKey, Value)> {
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent status written for `key`.
    pub fn last(&self, key: &ObjectKey) -> Option<Value> {
        self.patches()
            .into_iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, status)| status)
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }
}

#[async_trait]
impl StatusWriter for RecordingStatusWriter {
    async fn patch_status(&self, key: &ObjectKey, status: Value) -> Result<(), StatusError> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StatusError::Patch {
                key: key.clone(),
                message: "injected failure".into(),
            });
        }
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.clone(), status));
        Ok(())
    }
}
