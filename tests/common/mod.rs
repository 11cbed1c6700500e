// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common test utilities for integration tests

#![allow(dead_code)]

use apisix_ingress::admin::{AdminApi, MemoryAdmin};
use apisix_ingress::cache::{key_of, CachedKind, ObjectKey, ResourceCache};
use apisix_ingress::config::{ControllerConfig, DefaultGatewayGroupConfig};
use apisix_ingress::crd::{Gateway, GatewayClass, GatewayProxy, HTTPRoute, HTTPRoutePolicy};
use apisix_ingress::engine::Engine;
use apisix_ingress::errors::StatusError;
use apisix_ingress::leader::Lease;
use apisix_ingress::status::StatusWriter;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use kube::{
    api::{Api, DeleteParams, PostParams},
    client::Client,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex, PoisonError};

pub const CONTROLLER: &str = "apisix.apache.org/apisix-ingress-controller";

// ============================================================================
// Cluster helpers
// ============================================================================

/// Get a Kubernetes client or skip the test if not in a cluster
pub async fn get_kube_client_or_skip() -> Option<Client> {
    match Client::try_default().await {
        Ok(client) => Some(client),
        Err(e) => {
            eprintln!("Skipping integration test: not running in Kubernetes cluster: {e}");
            None
        }
    }
}

/// Create a test namespace
pub async fn create_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(client.clone());

    let ns = serde_json::from_value(json!({
        "apiVersion": "v1",
        "kind": "Namespace",
        "metadata": {
            "name": name,
            "labels": {
                "test": "integration",
                "managed-by": "apisix-ingress-test"
            }
        }
    }))?;

    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(Box::new(e)),
    }
}

/// Cleanup test namespace
pub async fn cleanup_test_namespace(
    client: &Client,
    name: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let namespaces: Api<k8s_openapi::api::core::v1::Namespace> = Api::all(client.clone());

    match namespaces.delete(name, &DeleteParams::default()).await {
        Ok(_) => Ok(()),
        Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
        Err(e) => Err(Box::new(e)),
    }
}

// ============================================================================
// Object builders
// ============================================================================

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

pub fn gateway_class(name: &str) -> GatewayClass {
    object(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "GatewayClass",
        "metadata": {"name": name, "generation": 1},
        "spec": {"controllerName": CONTROLLER},
    }))
}

pub fn gateway(namespace: &str, name: &str, proxy: Option<&str>) -> Gateway {
    let mut spec = json!({
        "gatewayClassName": "apisix",
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

pub fn gateway_proxy(namespace: &str, name: &str, endpoint: &str) -> GatewayProxy {
    object(json!({
        "apiVersion": "apisix.apache.org/v1alpha1",
        "kind": "GatewayProxy",
        "metadata": metadata(namespace, name),
        "spec": {
            "provider": {
                "type": "ControlPlane",
                "controlPlane": {
                    "endpoints": [endpoint],
                    "auth": {"type": "AdminKey", "adminKey": {"value": "secret-key"}},
                },
            },
        },
    }))
}

/// Service `name` on port 80 with one ready endpoint.
pub fn backend(cache: &ResourceCache, namespace: &str, name: &str, ip: &str) {
    cache.apply::<Service>(object(json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": metadata(namespace, name),
        "spec": {"clusterIP": "10.96.0.10",
                 "ports": [{"name": "http", "port": 80, "targetPort": 8080, "protocol": "TCP"}]},
    })));
    let mut meta = metadata(namespace, &format!("{name}-1"));
    meta["labels"] = json!({"kubernetes.io/service-name": name});
    cache.apply::<EndpointSlice>(object(json!({
        "apiVersion": "discovery.k8s.io/v1",
        "kind": "EndpointSlice",
        "metadata": meta,
        "addressType": "IPv4",
        "ports": [{"name": "http", "port": 8080, "protocol": "TCP"}],
        "endpoints": [{"addresses": [ip], "conditions": {"ready": true}}],
    })));
}

/// Route attached to `gateway` forwarding `/{name}` to `service`.
pub fn http_route(namespace: &str, name: &str, gateway: &str, service: &str) -> HTTPRoute {
    object(json!({
        "apiVersion": "gateway.networking.k8s.io/v1",
        "kind": "HTTPRoute",
        "metadata": metadata(namespace, name),
        "spec": {
            "parentRefs": [{"name": gateway}],
            "rules": [{
                "matches": [{"path": {"type": "PathPrefix", "value": format!("/{name}")}}],
                "backendRefs": [{"name": service, "port": 80}],
            }],
        },
    }))
}

pub fn http_route_policy(namespace: &str, name: &str, route: &str, priority: i64) -> HTTPRoutePolicy {
    object(json!({
        "apiVersion": "apisix.apache.org/v1alpha1",
        "kind": "HTTPRoutePolicy",
        "metadata": metadata(namespace, name),
        "spec": {
            "targetRefs": [{"group": "gateway.networking.k8s.io", "kind": "HTTPRoute", "name": route}],
            "priority": priority,
            "vars": [["http_x_policy", "==", name]],
        },
    }))
}

// ============================================================================
// Engine harness
// ============================================================================

/// [`StatusWriter`] keeping every patch in memory.
#[derive(Default)]
pub struct RecordingWriter {
    patches: Mutex<Vec<(ObjectKey, Value)>>,
}

impl RecordingWriter {
    pub fn last(&self, key: &ObjectKey) -> Option<Value> {
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, status)| status.clone())
    }
}

#[async_trait]
impl StatusWriter for RecordingWriter {
    async fn patch_status(&self, key: &ObjectKey, status: Value) -> Result<(), StatusError> {
        self.patches
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((key.clone(), status));
        Ok(())
    }
}

pub struct World {
    pub cache: Arc<ResourceCache>,
    pub admin: Arc<MemoryAdmin>,
    pub writer: Arc<RecordingWriter>,
    pub engine: Arc<Engine>,
}

impl World {
    /// Engine against an in-memory data plane with a default gateway group.
    pub fn new() -> Self {
        Self::with_data_plane(|admin| admin as Arc<dyn AdminApi>)
    }

    /// Like [`World::new`], with the engine talking to whatever `wrap` builds
    /// around the in-memory data plane.
    pub fn with_data_plane(wrap: impl FnOnce(Arc<MemoryAdmin>) -> Arc<dyn AdminApi>) -> Self {
        let config = ControllerConfig {
            controller_name: CONTROLLER.into(),
            default_gateway_group: Some(DefaultGatewayGroupConfig {
                endpoints: vec!["http://apisix-admin:9180".into()],
                admin_key: None,
            }),
            ..ControllerConfig::default()
        };
        let cache = Arc::new(ResourceCache::new());
        let admin = Arc::new(MemoryAdmin::new());
        let writer = Arc::new(RecordingWriter::default());
        let engine = Arc::new(Engine::new(
            cache.clone(),
            wrap(admin.clone()),
            writer.clone(),
            Lease::standalone(),
            &config,
        ));
        Self {
            cache,
            admin,
            writer,
            engine,
        }
    }

    /// Apply like a watcher would.
    pub fn apply<K: CachedKind>(&self, obj: K) {
        let key = key_of(&obj);
        self.cache.apply(obj);
        self.engine.on_change(&key);
    }

    pub fn delete<K: CachedKind>(&self, namespace: &str, name: &str) {
        let key = ObjectKey::new(K::KIND, namespace, name);
        self.cache.delete::<K>(namespace, name);
        self.engine.on_change(&key);
    }

    /// Reconcile every queued key until the queue is empty.
    pub async fn drain(&self) {
        let queue = self.engine.queue();
        while !queue.is_empty() {
            let Some(key) = queue.next().await else {
                return;
            };
            let _ = self.engine.reconcile(&key).await;
            queue.done(&key);
        }
    }
}

/// Every `reason` found anywhere in a status document.
pub fn reasons(status: &Value) -> Vec<String> {
    let mut found = Vec::new();
    let mut stack = vec![status];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(map) => {
                for (k, v) in map {
                    match (k.as_str(), v) {
                        ("reason", Value::String(reason)) => found.push(reason.clone()),
                        _ => stack.push(v),
                    }
                }
            }
            Value::Array(items) => stack.extend(items.iter()),
            _ => {}
        }
    }
    found
}
