// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Relationship resolver.
//!
//! Maps a changed object to the root objects that must be translated again.
//! Two kinds of edges are kept per object:
//!
//! - **references**: objects this one reads while translating (a route's
//!   backend `Service`, a `Gateway`'s `GatewayProxy`). The reverse of this
//!   table answers "who references X".
//! - **affects**: objects this one names as its subject (an `EndpointSlice`'s
//!   `Service`, a policy's targets). The previous set is kept so deletes and
//!   retargeting still reach the old subjects.
//!
//! Edges come from the object itself, so a child seen before its parent
//! simply has no referrers yet; the parent's own event enqueues it later.

use crate::cache::{ObjectKey, ResourceCache, ResourceKind};
use crate::conflict::policy_targets;
use crate::constants::{ENDPOINT_SLICE_SERVICE_LABEL, LEGACY_INGRESS_CLASS_ANNOTATION, ANNOTATION_PLUGIN_CONFIG_NAME};
use crate::crd::{
    ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls, ApisixUpstream,
    BackendTrafficPolicy, BackendRef, GRPCRoute, Gateway, GatewayClass, GatewayProxy, HTTPRoute,
    HTTPRouteFilter, HTTPRoutePolicy, ParentReference, TCPRoute, TLSRoute, UDPRoute,
};
use crate::router::ingress_class_proxy;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend, IngressClass};
use kube::ResourceExt;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::trace;

#[derive(Default)]
struct Tables {
    references: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
    referrers: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
    affects: HashMap<ObjectKey, BTreeSet<ObjectKey>>,
}

impl Tables {
    /// Replace the outgoing edges of `key`, returning its previous `affects`.
    fn replace(
        &mut self,
        key: &ObjectKey,
        references: BTreeSet<ObjectKey>,
        affects: BTreeSet<ObjectKey>,
    ) -> BTreeSet<ObjectKey> {
        if let Some(old) = self.references.remove(key) {
            for target in old {
                if let Some(set) = self.referrers.get_mut(&target) {
                    set.remove(key);
                    if set.is_empty() {
                        self.referrers.remove(&target);
                    }
                }
            }
        }
        for target in &references {
            self.referrers
                .entry(target.clone())
                .or_default()
                .insert(key.clone());
        }
        if !references.is_empty() {
            self.references.insert(key.clone(), references);
        }

        let previous = if affects.is_empty() {
            self.affects.remove(key)
        } else {
            self.affects.insert(key.clone(), affects)
        };
        previous.unwrap_or_default()
    }
}

#[derive(Default)]
struct Edges {
    references: BTreeSet<ObjectKey>,
    affects: BTreeSet<ObjectKey>,
}

impl Edges {
    fn reference(&mut self, kind: ResourceKind, namespace: &str, name: &str) {
        if !name.is_empty() {
            self.references.insert(ObjectKey::new(kind, namespace, name));
        }
    }

    fn affect(&mut self, kind: ResourceKind, namespace: &str, name: &str) {
        if !name.is_empty() {
            self.affects.insert(ObjectKey::new(kind, namespace, name));
        }
    }

    fn parents(&mut self, namespace: &str, parents: &[ParentReference]) {
        for parent in parents.iter().filter(|p| p.is_gateway()) {
            let ns = parent.namespace.as_deref().unwrap_or(namespace);
            self.reference(ResourceKind::Gateway, ns, &parent.name);
        }
    }

    fn backends<'a>(&mut self, namespace: &str, backends: impl IntoIterator<Item = &'a BackendRef>) {
        for backend in backends {
            if backend.kind.as_deref().unwrap_or("Service") == "Service" {
                let ns = backend.namespace.as_deref().unwrap_or(namespace);
                self.reference(ResourceKind::Service, ns, &backend.name);
            }
        }
    }

    fn filters(&mut self, namespace: &str, filters: &[HTTPRouteFilter]) {
        for filter in filters {
            if let Some(mirror) = &filter.request_mirror {
                self.backends(namespace, [&mirror.backend_ref]);
            }
            if let Some(ext) = filter.extension_ref.as_ref().filter(|e| e.kind == "PluginConfig") {
                self.reference(ResourceKind::PluginConfig, namespace, &ext.name);
            }
        }
    }

    fn ingress_backend(&mut self, namespace: &str, backend: &IngressBackend) {
        if let Some(service) = &backend.service {
            self.reference(ResourceKind::Service, namespace, &service.name);
        }
    }
}

pub struct Relations {
    cache: Arc<ResourceCache>,
    /// Class assumed by APISIX CRDs that name none
    default_ingress_class: String,
    tables: RwLock<Tables>,
}

impl Relations {
    #[must_use]
    pub fn new(cache: Arc<ResourceCache>, default_ingress_class: &str) -> Self {
        Self {
            cache,
            default_ingress_class: default_ingress_class.to_string(),
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Refresh the edges of `key` and return every root affected by its change.
    ///
    /// Call after the cache has been updated (or the object removed from it).
    #[must_use]
    pub fn on_change(&self, key: &ObjectKey) -> BTreeSet<ObjectKey> {
        let edges = self.edges_of(key);
        let mut seeds: BTreeSet<ObjectKey> = edges.affects.clone();
        let tables = {
            let mut tables = self.tables.write().unwrap_or_else(PoisonError::into_inner);
            seeds.extend(tables.replace(key, edges.references, edges.affects));
            tables
        };

        let mut roots = BTreeSet::new();
        let mut seen: BTreeSet<ObjectKey> = BTreeSet::new();
        let mut pending: VecDeque<ObjectKey> = VecDeque::from([key.clone()]);
        pending.extend(seeds);
        while let Some(current) = pending.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if current.kind.is_root() && (current == *key || self.cache.contains(&current)) {
                roots.insert(current.clone());
            }
            if let Some(referrers) = tables.referrers.get(&current) {
                pending.extend(referrers.iter().cloned());
            }
        }
        drop(tables);

        trace!(object = %key, roots = roots.len(), "Resolved affected roots");
        roots
    }

    /// Objects currently referencing `key`.
    #[must_use]
    pub fn referrers(&self, key: &ObjectKey) -> BTreeSet<ObjectKey> {
        self.tables
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .referrers
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    fn ingress_class_of(&self, namespace: &str, class: Option<&String>, edges: &mut Edges) {
        let class = class.map_or(self.default_ingress_class.as_str(), String::as_str);
        edges.reference(ResourceKind::IngressClass, namespace, class);
    }

    #[allow(clippy::too_many_lines)]
    fn edges_of(&self, key: &ObjectKey) -> Edges {
        let mut edges = Edges::default();
        let ns = key.namespace.as_str();
        let name = key.name.as_str();
        let cache = &self.cache;

        match key.kind {
            ResourceKind::Ingress => {
                if let Some(ingress) = cache.get::<Ingress>(ns, name) {
                    self.ingress_edges(&ingress, &mut edges);
                }
            }
            ResourceKind::IngressClass => {
                if let Some(class) = cache.get::<IngressClass>(ns, name) {
                    if let Some((proxy_ns, proxy)) = ingress_class_proxy(&class) {
                        edges.reference(ResourceKind::GatewayProxy, &proxy_ns, &proxy);
                    }
                    // Ingresses without an explicit class follow the default class.
                    for ingress in cache.list::<Ingress>() {
                        if explicit_ingress_class(&ingress).is_none() {
                            edges.affect(
                                ResourceKind::Ingress,
                                &ingress.namespace().unwrap_or_default(),
                                &ingress.name_any(),
                            );
                        }
                    }
                }
            }
            ResourceKind::GatewayClass => {
                if let Some(class) = cache.get::<GatewayClass>(ns, name) {
                    if let Some(params) = class
                        .spec
                        .parameters_ref
                        .as_ref()
                        .filter(|p| p.kind == "GatewayProxy")
                    {
                        let proxy_ns = params.namespace.as_deref().unwrap_or_default();
                        edges.reference(ResourceKind::GatewayProxy, proxy_ns, &params.name);
                    }
                }
            }
            ResourceKind::Gateway => {
                if let Some(gateway) = cache.get::<Gateway>(ns, name) {
                    edges.reference(ResourceKind::GatewayClass, "", &gateway.spec.gateway_class_name);
                    if let Some(params) = gateway
                        .spec
                        .infrastructure
                        .as_ref()
                        .and_then(|i| i.parameters_ref.as_ref())
                        .filter(|p| p.kind == "GatewayProxy")
                    {
                        edges.reference(ResourceKind::GatewayProxy, ns, &params.name);
                    }
                    for listener in &gateway.spec.listeners {
                        let refs = listener.tls.iter().flat_map(|tls| tls.certificate_refs.iter());
                        for cert in refs.filter(|c| c.kind.as_deref().unwrap_or("Secret") == "Secret") {
                            let cert_ns = cert.namespace.as_deref().unwrap_or(ns);
                            edges.reference(ResourceKind::Secret, cert_ns, &cert.name);
                        }
                    }
                }
            }
            ResourceKind::HTTPRoute => {
                if let Some(route) = cache.get::<HTTPRoute>(ns, name) {
                    edges.parents(ns, &route.spec.parent_refs);
                    for rule in &route.spec.rules {
                        edges.backends(ns, &rule.backend_refs);
                        edges.filters(ns, &rule.filters);
                    }
                }
            }
            ResourceKind::GRPCRoute => {
                if let Some(route) = cache.get::<GRPCRoute>(ns, name) {
                    edges.parents(ns, &route.spec.parent_refs);
                    for rule in &route.spec.rules {
                        edges.backends(ns, &rule.backend_refs);
                        edges.filters(ns, &rule.filters);
                    }
                }
            }
            ResourceKind::TCPRoute => {
                if let Some(route) = cache.get::<TCPRoute>(ns, name) {
                    edges.parents(ns, &route.spec.parent_refs);
                    edges.backends(ns, route.spec.rules.iter().flat_map(|r| &r.backend_refs));
                }
            }
            ResourceKind::TLSRoute => {
                if let Some(route) = cache.get::<TLSRoute>(ns, name) {
                    edges.parents(ns, &route.spec.parent_refs);
                    edges.backends(ns, route.spec.rules.iter().flat_map(|r| &r.backend_refs));
                }
            }
            ResourceKind::UDPRoute => {
                if let Some(route) = cache.get::<UDPRoute>(ns, name) {
                    edges.parents(ns, &route.spec.parent_refs);
                    edges.backends(ns, route.spec.rules.iter().flat_map(|r| &r.backend_refs));
                }
            }
            ResourceKind::ApisixRoute => {
                if let Some(route) = cache.get::<ApisixRoute>(ns, name) {
                    self.ingress_class_of("", route.spec.ingress_class_name.as_ref(), &mut edges);
                    for http in &route.spec.http {
                        for backend in &http.backends {
                            edges.reference(ResourceKind::Service, ns, &backend.service_name);
                        }
                        if let Some(config) = &http.plugin_config_name {
                            edges.reference(ResourceKind::ApisixPluginConfig, ns, config);
                        }
                        for secret in http.plugins.iter().filter_map(|p| p.secret_ref.as_ref()) {
                            edges.reference(ResourceKind::Secret, ns, secret);
                        }
                    }
                    for stream in &route.spec.stream {
                        edges.reference(ResourceKind::Service, ns, &stream.backend.service_name);
                        for secret in stream.plugins.iter().filter_map(|p| p.secret_ref.as_ref()) {
                            edges.reference(ResourceKind::Secret, ns, secret);
                        }
                    }
                }
            }
            ResourceKind::ApisixTls => {
                if let Some(tls) = cache.get::<ApisixTls>(ns, name) {
                    self.ingress_class_of("", tls.spec.ingress_class_name.as_ref(), &mut edges);
                    let secret = &tls.spec.secret;
                    edges.reference(
                        ResourceKind::Secret,
                        secret.namespace.as_deref().unwrap_or(ns),
                        &secret.name,
                    );
                    if let Some(client) = &tls.spec.client {
                        edges.reference(
                            ResourceKind::Secret,
                            client.ca_secret.namespace.as_deref().unwrap_or(ns),
                            &client.ca_secret.name,
                        );
                    }
                }
            }
            ResourceKind::ApisixConsumer => {
                if let Some(consumer) = cache.get::<ApisixConsumer>(ns, name) {
                    self.ingress_class_of("", consumer.spec.ingress_class_name.as_ref(), &mut edges);
                    let auth = &consumer.spec.auth_parameter;
                    for secret in [&auth.basic_auth, &auth.key_auth, &auth.jwt_auth, &auth.hmac_auth]
                        .into_iter()
                        .flatten()
                        .filter_map(|a| a.secret_ref.as_ref())
                    {
                        edges.reference(ResourceKind::Secret, ns, secret);
                    }
                }
            }
            ResourceKind::ApisixPluginConfig => {
                if let Some(config) = cache.get::<ApisixPluginConfig>(ns, name) {
                    self.ingress_class_of("", config.spec.ingress_class_name.as_ref(), &mut edges);
                    for secret in config.spec.plugins.iter().filter_map(|p| p.secret_ref.as_ref()) {
                        edges.reference(ResourceKind::Secret, ns, secret);
                    }
                }
            }
            ResourceKind::ApisixUpstream => {
                if cache.get::<ApisixUpstream>(ns, name).is_some() {
                    edges.affect(ResourceKind::Service, ns, name);
                }
            }
            ResourceKind::GatewayProxy => {
                if let Some(proxy) = cache.get::<GatewayProxy>(ns, name) {
                    let control_plane = proxy
                        .spec
                        .provider
                        .as_ref()
                        .and_then(|p| p.control_plane.as_ref());
                    if let Some(control_plane) = control_plane {
                        if let Some(service) = &control_plane.service {
                            edges.reference(ResourceKind::Service, ns, &service.name);
                        }
                        if let Some(secret) = control_plane
                            .auth
                            .admin_key
                            .as_ref()
                            .and_then(|k| k.value_from.as_ref())
                        {
                            edges.reference(ResourceKind::Secret, ns, &secret.secret_key_ref.name);
                        }
                    }
                }
            }
            ResourceKind::EndpointSlice => {
                if let Some(slice) = cache.get::<EndpointSlice>(ns, name) {
                    if let Some(service) = slice.labels().get(ENDPOINT_SLICE_SERVICE_LABEL) {
                        edges.affect(ResourceKind::Service, ns, service);
                    }
                }
            }
            ResourceKind::Pod => {
                if cache.get::<Pod>(ns, name).is_some() {
                    for slice in cache.list_namespaced::<EndpointSlice>(ns) {
                        let backs_pod = slice.endpoints.iter().any(|endpoint| {
                            endpoint
                                .target_ref
                                .as_ref()
                                .is_some_and(|r| r.name.as_deref() == Some(name))
                        });
                        if let Some(service) = slice
                            .labels()
                            .get(ENDPOINT_SLICE_SERVICE_LABEL)
                            .filter(|_| backs_pod)
                        {
                            edges.affect(ResourceKind::Service, ns, service);
                        }
                    }
                }
            }
            ResourceKind::HTTPRoutePolicy => {
                if let Some(policy) = cache.get::<HTTPRoutePolicy>(ns, name) {
                    edges.affects.extend(policy_targets(&policy));
                }
            }
            ResourceKind::BackendTrafficPolicy => {
                if let Some(policy) = cache.get::<BackendTrafficPolicy>(ns, name) {
                    for target in policy.spec.target_refs.iter().filter(|t| t.kind == "Service") {
                        edges.affect(ResourceKind::Service, ns, &target.name);
                    }
                }
            }
            ResourceKind::Service
            | ResourceKind::Secret
            | ResourceKind::PluginConfig
            | ResourceKind::ApisixClusterConfig => {}
        }
        edges
    }

    fn ingress_edges(&self, ingress: &Ingress, edges: &mut Edges) {
        let ns = ingress.namespace().unwrap_or_default();
        if let Some(class) = explicit_ingress_class(ingress) {
            edges.reference(ResourceKind::IngressClass, "", &class);
        }
        if let Some(config) = ingress.annotations().get(ANNOTATION_PLUGIN_CONFIG_NAME) {
            edges.reference(ResourceKind::ApisixPluginConfig, &ns, config);
        }
        let Some(spec) = &ingress.spec else {
            return;
        };
        if let Some(backend) = &spec.default_backend {
            edges.ingress_backend(&ns, backend);
        }
        for rule in spec.rules.iter().flatten() {
            for path in rule.http.iter().flat_map(|http| http.paths.iter()) {
                edges.ingress_backend(&ns, &path.backend);
            }
        }
        for tls in spec.tls.iter().flatten() {
            if let Some(secret) = &tls.secret_name {
                edges.reference(ResourceKind::Secret, &ns, secret);
            }
        }
    }
}

fn explicit_ingress_class(ingress: &Ingress) -> Option<String> {
    ingress
        .spec
        .as_ref()
        .and_then(|spec| spec.ingress_class_name.clone())
        .or_else(|| {
            ingress
                .annotations()
                .get(LEGACY_INGRESS_CLASS_ANNOTATION)
                .cloned()
        })
}

#[cfg(test)]
#[path = "relations_tests.rs"]
mod relations_tests;
