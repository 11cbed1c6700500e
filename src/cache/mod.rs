// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory cache of every watched Kubernetes object.
//!
//! One typed index per kind sits behind a single read path: callers ask for
//! `cache.get::<Service>(ns, name)` and receive an `Arc` snapshot of the object.
//! Watchers are the only writers.
//!
//! The cache also tracks which kinds finished their initial list, which is what
//! the readiness probe and the first full resync wait for.

mod key;

pub use key::{ObjectKey, ResourceKind};

use crate::crd::{
    ApisixClusterConfig, ApisixConsumer, ApisixPluginConfig, ApisixRoute, ApisixTls,
    ApisixUpstream, BackendTrafficPolicy, GRPCRoute, Gateway, GatewayClass, GatewayProxy,
    HTTPRoute, HTTPRoutePolicy, PluginConfig, TCPRoute, TLSRoute, UDPRoute,
};
use k8s_openapi::api::core::v1::{Pod, Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::{Resource, ResourceExt};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock};

/// Objects of one kind keyed by `(namespace, name)`.
pub type KindIndex<T> = BTreeMap<(String, String), Arc<T>>;

/// A kind stored in the [`ResourceCache`].
pub trait CachedKind: Resource<DynamicType = ()> + Clone + Send + Sync + 'static {
    const KIND: ResourceKind;

    #[doc(hidden)]
    fn index(indices: &Indices) -> &KindIndex<Self>;

    #[doc(hidden)]
    fn index_mut(indices: &mut Indices) -> &mut KindIndex<Self>;
}

/// Key of a cached object.
#[must_use]
pub fn key_of<K: CachedKind>(obj: &K) -> ObjectKey {
    ObjectKey::new(
        K::KIND,
        obj.namespace().as_deref().unwrap_or_default(),
        &obj.name_any(),
    )
}

macro_rules! cached_kinds {
    ($($field:ident: $ty:ty => $kind:ident),* $(,)?) => {
        /// Per-kind indices. Only reachable through [`ResourceCache`].
        #[derive(Default)]
        pub struct Indices {
            $($field: KindIndex<$ty>,)*
        }

        $(
            impl CachedKind for $ty {
                const KIND: ResourceKind = ResourceKind::$kind;

                fn index(indices: &Indices) -> &KindIndex<Self> {
                    &indices.$field
                }

                fn index_mut(indices: &mut Indices) -> &mut KindIndex<Self> {
                    &mut indices.$field
                }
            }
        )*

        impl Indices {
            fn meta(&self, key: &ObjectKey) -> Option<ObjectMeta> {
                let slot = (key.namespace.clone(), key.name.clone());
                match key.kind {
                    $(ResourceKind::$kind => self.$field.get(&slot).map(|obj| obj.meta().clone()),)*
                }
            }

            fn keys(&self, kind: ResourceKind) -> Vec<ObjectKey> {
                match kind {
                    $(ResourceKind::$kind => self
                        .$field
                        .keys()
                        .map(|(namespace, name)| ObjectKey::new(kind, namespace, name))
                        .collect(),)*
                }
            }
        }
    };
}

cached_kinds! {
    ingresses: Ingress => Ingress,
    ingress_classes: IngressClass => IngressClass,
    services: Service => Service,
    endpoint_slices: EndpointSlice => EndpointSlice,
    pods: Pod => Pod,
    secrets: Secret => Secret,
    gateway_classes: GatewayClass => GatewayClass,
    gateways: Gateway => Gateway,
    http_routes: HTTPRoute => HTTPRoute,
    grpc_routes: GRPCRoute => GRPCRoute,
    tcp_routes: TCPRoute => TCPRoute,
    tls_routes: TLSRoute => TLSRoute,
    udp_routes: UDPRoute => UDPRoute,
    apisix_routes: ApisixRoute => ApisixRoute,
    apisix_upstreams: ApisixUpstream => ApisixUpstream,
    apisix_tlses: ApisixTls => ApisixTls,
    apisix_consumers: ApisixConsumer => ApisixConsumer,
    apisix_plugin_configs: ApisixPluginConfig => ApisixPluginConfig,
    apisix_cluster_configs: ApisixClusterConfig => ApisixClusterConfig,
    plugin_configs: PluginConfig => PluginConfig,
    http_route_policies: HTTPRoutePolicy => HTTPRoutePolicy,
    backend_traffic_policies: BackendTrafficPolicy => BackendTrafficPolicy,
    gateway_proxies: GatewayProxy => GatewayProxy,
}

/// Shared, read-mostly store of watched objects.
#[derive(Default)]
pub struct ResourceCache {
    indices: RwLock<Indices>,
    expected: RwLock<BTreeSet<ResourceKind>>,
    synced: RwLock<BTreeSet<ResourceKind>>,
}

impl ResourceCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Indices> {
        self.indices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Indices> {
        self.indices.write().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn get<K: CachedKind>(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        let namespace = if K::KIND.is_cluster_scoped() { "" } else { namespace };
        K::index(&self.read())
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    /// Typed lookup by key; `None` when the key names another kind.
    #[must_use]
    pub fn get_by_key<K: CachedKind>(&self, key: &ObjectKey) -> Option<Arc<K>> {
        if key.kind != K::KIND {
            return None;
        }
        self.get::<K>(&key.namespace, &key.name)
    }

    #[must_use]
    pub fn list<K: CachedKind>(&self) -> Vec<Arc<K>> {
        K::index(&self.read()).values().cloned().collect()
    }

    #[must_use]
    pub fn list_namespaced<K: CachedKind>(&self, namespace: &str) -> Vec<Arc<K>> {
        K::index(&self.read())
            .range((namespace.to_string(), String::new())..)
            .take_while(|((ns, _), _)| ns == namespace)
            .map(|(_, obj)| obj.clone())
            .collect()
    }

    /// Insert or replace an object, returning the previous version.
    pub fn apply<K: CachedKind>(&self, obj: K) -> Option<Arc<K>> {
        let key = key_of(&obj);
        K::index_mut(&mut self.write()).insert((key.namespace, key.name), Arc::new(obj))
    }

    /// Remove an object, returning the removed version.
    pub fn delete<K: CachedKind>(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        let namespace = if K::KIND.is_cluster_scoped() { "" } else { namespace };
        K::index_mut(&mut self.write()).remove(&(namespace.to_string(), name.to_string()))
    }

    /// Replace the whole index of a kind after a relist.
    ///
    /// Returns the objects that disappeared.
    pub fn replace<K: CachedKind>(&self, objects: Vec<K>) -> Vec<Arc<K>> {
        let fresh: KindIndex<K> = objects
            .into_iter()
            .map(|obj| {
                let key = key_of(&obj);
                ((key.namespace, key.name), Arc::new(obj))
            })
            .collect();
        let mut indices = self.write();
        let previous = std::mem::replace(K::index_mut(&mut indices), fresh);
        let current = K::index(&indices);
        previous
            .into_iter()
            .filter(|(slot, _)| !current.contains_key(slot))
            .map(|(_, obj)| obj)
            .collect()
    }

    #[must_use]
    pub fn contains(&self, key: &ObjectKey) -> bool {
        self.read().meta(key).is_some()
    }

    /// Metadata of any cached object.
    #[must_use]
    pub fn meta(&self, key: &ObjectKey) -> Option<ObjectMeta> {
        self.read().meta(key)
    }

    /// Keys of every cached object of `kind`.
    #[must_use]
    pub fn keys(&self, kind: ResourceKind) -> Vec<ObjectKey> {
        self.read().keys(kind)
    }

    // ========================================================================
    // Readiness
    // ========================================================================

    /// Declare the kinds whose initial list must complete before the cache is ready.
    pub fn expect_kinds(&self, kinds: &[ResourceKind]) {
        let mut expected = self.expected.write().unwrap_or_else(PoisonError::into_inner);
        expected.extend(kinds.iter().copied());
    }

    pub fn mark_synced(&self, kind: ResourceKind) {
        self.synced
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
    }

    #[must_use]
    pub fn is_synced(&self, kind: ResourceKind) -> bool {
        self.synced
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&kind)
    }

    /// True once every expected kind has completed its initial list.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let expected = self.expected.read().unwrap_or_else(PoisonError::into_inner);
        let synced = self.synced.read().unwrap_or_else(PoisonError::into_inner);
        expected.is_subset(&synced)
    }
}
